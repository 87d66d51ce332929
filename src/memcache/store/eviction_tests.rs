use super::test_utils::*;

const ITEM: usize = 100;

fn fill(server: &MockServer, count: usize) {
    for index in 1..=count {
        let key = Bytes::from(format!("k{}", index));
        server
            .storage
            .set(key, Record::new(from_slice(&[b'x'; ITEM]), 0, 0, 0))
            .unwrap();
    }
}

#[test]
fn capacity_is_never_exceeded_at_rest() {
    let server = create_server_with_limits(1000, 1024);
    for round in 0..3 {
        fill(&server, 10);
        assert!(
            server.storage.stats().bytes <= 1000,
            "round {}: {} bytes used",
            round,
            server.storage.stats().bytes
        );
    }
}

#[test]
fn eviction_removes_least_recently_used_record_first() {
    let server = create_server_with_limits(1000, 1024);
    fill(&server, 10);

    // one more insert forces a victim: the oldest insert, k1
    server
        .storage
        .set(
            Bytes::from("k11"),
            Record::new(from_slice(&[b'x'; ITEM]), 0, 0, 0),
        )
        .unwrap();

    assert!(server.storage.get(&Bytes::from("k1")).is_err());
    assert!(server.storage.get(&Bytes::from("k11")).is_ok());
    assert!(server.storage.stats().bytes <= 1000);
    assert_eq!(server.storage.stats().evictions, 1);
}

#[test]
fn recently_read_record_is_spared() {
    let server = create_server_with_limits(1000, 1024);
    fill(&server, 10);

    // refresh k1 so the least recently used record becomes k2
    assert!(server.storage.get(&Bytes::from("k1")).is_ok());

    server
        .storage
        .set(
            Bytes::from("k11"),
            Record::new(from_slice(&[b'x'; ITEM]), 0, 0, 0),
        )
        .unwrap();

    assert!(server.storage.get(&Bytes::from("k1")).is_ok());
    assert!(server.storage.get(&Bytes::from("k2")).is_err());
}

#[test]
fn newest_records_survive_a_sweep_of_inserts() {
    let server = create_server_with_limits(1000, 1024);
    fill(&server, 20);

    // the last ten inserts fit exactly; the first ten were evicted
    for index in 11..=20 {
        let key = Bytes::from(format!("k{}", index));
        assert!(server.storage.get(&key).is_ok(), "k{} missing", index);
    }
    assert!(server.storage.get(&Bytes::from("k1")).is_err());
}

#[test]
fn expired_records_are_reclaimed_before_live_victims() {
    let server = create_server_with_limits(1000, 1024);

    // five short lived records, five immortal ones
    for index in 1..=5 {
        let key = Bytes::from(format!("dead{}", index));
        server
            .storage
            .set(key, Record::new(from_slice(&[b'x'; ITEM]), 0, 0, 5))
            .unwrap();
    }
    for index in 1..=5 {
        let key = Bytes::from(format!("live{}", index));
        server
            .storage
            .set(key, Record::new(from_slice(&[b'x'; ITEM]), 0, 0, 0))
            .unwrap();
    }

    server.timer.set(10);
    server
        .storage
        .set(
            Bytes::from("fresh"),
            Record::new(from_slice(&[b'x'; ITEM]), 0, 0, 0),
        )
        .unwrap();

    // the expired records paid for the insert, every live one survived
    for index in 1..=5 {
        let key = Bytes::from(format!("live{}", index));
        assert!(server.storage.get(&key).is_ok(), "live{} missing", index);
    }
    assert!(server.storage.get(&Bytes::from("fresh")).is_ok());
    assert_eq!(server.storage.stats().evictions, 0);
}

#[test]
fn replacing_a_record_does_not_evict_others() {
    let server = create_server_with_limits(1000, 1024);
    fill(&server, 10);

    // same-size replace fits in place of the old value
    server
        .storage
        .set(
            Bytes::from("k5"),
            Record::new(from_slice(&[b'y'; ITEM]), 0, 0, 0),
        )
        .unwrap();

    for index in 1..=10 {
        let key = Bytes::from(format!("k{}", index));
        assert!(server.storage.get(&key).is_ok(), "k{} missing", index);
    }
}

#[test]
fn unsatisfiable_set_fails_with_out_of_memory_and_leaves_store_intact() {
    let server = create_server_with_limits(1000, 2048);
    fill(&server, 10);

    let oversized = Record::new(from_slice(&[b'x'; 1500]), 0, 0, 0);
    match server.storage.set(Bytes::from("big"), oversized) {
        Ok(_) => unreachable!(),
        Err(err) => assert_eq!(err, CacheError::OutOfMemory),
    }

    // nothing was evicted for the failed insert
    for index in 1..=10 {
        let key = Bytes::from(format!("k{}", index));
        assert!(server.storage.get(&key).is_ok(), "k{} missing", index);
    }
}
