use super::test_utils::*;

#[test]
fn touch_missing_key_should_fail_with_not_found() {
    let server = create_bounded_server();
    match server.storage.touch(Bytes::from("key"), 100) {
        Ok(_) => unreachable!(),
        Err(err) => assert_eq!(err, CacheError::NotFound),
    }
}

#[test]
fn touch_extends_expiration_without_changing_value() {
    let server = create_bounded_server();
    let key = Bytes::from("key");
    server
        .storage
        .set(key.clone(), Record::new(from_string("value"), 0, 0, 5))
        .unwrap();

    server.storage.touch(key.clone(), 100).unwrap();

    server.timer.set(10);
    let found = server.storage.get(&key).unwrap();
    assert_eq!(found.value[..], b"value"[..]);

    server.timer.set(100);
    assert!(server.storage.get(&key).is_err());
}

#[test]
fn touch_bumps_cas() {
    let server = create_bounded_server();
    let key = Bytes::from("key");
    let status = server
        .storage
        .set(key.clone(), Record::new(from_string("value"), 0, 0, 0))
        .unwrap();
    let touched = server.storage.touch(key, 100).unwrap();
    assert!(touched.cas > status.cas);
}

#[test]
fn touch_expired_record_should_fail_with_not_found() {
    let server = create_bounded_server();
    let key = Bytes::from("key");
    server
        .storage
        .set(key.clone(), Record::new(from_string("value"), 0, 0, 5))
        .unwrap();
    server.timer.set(10);
    match server.storage.touch(key, 100) {
        Ok(_) => unreachable!(),
        Err(err) => assert_eq!(err, CacheError::NotFound),
    }
}

#[test]
fn touch_with_zero_makes_record_immortal() {
    let server = create_bounded_server();
    let key = Bytes::from("key");
    server
        .storage
        .set(key.clone(), Record::new(from_string("value"), 0, 0, 5))
        .unwrap();
    server.storage.touch(key.clone(), 0).unwrap();
    server.timer.set(1_000_000);
    assert!(server.storage.get(&key).is_ok());
}
