mod common;

use common::{create_value_with_size, spawn_server, MemcdServerParamsBuilder, TextClient};
use std::thread;
use std::time::Duration;

#[test]
fn expired_value_reports_end_without_intervening_commands() {
    let server = spawn_server(MemcdServerParamsBuilder::new());
    let mut client = TextClient::connect(server.port());

    client.roundtrip(b"set t 0 1 1\r\nA\r\n", b"STORED\r\n");

    // lazy expiry: nothing touches the key while the TTL runs out
    thread::sleep(Duration::from_millis(2500));
    client.roundtrip(b"get t\r\n", b"END\r\n");
}

#[test]
fn capacity_overflow_evicts_oldest_entries_first() {
    let mut params = MemcdServerParamsBuilder::new();
    params.with_memory_limit_mb(1);
    let server = spawn_server(params);
    let mut client = TextClient::connect(server.port());

    const ITEM_SIZE: usize = 100 * 1024;
    let value = create_value_with_size(ITEM_SIZE);
    for index in 1..=20 {
        let request = format!("set k{} 0 0 {}\r\n{}\r\n", index, ITEM_SIZE, value);
        client.roundtrip(request.as_bytes(), b"STORED\r\n");
    }

    // the first insert was evicted, the last one survived
    client.roundtrip(b"get k1\r\n", b"END\r\n");
    let expected = format!("VALUE k20 0 {}\r\n{}\r\nEND\r\n", ITEM_SIZE, value);
    client.roundtrip(b"get k20\r\n", expected.as_bytes());
}

#[test]
fn append_under_capacity_pressure_evicts_oldest_entries() {
    let mut params = MemcdServerParamsBuilder::new();
    params.with_memory_limit_mb(1);
    let server = spawn_server(params);
    let mut client = TextClient::connect(server.port());

    const ITEM_SIZE: usize = 100 * 1024;
    let value = create_value_with_size(ITEM_SIZE);
    for index in 1..=10 {
        let request = format!("set k{} 0 0 {}\r\n{}\r\n", index, ITEM_SIZE, value);
        client.roundtrip(request.as_bytes(), b"STORED\r\n");
    }

    // growing k10 past the budget evicts the oldest entry, not the
    // record being appended to
    let request = format!("append k10 0 0 {}\r\n{}\r\n", ITEM_SIZE, value);
    client.roundtrip(request.as_bytes(), b"STORED\r\n");

    client.roundtrip(b"get k1\r\n", b"END\r\n");
    let expected = format!("VALUE k10 0 {}\r\n{}{}\r\nEND\r\n", 2 * ITEM_SIZE, value, value);
    client.roundtrip(b"get k10\r\n", expected.as_bytes());
}

#[test]
fn store_stays_within_budget_under_sweep() {
    let mut params = MemcdServerParamsBuilder::new();
    params.with_memory_limit_mb(1);
    let server = spawn_server(params);
    let mut client = TextClient::connect(server.port());

    const ITEM_SIZE: usize = 64 * 1024;
    let value = create_value_with_size(ITEM_SIZE);
    for index in 0..50 {
        let request = format!("set key{} 0 0 {}\r\n{}\r\n", index, ITEM_SIZE, value);
        client.roundtrip(request.as_bytes(), b"STORED\r\n");
    }

    client.send(b"stats\r\n");
    let mut bytes_used: Option<u64> = None;
    loop {
        let line = client.read_line();
        if line == "END\r\n" {
            break;
        }
        if let Some(rest) = line.trim_end().strip_prefix("STAT bytes ") {
            bytes_used = Some(rest.parse().unwrap());
        }
    }
    let bytes_used = bytes_used.expect("stats reported bytes");
    assert!(
        bytes_used <= 1024 * 1024,
        "{} bytes used exceeds the 1MiB budget",
        bytes_used
    );
}
