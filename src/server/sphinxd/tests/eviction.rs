// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Capacity and time-based behaviors: segment eviction, lazy expiry, and
//! deferred flushes. These run against a single worker with a tiny
//! segment pool so the storage math is deterministic.

mod common;

use common::*;
use std::time::Duration;

#[test]
fn eviction_drops_oldest_segment() {
    let port = free_port();
    // two 1 KiB segments; each 600-byte value fills most of a segment
    let server = start(config(port, 1, 2048, 1024));
    let addr = format!("127.0.0.1:{}", port).parse().unwrap();

    let value = "v".repeat(600);

    test(
        "fill both segments",
        addr,
        &[
            (
                &format!("set k1 0 0 600\r\n{}\r\n", value),
                Some("STORED\r\n"),
            ),
            (
                &format!("set k2 0 0 600\r\n{}\r\n", value),
                Some("STORED\r\n"),
            ),
        ],
    );

    test(
        "next set evicts the oldest segment",
        addr,
        &[
            (
                &format!("set k3 0 0 600\r\n{}\r\n", value),
                Some("STORED\r\n"),
            ),
            // k1 lived in the evicted segment
            ("get k1\r\n", Some("END\r\n")),
            (
                "get k2\r\n",
                Some(&format!("VALUE k2 0 600\r\n{}\r\nEND\r\n", value)),
            ),
            (
                "get k3\r\n",
                Some(&format!("VALUE k3 0 600\r\n{}\r\nEND\r\n", value)),
            ),
        ],
    );

    server.shutdown();
}

#[test]
fn oversized_value_is_refused() {
    let port = free_port();
    let server = start(config(port, 1, 2048, 1024));
    let addr = format!("127.0.0.1:{}", port).parse().unwrap();

    // the value parses (under the segment size) but the entry with its
    // header cannot fit a segment
    let value = "x".repeat(1015);
    test(
        "oversized entry",
        addr,
        &[(
            &format!("set big 0 0 1015\r\n{}\r\n", value),
            Some("SERVER_ERROR object too large for cache\r\n"),
        )],
    );

    server.shutdown();
}

#[test]
fn expiry_is_observed() {
    let port = free_port();
    let server = start(config(port, 1, 4 * 1024 * 1024, 64 * 1024));
    let addr = format!("127.0.0.1:{}", port).parse().unwrap();

    test(
        "store with a short ttl",
        addr,
        &[
            ("set t 0 2 1\r\nx\r\n", Some("STORED\r\n")),
            ("get t\r\n", Some("VALUE t 0 1\r\nx\r\nEND\r\n")),
        ],
    );

    std::thread::sleep(Duration::from_secs(3));

    test("expired key misses", addr, &[("get t\r\n", Some("END\r\n"))]);

    server.shutdown();
}

#[test]
fn delayed_flush() {
    let port = free_port();
    let server = start(config(port, 1, 4 * 1024 * 1024, 64 * 1024));
    let addr = format!("127.0.0.1:{}", port).parse().unwrap();

    test(
        "flush_all with delay",
        addr,
        &[
            ("set f 0 0 1\r\nx\r\n", Some("STORED\r\n")),
            ("flush_all 2\r\n", Some("OK\r\n")),
            // not flushed yet
            ("get f\r\n", Some("VALUE f 0 1\r\nx\r\nEND\r\n")),
        ],
    );

    std::thread::sleep(Duration::from_secs(3));

    test("flushed after delay", addr, &[("get f\r\n", Some("END\r\n"))]);

    server.shutdown();
}
