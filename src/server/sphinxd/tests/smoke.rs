// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! End-to-end tests against a two-worker instance. With two shards every
//! command is routed by key ownership, so these scripts exercise both the
//! local and the cross-worker paths.

mod common;

use common::*;

#[test]
fn smoke() {
    let port = free_port();
    let server = start(config(port, 2, 8 * 1024 * 1024, 64 * 1024));
    let addr = format!("127.0.0.1:{}", port).parse().unwrap();

    test("get miss", addr, &[("get 0\r\n", Some("END\r\n"))]);
    test("gets miss", addr, &[("gets 0\r\n", Some("END\r\n"))]);

    test(
        "set and get",
        addr,
        &[
            ("set 1 0 0 1\r\n1\r\n", Some("STORED\r\n")),
            ("get 1\r\n", Some("VALUE 1 0 1\r\n1\r\nEND\r\n")),
        ],
    );

    test(
        "set flags",
        addr,
        &[
            ("set 2 42 0 1\r\n1\r\n", Some("STORED\r\n")),
            ("get 2\r\n", Some("VALUE 2 42 1\r\n1\r\nEND\r\n")),
        ],
    );

    test(
        "set overwrites",
        addr,
        &[
            ("set 3 0 0 1\r\na\r\n", Some("STORED\r\n")),
            ("set 3 0 0 1\r\nb\r\n", Some("STORED\r\n")),
            ("get 3\r\n", Some("VALUE 3 0 1\r\nb\r\nEND\r\n")),
        ],
    );

    test(
        "add not_stored",
        addr,
        &[
            ("set 4 0 0 1\r\n4\r\n", Some("STORED\r\n")),
            ("add 4 0 0 1\r\n0\r\n", Some("NOT_STORED\r\n")),
            ("get 4\r\n", Some("VALUE 4 0 1\r\n4\r\nEND\r\n")),
        ],
    );

    test(
        "add stored",
        addr,
        &[
            ("add 5 0 0 1\r\n5\r\n", Some("STORED\r\n")),
            ("get 5\r\n", Some("VALUE 5 0 1\r\n5\r\nEND\r\n")),
        ],
    );

    test(
        "replace not_stored",
        addr,
        &[
            ("replace 6 0 0 1\r\n6\r\n", Some("NOT_STORED\r\n")),
            ("get 6\r\n", Some("END\r\n")),
        ],
    );

    test(
        "replace stored",
        addr,
        &[
            ("set 7 0 0 1\r\n7\r\n", Some("STORED\r\n")),
            ("replace 7 0 0 1\r\n0\r\n", Some("STORED\r\n")),
            ("get 7\r\n", Some("VALUE 7 0 1\r\n0\r\nEND\r\n")),
        ],
    );

    test(
        "append and prepend",
        addr,
        &[
            ("append 8 0 0 1\r\nx\r\n", Some("NOT_STORED\r\n")),
            ("set 8 0 0 2\r\nbc\r\n", Some("STORED\r\n")),
            ("append 8 0 0 1\r\nd\r\n", Some("STORED\r\n")),
            ("prepend 8 0 0 1\r\na\r\n", Some("STORED\r\n")),
            ("get 8\r\n", Some("VALUE 8 0 4\r\nabcd\r\nEND\r\n")),
        ],
    );

    test(
        "cas flow",
        addr,
        &[
            ("cas 9 0 0 1 1\r\n9\r\n", Some("NOT_FOUND\r\n")),
            ("set 9 0 0 1\r\n9\r\n", Some("STORED\r\n")),
            ("cas 9 0 0 1 999999\r\n0\r\n", Some("EXISTS\r\n")),
            ("get 9\r\n", Some("VALUE 9 0 1\r\n9\r\nEND\r\n")),
        ],
    );

    test(
        "delete",
        addr,
        &[
            ("delete 11\r\n", Some("NOT_FOUND\r\n")),
            ("set 11 0 0 1\r\n1\r\n", Some("STORED\r\n")),
            ("delete 11\r\n", Some("DELETED\r\n")),
            ("get 11\r\n", Some("END\r\n")),
        ],
    );

    test(
        "incr",
        addr,
        &[
            ("incr 12 1\r\n", Some("NOT_FOUND\r\n")),
            ("set 12 0 0 1\r\n0\r\n", Some("STORED\r\n")),
            ("incr 12 1\r\n", Some("1\r\n")),
            ("incr 12 2\r\n", Some("3\r\n")),
        ],
    );

    test(
        "incr non-numeric",
        addr,
        &[
            ("set 13 0 0 1\r\na\r\n", Some("STORED\r\n")),
            (
                "incr 13 1\r\n",
                Some("CLIENT_ERROR cannot increment or decrement non-numeric value\r\n"),
            ),
        ],
    );

    test(
        "decr saturates at zero",
        addr,
        &[
            ("set 14 0 0 2\r\n10\r\n", Some("STORED\r\n")),
            ("decr 14 1\r\n", Some("9\r\n")),
            ("decr 14 255\r\n", Some("0\r\n")),
        ],
    );

    test(
        "incr saturates at max",
        addr,
        &[
            (
                "set 15 0 0 20\r\n18446744073709551615\r\n",
                Some("STORED\r\n"),
            ),
            ("incr 15 1\r\n", Some("18446744073709551615\r\n")),
        ],
    );

    test(
        "noreply set",
        addr,
        &[
            ("set 16 0 0 1 noreply\r\nx\r\n", None),
            ("get 16\r\n", Some("VALUE 16 0 1\r\nx\r\nEND\r\n")),
        ],
    );

    test(
        "pipelined commands",
        addr,
        &[(
            "set 17 0 0 2\r\nhi\r\nset 17 0 0 6\r\nhello!\r\nget 17\r\n",
            Some("STORED\r\nSTORED\r\nVALUE 17 0 6\r\nhello!\r\nEND\r\n"),
        )],
    );

    test(
        "malformed command keeps connection open",
        addr,
        &[(
            "bogus\r\nget 18\r\n",
            Some("CLIENT_ERROR bad command line format\r\nEND\r\n"),
        )],
    );

    test(
        "version",
        addr,
        &[(
            "version\r\n",
            Some(&format!("VERSION {}\r\n", env!("CARGO_PKG_VERSION"))),
        )],
    );

    test_close("quit closes the connection", addr, "quit\r\n");

    server.shutdown();
}

#[test]
fn cas_tokens() {
    // a single worker makes the shard-local cas counter deterministic
    let port = free_port();
    let server = start(config(port, 1, 4 * 1024 * 1024, 64 * 1024));
    let addr = format!("127.0.0.1:{}", port).parse().unwrap();

    test(
        "gets returns the token and cas consumes it",
        addr,
        &[
            ("set k 0 0 1\r\na\r\n", Some("STORED\r\n")),
            ("gets k\r\n", Some("VALUE k 0 1 1\r\na\r\nEND\r\n")),
            ("cas k 0 0 1 1\r\nb\r\n", Some("STORED\r\n")),
            // the token advanced with the cas store
            ("cas k 0 0 1 1\r\nc\r\n", Some("EXISTS\r\n")),
            ("gets k\r\n", Some("VALUE k 0 1 2\r\nb\r\nEND\r\n")),
        ],
    );

    server.shutdown();
}

#[test]
fn cross_worker_routing() {
    let port = free_port();
    let server = start(config(port, 2, 8 * 1024 * 1024, 64 * 1024));
    let addr = format!("127.0.0.1:{}", port).parse().unwrap();

    // enough keys to guarantee both shards are hit regardless of how
    // the hash spreads them
    for i in 0..20 {
        test(
            "cross worker set",
            addr,
            &[(
                &format!("set key-{} 0 0 4\r\nval{}\r\n", i, i % 10),
                Some("STORED\r\n"),
            )],
        );
    }
    for i in 0..20 {
        test(
            "cross worker get",
            addr,
            &[(
                &format!("get key-{}\r\n", i),
                Some(&format!("VALUE key-{} 0 4\r\nval{}\r\nEND\r\n", i, i % 10)),
            )],
        );
    }

    // a multi-key get spanning both shards comes back in request order
    test(
        "multi-key get",
        addr,
        &[(
            "get key-0 key-1 missing key-2 key-3 key-4 key-5\r\n",
            Some(
                "VALUE key-0 0 4\r\nval0\r\nVALUE key-1 0 4\r\nval1\r\n\
                 VALUE key-2 0 4\r\nval2\r\nVALUE key-3 0 4\r\nval3\r\n\
                 VALUE key-4 0 4\r\nval4\r\nVALUE key-5 0 4\r\nval5\r\nEND\r\n",
            ),
        )],
    );

    // flush_all reaches every shard
    test(
        "flush_all clears all shards",
        addr,
        &[
            ("flush_all\r\n", Some("OK\r\n")),
            ("get key-0\r\n", Some("END\r\n")),
            ("get key-1\r\n", Some("END\r\n")),
            ("get key-19\r\n", Some("END\r\n")),
        ],
    );

    server.shutdown();
}
