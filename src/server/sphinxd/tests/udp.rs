// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Datagram transport: the 8-byte frame header, request/response
//! correlation, and error replies.

mod common;

use common::*;
use std::net::UdpSocket;
use std::time::Duration;

fn framed(request_id: u16, body: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(8 + body.len());
    datagram.extend_from_slice(&request_id.to_be_bytes());
    datagram.extend_from_slice(&0u16.to_be_bytes()); // sequence
    datagram.extend_from_slice(&1u16.to_be_bytes()); // total
    datagram.extend_from_slice(&0u16.to_be_bytes()); // reserved
    datagram.extend_from_slice(body);
    datagram
}

fn exchange(socket: &UdpSocket, addr: &str, datagram: &[u8]) -> Vec<u8> {
    socket.send_to(datagram, addr).expect("failed to send");
    let mut buf = [0u8; 2048];
    let (len, _) = socket.recv_from(&mut buf).expect("no reply");
    buf[..len].to_vec()
}

#[test]
fn udp_requests() {
    let port = free_port();
    let server = start(config(port, 2, 4 * 1024 * 1024, 64 * 1024));
    let addr = format!("127.0.0.1:{}", port);

    let socket = UdpSocket::bind("127.0.0.1:0").expect("failed to bind");
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("failed to set timeout");

    // a miss echoes the request id with a single END fragment
    let reply = exchange(&socket, &addr, &framed(1, b"get x\r\n"));
    assert_eq!(&reply[..8], &[0, 1, 0, 0, 0, 1, 0, 0]);
    assert_eq!(&reply[8..], b"END\r\n");

    // store over UDP, then read it back
    let reply = exchange(&socket, &addr, &framed(2, b"set u 0 0 1\r\nv\r\n"));
    assert_eq!(&reply[..8], &[0, 2, 0, 0, 0, 1, 0, 0]);
    assert_eq!(&reply[8..], b"STORED\r\n");

    let reply = exchange(&socket, &addr, &framed(3, b"get u\r\n"));
    assert_eq!(&reply[..8], &[0, 3, 0, 0, 0, 1, 0, 0]);
    assert_eq!(&reply[8..], b"VALUE u 0 1\r\nv\r\nEND\r\n");

    // malformed requests are answered, not dropped
    let reply = exchange(&socket, &addr, &framed(4, b"bogus\r\n"));
    assert_eq!(&reply[..8], &[0, 4, 0, 0, 0, 1, 0, 0]);
    assert_eq!(&reply[8..], b"CLIENT_ERROR bad command line format\r\n");

    server.shutdown();
}

#[test]
fn runt_datagram_is_ignored() {
    let port = free_port();
    let server = start(config(port, 1, 4 * 1024 * 1024, 64 * 1024));
    let addr = format!("127.0.0.1:{}", port);

    let socket = UdpSocket::bind("127.0.0.1:0").expect("failed to bind");
    socket
        .set_read_timeout(Some(Duration::from_millis(500)))
        .expect("failed to set timeout");

    // shorter than a frame header: no reply
    socket.send_to(&[1, 2, 3], &addr).expect("failed to send");
    let mut buf = [0u8; 64];
    assert!(socket.recv_from(&mut buf).is_err());

    // the socket still answers well-formed requests
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("failed to set timeout");
    let reply = exchange(&socket, &addr, &framed(7, b"get x\r\n"));
    assert_eq!(&reply[8..], b"END\r\n");

    server.shutdown();
}
