// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Shared harness for the integration tests: starts an in-process server
//! and scripts request/response pairs against it over a real socket.

use config::SphinxdConfig;
use sphinxd::Sphinxd;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

pub const READ_DEADLINE: Duration = Duration::from_secs(5);

/// Reserves a port by binding to an ephemeral one and releasing it.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("failed to probe for a port");
    listener.local_addr().unwrap().port()
}

pub fn config(port: u16, threads: usize, heap_size: usize, segment_size: usize) -> SphinxdConfig {
    let mut config = SphinxdConfig::default();
    config
        .server_mut()
        .set_listen_tcp(format!("127.0.0.1:{}", port));
    config
        .server_mut()
        .set_listen_udp(format!("127.0.0.1:{}", port));
    config.worker_mut().set_threads(threads);
    config.logmem_mut().set_heap_size(heap_size);
    config.logmem_mut().set_segment_size(segment_size);
    config
}

pub fn start(config: SphinxdConfig) -> Sphinxd {
    Sphinxd::new(config).expect("failed to launch server")
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_millis(250)))
        .expect("failed to set read timeout");
    stream
        .set_write_timeout(Some(Duration::from_millis(250)))
        .expect("failed to set write timeout");
    stream
}

fn read_expected(stream: &mut TcpStream, len: usize, name: &str) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    let mut at = 0;
    let deadline = Instant::now() + READ_DEADLINE;
    while at < len {
        match stream.read(&mut buf[at..]) {
            Ok(0) => panic!("{}: connection closed early", name),
            Ok(n) => at += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                if Instant::now() > deadline {
                    panic!(
                        "{}: timed out with {:?} of {} bytes",
                        name,
                        String::from_utf8_lossy(&buf[..at]),
                        len
                    );
                }
            }
            Err(e) => panic!("{}: read error: {}", name, e),
        }
    }
    buf
}

/// Opens a new connection and walks it through request/response pairs.
/// `None` asserts that the request produces no response bytes.
pub fn test(name: &str, addr: SocketAddr, data: &[(&str, Option<&str>)]) {
    let mut stream = connect(addr);

    for (request, response) in data {
        stream
            .write_all(request.as_bytes())
            .unwrap_or_else(|e| panic!("{}: error sending request: {}", name, e));

        if let Some(response) = response {
            let received = read_expected(&mut stream, response.len(), name);
            assert_eq!(
                received,
                response.as_bytes(),
                "{}: expected {:?} received {:?}",
                name,
                response,
                String::from_utf8_lossy(&received)
            );
        } else {
            // no response expected; give the server a moment to prove it
            let mut buf = [0u8; 64];
            match stream.read(&mut buf) {
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
                Ok(0) => panic!("{}: connection closed early", name),
                Ok(n) => panic!(
                    "{}: expected no response, received {:?}",
                    name,
                    String::from_utf8_lossy(&buf[..n])
                ),
                Err(e) => panic!("{}: read error: {}", name, e),
            }
        }
    }
}

/// Asserts that the peer closes the connection after `request`.
pub fn test_close(name: &str, addr: SocketAddr, request: &str) {
    let mut stream = connect(addr);
    stream
        .write_all(request.as_bytes())
        .unwrap_or_else(|e| panic!("{}: error sending request: {}", name, e));

    let deadline = Instant::now() + READ_DEADLINE;
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                if Instant::now() > deadline {
                    panic!("{}: connection was not closed", name);
                }
            }
            // a reset also counts as closed
            Err(_) => return,
        }
    }
}
