// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A `Session` is a TCP stream with its read and write buffers. Incoming
//! bytes accumulate in the read buffer until the protocol layer consumes
//! complete commands; responses are composed into the write buffer and
//! flushed opportunistically. A partial send leaves the tail buffered and
//! the caller re-arms write interest.

use bytes::buf::UninitSlice;
use bytes::{Buf, BufMut, BytesMut};
use core::fmt::Debug;
use mio::event::Source;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use std::io::{Error, ErrorKind, Read, Result, Write};

// initial allocation for each buffer
const INITIAL_BUFFER_SIZE: usize = 16 * 1024;

// target size for a single read syscall
const TARGET_READ_SIZE: usize = 16 * 1024;

pub struct Session {
    stream: TcpStream,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    /// hard cap on unparsed bytes; a command that cannot fit is an error
    max_read_buffer: usize,
}

impl Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        write!(f, "{:?}", self.stream)
    }
}

impl Session {
    pub fn new(stream: TcpStream, max_read_buffer: usize) -> Self {
        Self {
            stream,
            read_buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            write_buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            max_read_buffer,
        }
    }

    /// The event interests for this session: always readable, writable
    /// only while the write buffer holds unflushed bytes.
    pub fn interest(&self) -> Interest {
        if self.write_buffer.has_remaining() {
            Interest::READABLE.add(Interest::WRITABLE)
        } else {
            Interest::READABLE
        }
    }

    /// Reads from the stream until it would block. `Ok(0)` means the peer
    /// closed the connection. At the receive-buffer cap this fails with
    /// `OutOfMemory`; the caller parses what is buffered and either
    /// retries (space was freed) or drops the session.
    pub fn fill(&mut self) -> Result<usize> {
        let mut read = 0;

        loop {
            if self.read_buffer.len() >= self.max_read_buffer {
                return Err(Error::new(
                    ErrorKind::OutOfMemory,
                    "receive buffer limit exceeded",
                ));
            }

            if self.read_buffer.capacity() - self.read_buffer.len() < TARGET_READ_SIZE {
                self.read_buffer.reserve(TARGET_READ_SIZE);
            }

            let dst = self.read_buffer.chunk_mut();
            let len = dst.len();
            // the stream writes into uninitialized capacity; advance_mut
            // marks exactly the bytes the read initialized
            let dst = unsafe {
                std::slice::from_raw_parts_mut(UninitSlice::as_mut_ptr(dst), len)
            };

            match self.stream.read(dst) {
                Ok(0) => {
                    return Ok(0);
                }
                Ok(n) => {
                    unsafe {
                        self.read_buffer.advance_mut(n);
                    }
                    read += n;
                }
                Err(e) => match e.kind() {
                    ErrorKind::WouldBlock => {
                        if read == 0 {
                            return Err(e);
                        } else {
                            return Ok(read);
                        }
                    }
                    ErrorKind::Interrupted => {}
                    _ => {
                        return Err(e);
                    }
                },
            }
        }
    }

    /// The unparsed bytes received so far.
    pub fn buffer(&self) -> &[u8] {
        &self.read_buffer
    }

    /// Whether the read buffer sits at its cap. After a parse pass this
    /// means a single command exceeds the configured limit.
    pub fn over_capacity(&self) -> bool {
        self.read_buffer.len() >= self.max_read_buffer
    }

    /// Discards `amt` parsed bytes from the front of the read buffer.
    pub fn consume(&mut self, amt: usize) {
        self.read_buffer.advance(amt);
    }

    /// The write buffer, for response composition.
    pub fn write_buffer(&mut self) -> &mut BytesMut {
        &mut self.write_buffer
    }

    pub fn write_pending(&self) -> usize {
        self.write_buffer.remaining()
    }

    /// Writes buffered response bytes to the stream. A short write leaves
    /// the tail buffered; the caller re-arms write interest based on
    /// `write_pending()`.
    pub fn flush(&mut self) -> Result<usize> {
        let mut flushed = 0;
        while self.write_buffer.has_remaining() {
            match self.stream.write(self.write_buffer.chunk()) {
                Ok(amt) => {
                    self.write_buffer.advance(amt);
                    flushed += amt;
                }
                Err(e) => match e.kind() {
                    ErrorKind::WouldBlock => break,
                    ErrorKind::Interrupted => {}
                    _ => {
                        return Err(e);
                    }
                },
            }
        }
        Ok(flushed)
    }

    pub fn set_nodelay(&mut self, nodelay: bool) -> Result<()> {
        self.stream.set_nodelay(nodelay)
    }

    pub fn register(&mut self, registry: &Registry, token: Token) -> Result<()> {
        let interest = self.interest();
        self.stream.register(registry, token, interest)
    }

    pub fn reregister(&mut self, registry: &Registry, token: Token) -> Result<()> {
        let interest = self.interest();
        self.stream.reregister(registry, token, interest)
    }

    pub fn deregister(&mut self, registry: &Registry) -> Result<()> {
        self.stream.deregister(registry)
    }
}

impl From<TcpStream> for Session {
    fn from(stream: TcpStream) -> Self {
        Self::new(stream, usize::MAX)
    }
}
