// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Streaming implementation of the memcached ASCII protocol, plus the
//! 8-byte frame header used when the protocol is carried over UDP.
//!
//! Parsing distinguishes an incomplete message (more bytes are needed,
//! leave the buffer alone) from an invalid one (the client sent garbage).
//! Both requests and responses implement [`protocol_common::Compose`], so
//! the same types serve the server, the tests, and cross-worker transfer.

mod request;
mod response;
mod udp;
mod util;

pub(crate) use util::*;

pub use request::{
    Arithmetic, Cas, Delete, Expiry, FlushAll, Get, Request, RequestParser, Store,
    DEFAULT_MAX_KEY_LEN, DEFAULT_MAX_VALUE_SIZE,
};
pub use response::{Response, Value, Values};
pub use udp::{FrameHeader, UDP_HEADER_SIZE, UDP_MAX_DATAGRAM, UDP_MAX_PAYLOAD};
