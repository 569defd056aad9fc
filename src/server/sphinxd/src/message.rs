// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Messages exchanged between workers. Ownership moves with the message:
//! once a send succeeds the sender holds nothing, and a failed send hands
//! the message back intact.

use common::time::UnixInstant;
use protocol_memcache::{Request, Response, Value};
use std::net::SocketAddr;

/// Identifies a connection slot on its owning worker. The generation
/// guards against a reply landing on a recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnId {
    pub slot: usize,
    pub gen: u32,
}

/// Identifies an in-flight scatter-gather request on its origin worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingId {
    pub slot: usize,
    pub gen: u32,
}

/// Where a response must ultimately be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTo {
    Tcp { conn: ConnId },
    Udp { peer: SocketAddr, request_id: u16 },
}

#[derive(Debug)]
pub enum Message {
    /// A whole command whose key is owned by the receiving worker. The
    /// origin is the sending worker, known from the receiving queue.
    Request { reply: ReplyTo, request: Request },
    /// The owner's answer, delivered to the client by the origin worker.
    Response { reply: ReplyTo, response: Response },
    /// One key of a multi-key `get`/`gets` owned by the receiving worker.
    GetKey {
        pending: PendingId,
        value_slot: usize,
        key: Box<[u8]>,
        cas: bool,
    },
    /// The owner's answer to a [`Message::GetKey`].
    GetValue {
        pending: PendingId,
        value_slot: usize,
        value: Option<Value>,
    },
    /// Clear the receiving shard, immediately or at a deadline.
    FlushAll { at: Option<UnixInstant> },
}
