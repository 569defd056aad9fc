// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Process-wide counters surfaced through the `stats` command.
//!
//! Counters are relaxed atomics: they are observability only and sit
//! outside the shared-nothing core state. Workers increment them from
//! their own threads without coordination.

use core::sync::atomic::{AtomicU64, Ordering};

pub struct Counter {
    inner: AtomicU64,
}

impl Counter {
    pub const fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    pub fn increment(&self) {
        self.inner.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.inner.fetch_add(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

pub static TCP_ACCEPT: Counter = Counter::new();
pub static TCP_CLOSE: Counter = Counter::new();
pub static UDP_RECV: Counter = Counter::new();
pub static UDP_SEND: Counter = Counter::new();

pub static CMD_GET: Counter = Counter::new();
pub static GET_HIT: Counter = Counter::new();
pub static GET_MISS: Counter = Counter::new();
pub static CMD_SET: Counter = Counter::new();
pub static SET_STORED: Counter = Counter::new();
pub static SET_NOT_STORED: Counter = Counter::new();
pub static CMD_DELETE: Counter = Counter::new();
pub static CMD_INCR: Counter = Counter::new();
pub static CMD_DECR: Counter = Counter::new();
pub static CMD_FLUSH: Counter = Counter::new();

pub static SEGMENT_EVICT: Counter = Counter::new();
pub static ITEM_EXPIRE: Counter = Counter::new();

pub static MSG_SEND: Counter = Counter::new();
pub static MSG_SEND_RETRY: Counter = Counter::new();
pub static MSG_SEND_FAIL: Counter = Counter::new();
pub static MSG_RECV: Counter = Counter::new();

/// Snapshot of every counter, in the order reported by `stats`.
pub fn snapshot() -> Vec<(&'static str, u64)> {
    vec![
        ("cmd_get", CMD_GET.value()),
        ("get_hits", GET_HIT.value()),
        ("get_misses", GET_MISS.value()),
        ("cmd_set", CMD_SET.value()),
        ("set_stored", SET_STORED.value()),
        ("set_not_stored", SET_NOT_STORED.value()),
        ("cmd_delete", CMD_DELETE.value()),
        ("cmd_incr", CMD_INCR.value()),
        ("cmd_decr", CMD_DECR.value()),
        ("cmd_flush", CMD_FLUSH.value()),
        ("tcp_accept", TCP_ACCEPT.value()),
        ("tcp_close", TCP_CLOSE.value()),
        ("udp_recv", UDP_RECV.value()),
        ("udp_send", UDP_SEND.value()),
        ("segment_evict", SEGMENT_EVICT.value()),
        ("item_expire", ITEM_EXPIRE.value()),
        ("msg_send", MSG_SEND.value()),
        ("msg_send_retry", MSG_SEND_RETRY.value()),
        ("msg_send_fail", MSG_SEND_FAIL.value()),
        ("msg_recv", MSG_RECV.value()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_basics() {
        let c = Counter::new();
        assert_eq!(c.value(), 0);
        c.increment();
        c.add(9);
        assert_eq!(c.value(), 10);
    }

    #[test]
    fn snapshot_names_are_unique() {
        let snap = snapshot();
        for (i, (name, _)) in snap.iter().enumerate() {
            for (other, _) in &snap[i + 1..] {
                assert_ne!(name, other);
            }
        }
    }
}
