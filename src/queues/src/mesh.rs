// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The N x N mesh of SPSC rings connecting every worker pair, plus the
//! park/wake handshake that lets a worker block in its poller without
//! losing messages.
//!
//! The handshake requires sequential consistency on both sides. A parking
//! worker stores its sleep flag, fences, then rescans its inboxes; a
//! sender enqueues, fences, then loads the flag. The fences totally order
//! the two sequences against each other, so a message enqueued
//! concurrently with a park either vetoes the park or triggers a wake.
//! Release/acquire alone admits the missed-wakeup race: both sides can
//! read the other's stale value.

use crate::spsc::{ring, Consumer, Full, Producer};
use crate::waker::Waker;
use core::sync::atomic::{fence, AtomicBool, Ordering};
use std::collections::VecDeque;
use std::sync::Arc;

/// Error returned by [`Port::send`]. The message is handed back to the
/// caller, which may retry, drop, or surface backpressure.
#[derive(Debug, PartialEq, Eq)]
pub struct SendError<T>(pub T);

/// One worker's handle onto the mesh.
pub struct Port<T> {
    id: usize,
    /// producer toward each peer, `None` at our own slot
    senders: Vec<Option<Producer<T>>>,
    /// consumer from each peer, `None` at our own slot
    receivers: Vec<Option<Consumer<T>>>,
    sleeping: Arc<[AtomicBool]>,
    wakers: Vec<Arc<Waker>>,
}

/// Builds the full mesh for `nr_workers` workers with per-ring `capacity`,
/// returning one port per worker. `wakers[i]` must be registered with
/// worker `i`'s poller.
pub fn mesh<T>(nr_workers: usize, capacity: usize, wakers: Vec<Arc<Waker>>) -> Vec<Port<T>> {
    assert!(nr_workers > 0);
    assert_eq!(wakers.len(), nr_workers);

    let sleeping: Arc<[AtomicBool]> = (0..nr_workers)
        .map(|_| AtomicBool::new(false))
        .collect::<Vec<_>>()
        .into();

    let mut senders: Vec<Vec<Option<Producer<T>>>> = (0..nr_workers)
        .map(|_| (0..nr_workers).map(|_| None).collect())
        .collect();
    let mut receivers: Vec<Vec<Option<Consumer<T>>>> = (0..nr_workers)
        .map(|_| (0..nr_workers).map(|_| None).collect())
        .collect();

    for to in 0..nr_workers {
        for from in 0..nr_workers {
            if to == from {
                continue;
            }
            let (tx, rx) = ring(capacity);
            senders[from][to] = Some(tx);
            receivers[to][from] = Some(rx);
        }
    }

    senders
        .into_iter()
        .zip(receivers)
        .enumerate()
        .map(|(id, (senders, receivers))| Port {
            id,
            senders,
            receivers,
            sleeping: sleeping.clone(),
            wakers: wakers.clone(),
        })
        .collect()
}

impl<T> Port<T> {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn nr_workers(&self) -> usize {
        self.senders.len()
    }

    /// Enqueues `msg` for worker `to` and wakes it if it is parked. A full
    /// ring returns the message; the mesh never blocks.
    ///
    /// Sending to self is an invariant violation and panics.
    pub fn send(&mut self, to: usize, msg: T) -> Result<(), SendError<T>> {
        let sender = self.senders[to]
            .as_mut()
            .unwrap_or_else(|| panic!("worker {} attempted to send to itself", to));

        if let Err(Full(msg)) = sender.push(msg) {
            return Err(SendError(msg));
        }

        // orders the enqueue before the sleep-flag load (park handshake)
        fence(Ordering::SeqCst);

        if self.sleeping[to].load(Ordering::SeqCst) {
            self.sleeping[to].store(false, Ordering::SeqCst);
            let _ = self.wakers[to].wake();
        }
        Ok(())
    }

    /// Wakes worker `to` without sending, used when retrying into a full
    /// ring to make sure the peer is draining.
    pub fn kick(&self, to: usize) {
        assert_ne!(to, self.id, "worker attempted to kick itself");
        if self.sleeping[to].load(Ordering::SeqCst) {
            self.sleeping[to].store(false, Ordering::SeqCst);
        }
        let _ = self.wakers[to].wake();
    }

    /// Drains every inbox into `sink` as `(sender_id, message)` pairs.
    /// FIFO per sender; no order across senders. Returns whether any
    /// message was received.
    pub fn poll(&mut self, sink: &mut VecDeque<(usize, T)>) -> bool {
        let mut received = false;
        for from in 0..self.receivers.len() {
            if let Some(rx) = self.receivers[from].as_mut() {
                while let Some(msg) = rx.pop() {
                    sink.push_back((from, msg));
                    received = true;
                }
            }
        }
        received
    }

    /// Returns whether any inbox holds a message. O(N) scan.
    pub fn has_pending(&self) -> bool {
        self.receivers
            .iter()
            .flatten()
            .any(|rx| !rx.is_empty())
    }

    /// First half of the park handshake: publish the sleep flag, then
    /// rescan the inboxes. A concurrent sender either sees the flag (and
    /// wakes us) or enqueued early enough for the rescan to see the
    /// message. Returns `false` (and clears the flag) when parking must be
    /// skipped.
    pub fn prepare_park(&self) -> bool {
        self.sleeping[self.id].store(true, Ordering::SeqCst);
        // orders the sleep-flag store before the inbox rescan
        fence(Ordering::SeqCst);
        if self.has_pending() {
            self.sleeping[self.id].store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Second half of the handshake, run after the poller returns.
    pub fn unpark(&self) {
        self.sleeping[self.id].store(false, Ordering::SeqCst);
    }
}
