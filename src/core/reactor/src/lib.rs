// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Per-worker event-loop scaffolding.
//!
//! A [`Reactor`] bundles the worker's poller, its registered wakeup
//! handle, its port onto the cross-worker message mesh, and a small
//! deferred-work timer list. The worker owns its sockets and dispatches
//! readiness itself; the reactor decides how long each poll may block and
//! implements the park protocol that lets an idle worker sleep without
//! missing messages.
//!
//! Handlers must not block: the only suspension point in a worker is the
//! poll inside [`Reactor::poll`] and [`Reactor::park`].

pub mod net;

use common::time::UnixInstant;
use mio::{Events, Poll, Registry, Token};
use queues::{Port, SendError, Waker};
use std::collections::VecDeque;
use std::io::{ErrorKind, Result};
use std::sync::Arc;
use std::time::Duration;

/// Token reserved for the wakeup handle on every worker's poller.
pub const WAKER_TOKEN: Token = Token(usize::MAX);

struct Timer {
    deadline: UnixInstant,
    cookie: u64,
}

pub struct Reactor<M> {
    poll: Poll,
    waker: Arc<Waker>,
    port: Port<M>,
    timers: Vec<Timer>,
    timeout: Duration,
}

impl<M> Reactor<M> {
    /// Assembles a reactor from its pre-built parts. `waker` must already
    /// be registered with `poll` under [`WAKER_TOKEN`], and `port` must be
    /// the mesh port whose wakeup handle is that same waker.
    pub fn new(poll: Poll, waker: Arc<Waker>, port: Port<M>, timeout: Duration) -> Self {
        Self {
            poll,
            waker,
            port,
            timers: Vec::new(),
            timeout,
        }
    }

    pub fn id(&self) -> usize {
        self.port.id()
    }

    pub fn nr_workers(&self) -> usize {
        self.port.nr_workers()
    }

    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// Sends a message to a peer worker, waking it if parked. On a full
    /// peer queue the message is returned; the caller retries, drops, or
    /// surfaces backpressure. Sending to self is a programmer error and
    /// panics.
    pub fn send_msg(&mut self, to: usize, msg: M) -> std::result::Result<(), M> {
        self.port.send(to, msg).map_err(|SendError(msg)| msg)
    }

    /// Wakes a peer without sending, to nudge it into draining its
    /// inboxes before a retry.
    pub fn kick(&self, to: usize) {
        self.port.kick(to);
    }

    /// Drains all inbound messages into `sink`. Returns whether any
    /// message arrived.
    pub fn poll_messages(&mut self, sink: &mut VecDeque<(usize, M)>) -> bool {
        self.port.poll(sink)
    }

    pub fn has_pending_messages(&self) -> bool {
        self.port.has_pending()
    }

    /// Schedules `cookie` to be delivered by [`Self::take_expired`] once
    /// the coarse clock reaches `deadline`.
    pub fn defer_at(&mut self, deadline: UnixInstant, cookie: u64) {
        self.timers.push(Timer { deadline, cookie });
    }

    /// Collects the cookies of expired timers into `sink`. Returns
    /// whether any timer fired.
    pub fn take_expired(&mut self, sink: &mut Vec<u64>) -> bool {
        let now = UnixInstant::recent();
        let before = sink.len();
        let mut i = 0;
        while i < self.timers.len() {
            if self.timers[i].deadline <= now {
                sink.push(self.timers.swap_remove(i).cookie);
            } else {
                i += 1;
            }
        }
        sink.len() > before
    }

    fn next_deadline(&self) -> Option<Duration> {
        let now = UnixInstant::recent();
        self.timers
            .iter()
            .map(|t| t.deadline.checked_duration_since(now).unwrap_or(0))
            .min()
            .map(|secs| Duration::from_secs(u64::from(secs)))
    }

    /// Polls for socket readiness. With `did_work` set the poll does not
    /// block; otherwise it blocks for the short worker timeout, clamped
    /// by the nearest timer deadline.
    pub fn poll(&mut self, events: &mut Events, did_work: bool) -> Result<()> {
        let timeout = if did_work {
            Duration::ZERO
        } else {
            match self.next_deadline() {
                Some(deadline) => self.timeout.min(deadline),
                None => self.timeout,
            }
        };
        let result = self.poll.poll(events, Some(timeout));
        self.waker.reset();
        match result {
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(()),
            other => other,
        }
    }

    /// Parks the worker until a socket becomes ready, a peer wakes us, or
    /// the nearest timer is due. Runs the handshake that prevents lost
    /// wakeups: if a message slipped in after the last drain the park is
    /// vetoed and this degrades to a non-blocking poll.
    pub fn park(&mut self, events: &mut Events) -> Result<()> {
        let timeout = if self.port.prepare_park() {
            self.next_deadline()
        } else {
            Some(Duration::ZERO)
        };
        let result = self.poll.poll(events, timeout);
        self.port.unpark();
        self.waker.reset();
        match result {
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(()),
            other => other,
        }
    }
}
