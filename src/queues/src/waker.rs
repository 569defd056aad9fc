// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Wakeup handle for unblocking a parked worker.
//!
//! Wraps `mio::Waker` with a pending counter so that a burst of sends to
//! the same sleeping worker performs a single syscall. The receiver resets
//! the counter after its poll returns.

use core::sync::atomic::{AtomicU64, Ordering};

pub struct Waker {
    inner: mio::Waker,
    pending: AtomicU64,
}

impl Waker {
    pub fn new(registry: &mio::Registry, token: mio::Token) -> std::io::Result<Self> {
        Ok(Self {
            inner: mio::Waker::new(registry, token)?,
            pending: AtomicU64::new(0),
        })
    }

    /// Unblocks the owning worker's poll. Wakes at most once between
    /// resets.
    pub fn wake(&self) -> std::io::Result<()> {
        if self.pending.fetch_add(1, Ordering::Relaxed) == 0 {
            self.inner.wake()
        } else {
            Ok(())
        }
    }

    /// Re-arms the waker. Called by the owning worker after its poll
    /// returns.
    pub fn reset(&self) {
        self.pending.store(0, Ordering::Relaxed);
    }
}
