// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! A coarse process-wide clock with one-second resolution.
//!
//! Reading the system clock on every item operation is wasteful when the
//! server only needs second-granular timestamps for expiry and segment
//! aging. Instead, each worker refreshes a shared cached value once per
//! event-loop iteration and all other callers read the cache.

use core::ops::Add;
use core::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static CLOCK: AtomicU32 = AtomicU32::new(0);

fn system_now() -> u32 {
    // times before the epoch and after 2106 are outside the supported range
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Re-reads the system clock into the cached value. Called once per
/// event-loop iteration by each worker.
pub fn refresh_clock() {
    CLOCK.store(system_now(), Ordering::Relaxed);
}

/// A point in time expressed as whole seconds since the unix epoch.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnixInstant {
    secs: u32,
}

impl UnixInstant {
    pub fn from_secs(secs: u32) -> Self {
        Self { secs }
    }

    pub fn as_secs(self) -> u32 {
        self.secs
    }

    /// Returns the cached coarse time, falling back to a direct clock read
    /// if `refresh_clock()` has never run.
    pub fn recent() -> Self {
        let secs = CLOCK.load(Ordering::Relaxed);
        if secs == 0 {
            refresh_clock();
            return Self {
                secs: CLOCK.load(Ordering::Relaxed),
            };
        }
        Self { secs }
    }

    /// Reads the system clock directly, bypassing the cache.
    pub fn now() -> Self {
        Self { secs: system_now() }
    }

    pub fn checked_duration_since(self, earlier: Self) -> Option<u32> {
        self.secs.checked_sub(earlier.secs)
    }
}

impl Add<u32> for UnixInstant {
    type Output = UnixInstant;

    fn add(self, secs: u32) -> Self {
        Self {
            secs: self.secs.saturating_add(secs),
        }
    }
}
