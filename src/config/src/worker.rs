// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};

// constants to define default values
const WORKER_THREADS: usize = 0;
const WORKER_TIMEOUT: usize = 1;
const WORKER_NEVENT: usize = 1024;

// helper functions
fn threads() -> usize {
    WORKER_THREADS
}

fn timeout() -> usize {
    WORKER_TIMEOUT
}

fn nevent() -> usize {
    WORKER_NEVENT
}

// definitions
#[derive(Serialize, Deserialize, Debug)]
pub struct Worker {
    /// number of worker threads, zero means one per available core
    #[serde(default = "threads")]
    threads: usize,
    /// poll timeout in milliseconds
    #[serde(default = "timeout")]
    timeout: usize,
    /// maximum events per poll
    #[serde(default = "nevent")]
    nevent: usize,
}

// implementation
impl Worker {
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn timeout(&self) -> usize {
        self.timeout
    }

    pub fn nevent(&self) -> usize {
        self.nevent
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads;
    }
}

// trait implementations
impl Default for Worker {
    fn default() -> Self {
        Self {
            threads: threads(),
            timeout: timeout(),
            nevent: nevent(),
        }
    }
}

// trait definitions
pub trait WorkerConfig {
    fn worker(&self) -> &Worker;
}
