// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};

// constants to define default values
const QUEUE_DEPTH: usize = 512;
const QUEUE_RETRIES: usize = 3;

// helper functions
fn depth() -> usize {
    QUEUE_DEPTH
}

fn retries() -> usize {
    QUEUE_RETRIES
}

// definitions
#[derive(Serialize, Deserialize, Debug)]
pub struct Queue {
    /// capacity of each cross-worker ring
    #[serde(default = "depth")]
    depth: usize,
    /// send attempts before reporting busy
    #[serde(default = "retries")]
    retries: usize,
}

// implementation
impl Queue {
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn retries(&self) -> usize {
        self.retries
    }
}

// trait implementations
impl Default for Queue {
    fn default() -> Self {
        Self {
            depth: depth(),
            retries: retries(),
        }
    }
}

// trait definitions
pub trait QueueConfig {
    fn queue(&self) -> &Queue;
}
