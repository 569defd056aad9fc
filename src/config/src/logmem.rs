// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};

// constants to define default values
const LOGMEM_HEAP_SIZE: usize = 64 * 1024 * 1024;
const LOGMEM_SEGMENT_SIZE: usize = 1024 * 1024;
const LOGMEM_MAX_KEY_LEN: usize = 250;

// helper functions
fn heap_size() -> usize {
    LOGMEM_HEAP_SIZE
}

fn segment_size() -> usize {
    LOGMEM_SEGMENT_SIZE
}

fn max_key_len() -> usize {
    LOGMEM_MAX_KEY_LEN
}

// definitions
#[derive(Serialize, Deserialize, Debug)]
pub struct Logmem {
    /// total bytes of item storage across all shards
    #[serde(default = "heap_size")]
    heap_size: usize,
    /// size of each append-only segment
    #[serde(default = "segment_size")]
    segment_size: usize,
    /// longest accepted key
    #[serde(default = "max_key_len")]
    max_key_len: usize,
}

// implementation
impl Logmem {
    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn max_key_len(&self) -> usize {
        self.max_key_len
    }

    pub fn set_heap_size(&mut self, bytes: usize) {
        self.heap_size = bytes;
    }

    pub fn set_segment_size(&mut self, bytes: usize) {
        self.segment_size = bytes;
    }
}

// trait implementations
impl Default for Logmem {
    fn default() -> Self {
        Self {
            heap_size: heap_size(),
            segment_size: segment_size(),
            max_key_len: max_key_len(),
        }
    }
}

// trait definitions
pub trait LogmemConfig {
    fn logmem(&self) -> &Logmem;
}
