// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};

// constants to define default values
const BUF_MAX_RECV_BUFFER: usize = 256 * 1024;

// helper functions
fn max_recv_buffer() -> usize {
    BUF_MAX_RECV_BUFFER
}

// definitions
#[derive(Serialize, Deserialize, Debug)]
pub struct Buf {
    /// hard cap on a connection's unparsed receive buffer; a single
    /// command larger than this fails the connection
    #[serde(default = "max_recv_buffer")]
    max_recv_buffer: usize,
}

// implementation
impl Buf {
    pub fn max_recv_buffer(&self) -> usize {
        self.max_recv_buffer
    }
}

// trait implementations
impl Default for Buf {
    fn default() -> Self {
        Self {
            max_recv_buffer: max_recv_buffer(),
        }
    }
}

// trait definitions
pub trait BufConfig {
    fn buf(&self) -> &Buf;
}
