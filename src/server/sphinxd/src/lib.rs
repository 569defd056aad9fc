// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! sphinxd is an in-memory key/value cache speaking the memcached ASCII
//! protocol over TCP and UDP. It is built shared-nothing: one pinned
//! worker per core, each owning a disjoint shard of the keyspace, with
//! cross-worker communication only through lock-free SPSC queues.

#[macro_use]
extern crate log;

mod message;
mod process;
mod storage;
mod workers;

pub use process::{Process, ProcessBuilder};

use config::SphinxdConfig;

/// A running sphinxd instance.
pub struct Sphinxd {
    process: Process,
}

impl Sphinxd {
    /// Launches the worker threads for the given configuration.
    pub fn new(config: SphinxdConfig) -> Result<Self, std::io::Error> {
        let process = ProcessBuilder::new(config).spawn()?;
        Ok(Self { process })
    }

    /// Blocks until a shutdown signal arrives. Under normal operation
    /// this never returns.
    pub fn wait(self) {
        self.process.wait()
    }

    /// Stops the instance and blocks until every worker has joined.
    /// Primarily used by integration tests.
    pub fn shutdown(self) {
        self.process.shutdown()
    }
}
