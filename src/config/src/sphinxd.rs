// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::*;
use log::error;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// The aggregated configuration for a sphinxd instance. Every section is
/// optional in the file; missing sections and fields take their defaults.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SphinxdConfig {
    #[serde(default)]
    server: Server,
    #[serde(default)]
    worker: Worker,
    #[serde(default)]
    logmem: Logmem,
    #[serde(default)]
    tcp: Tcp,
    #[serde(default)]
    buf: Buf,
    #[serde(default)]
    queue: Queue,
    #[serde(default)]
    debug: Debug,
}

impl SphinxdConfig {
    pub fn load(file: &str) -> Result<Self, std::io::Error> {
        let mut file = std::fs::File::open(file)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                error!("{}", e);
                Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "Error parsing config",
                ))
            }
        }
    }

    pub fn print(&self) {
        match toml::to_string_pretty(self) {
            Ok(contents) => println!("{}", contents),
            Err(e) => error!("failed to serialize config: {}", e),
        }
    }

    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }

    pub fn worker_mut(&mut self) -> &mut Worker {
        &mut self.worker
    }

    pub fn logmem_mut(&mut self) -> &mut Logmem {
        &mut self.logmem
    }
}

impl ServerConfig for SphinxdConfig {
    fn server(&self) -> &Server {
        &self.server
    }
}

impl WorkerConfig for SphinxdConfig {
    fn worker(&self) -> &Worker {
        &self.worker
    }
}

impl LogmemConfig for SphinxdConfig {
    fn logmem(&self) -> &Logmem {
        &self.logmem
    }
}

impl TcpConfig for SphinxdConfig {
    fn tcp(&self) -> &Tcp {
        &self.tcp
    }
}

impl BufConfig for SphinxdConfig {
    fn buf(&self) -> &Buf {
        &self.buf
    }
}

impl QueueConfig for SphinxdConfig {
    fn queue(&self) -> &Queue {
        &self.queue
    }
}

impl DebugConfig for SphinxdConfig {
    fn debug(&self) -> &Debug {
        &self.debug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SphinxdConfig::default();
        assert_eq!(config.server().listen_tcp(), "127.0.0.1:11211");
        assert_eq!(config.server().backend(), "epoll");
        assert_eq!(config.worker().threads(), 0);
        assert_eq!(config.worker().timeout(), 1);
        assert_eq!(config.logmem().segment_size(), 1024 * 1024);
        assert_eq!(config.queue().depth(), 512);
        assert_eq!(config.buf().max_recv_buffer(), 256 * 1024);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: SphinxdConfig = toml::from_str(
            "[server]\nlisten_tcp = \"0.0.0.0:11300\"\n[logmem]\nsegment_size = 4096\n",
        )
        .unwrap();
        assert_eq!(config.server().listen_tcp(), "0.0.0.0:11300");
        assert_eq!(config.server().listen_udp(), "127.0.0.1:11211");
        assert_eq!(config.logmem().segment_size(), 4096);
        assert_eq!(config.logmem().heap_size(), 64 * 1024 * 1024);
    }
}
