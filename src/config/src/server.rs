// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};

// constants to define default values
const SERVER_LISTEN_TCP: &str = "127.0.0.1:11211";
const SERVER_LISTEN_UDP: &str = "127.0.0.1:11211";
const SERVER_BACKEND: &str = "epoll";

// helper functions
fn listen_tcp() -> String {
    SERVER_LISTEN_TCP.to_string()
}

fn listen_udp() -> String {
    SERVER_LISTEN_UDP.to_string()
}

fn backend() -> String {
    SERVER_BACKEND.to_string()
}

// definitions
#[derive(Serialize, Deserialize, Debug)]
pub struct Server {
    #[serde(default = "listen_tcp")]
    listen_tcp: String,
    #[serde(default = "listen_udp")]
    listen_udp: String,
    #[serde(default = "backend")]
    backend: String,
}

// implementation
impl Server {
    pub fn listen_tcp(&self) -> &str {
        &self.listen_tcp
    }

    pub fn listen_udp(&self) -> &str {
        &self.listen_udp
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn set_listen_tcp(&mut self, addr: String) {
        self.listen_tcp = addr;
    }

    pub fn set_listen_udp(&mut self, addr: String) {
        self.listen_udp = addr;
    }

    pub fn set_backend(&mut self, backend: String) {
        self.backend = backend;
    }
}

// trait implementations
impl Default for Server {
    fn default() -> Self {
        Self {
            listen_tcp: listen_tcp(),
            listen_udp: listen_udp(),
            backend: backend(),
        }
    }
}

// trait definitions
pub trait ServerConfig {
    fn server(&self) -> &Server;
}
