// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use serde::{Deserialize, Serialize};

// constants to define default values
const DEBUG_LOG_LEVEL: &str = "info";

// helper functions
fn log_level() -> String {
    DEBUG_LOG_LEVEL.to_string()
}

// definitions
#[derive(Serialize, Deserialize, Debug)]
pub struct Debug {
    #[serde(default = "log_level")]
    log_level: String,
}

// implementation
impl Debug {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

// trait implementations
impl Default for Debug {
    fn default() -> Self {
        Self {
            log_level: log_level(),
        }
    }
}

// trait definitions
pub trait DebugConfig {
    fn debug(&self) -> &Debug;
}
