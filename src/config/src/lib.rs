// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

mod buf;
mod debug;
mod logmem;
mod queue;
mod server;
mod sphinxd;
mod tcp;
mod worker;

pub use buf::{Buf, BufConfig};
pub use debug::{Debug, DebugConfig};
pub use logmem::{Logmem, LogmemConfig};
pub use queue::{Queue, QueueConfig};
pub use server::{Server, ServerConfig};
pub use sphinxd::SphinxdConfig;
pub use tcp::{Tcp, TcpConfig};
pub use worker::{Worker, WorkerConfig};
