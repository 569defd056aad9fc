// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Inter-worker communication primitives.
//!
//! Workers are shared-nothing: the only mutable state crossing thread
//! boundaries is the mesh built here. Every directed worker pair owns one
//! single-producer/single-consumer ring, so no queue ever sees concurrent
//! producers or consumers. Senders wake sleeping receivers through a
//! per-worker [`Waker`] registered with that worker's poller.

mod mesh;
mod spsc;
mod waker;

pub use mesh::{mesh, Port, SendError};
pub use spsc::{ring, Consumer, Full, Producer};
pub use waker::Waker;
