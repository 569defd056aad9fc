// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Process assembly: builds the mesh, spawns one pinned worker per core,
//! and coordinates cooperative shutdown.
//!
//! The mesh (queues, sleep flags, wakeup handles) is the only state every
//! worker must be able to name, so it is constructed here before any
//! worker starts and torn down after all have joined.

use crate::message::Message;
use crate::storage::Storage;
use crate::workers::Worker;
use config::{LogmemConfig, QueueConfig, ServerConfig, SphinxdConfig, WorkerConfig};
use mio::Poll;
use queues::{mesh, Waker};
use reactor::{Reactor, WAKER_TOKEN};
use std::io::{Error, ErrorKind, Result};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const THREAD_PREFIX: &str = "sphinxd";

pub struct ProcessBuilder {
    config: SphinxdConfig,
}

impl ProcessBuilder {
    pub fn new(config: SphinxdConfig) -> Self {
        Self { config }
    }

    /// Validates the configuration, builds the mesh, and launches the
    /// workers. Any error here is fatal to startup.
    pub fn spawn(self) -> Result<Process> {
        let config = self.config;

        if config.server().backend() != "epoll" {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("unsupported backend: {}", config.server().backend()),
            ));
        }

        let tcp_addr = resolve(config.server().listen_tcp())?;
        let udp_addr = resolve(config.server().listen_udp())?;

        let nr_workers = match config.worker().threads() {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };

        if config.logmem().heap_size() / nr_workers < config.logmem().segment_size() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "memory limit too small to give every worker one segment",
            ));
        }

        // workers inherit the blocked shutdown signals; wait() sigwaits
        // on them from the spawning thread
        block_shutdown_signals();

        let mut polls = Vec::with_capacity(nr_workers);
        let mut wakers = Vec::with_capacity(nr_workers);
        for _ in 0..nr_workers {
            let poll = Poll::new()?;
            let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
            polls.push(poll);
            wakers.push(waker);
        }
        let ports = mesh::<Message>(nr_workers, config.queue().depth(), wakers.clone());

        let running = Arc::new(AtomicBool::new(true));
        let timeout = Duration::from_millis(config.worker().timeout() as u64);

        let mut workers = Vec::with_capacity(nr_workers);
        for ((poll, waker), port) in polls.into_iter().zip(wakers.iter()).zip(ports) {
            let reactor = Reactor::new(poll, waker.clone(), port, timeout);
            let storage = Storage::new(&config, nr_workers);
            workers.push(Worker::new(
                &config,
                running.clone(),
                reactor,
                storage,
                tcp_addr,
                udp_addr,
            )?);
        }

        let core_ids = core_affinity::get_core_ids().unwrap_or_default();
        let mut threads = Vec::with_capacity(nr_workers);
        for (id, mut worker) in workers.into_iter().enumerate() {
            let core = core_ids.get(id % core_ids.len().max(1)).copied();
            let thread = std::thread::Builder::new()
                .name(format!("{}_w{}", THREAD_PREFIX, id))
                .spawn(move || {
                    if let Some(core) = core {
                        core_affinity::set_for_current(core);
                    }
                    info!("worker {} running", id);
                    worker.run();
                    info!("worker {} stopped", id);
                })?;
            threads.push(thread);
        }

        Ok(Process {
            threads,
            wakers,
            running,
        })
    }
}

pub struct Process {
    threads: Vec<JoinHandle<()>>,
    wakers: Vec<Arc<Waker>>,
    running: Arc<AtomicBool>,
}

impl Process {
    /// Blocks until SIGINT or SIGTERM arrives, then shuts down cleanly.
    pub fn wait(self) {
        wait_for_shutdown_signal();
        info!("shutdown signal received");
        self.shutdown();
    }

    /// Flags every worker to stop, wakes the parked ones, and joins.
    /// In-flight handlers run to completion; open connections close on
    /// worker exit.
    pub fn shutdown(self) {
        self.running.store(false, Ordering::SeqCst);
        for waker in &self.wakers {
            let _ = waker.wake();
        }
        for thread in self.threads {
            let _ = thread.join();
        }
    }
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    addr.to_socket_addrs()?.next().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("address does not resolve: {}", addr),
        )
    })
}

fn shutdown_sigset() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGINT);
        libc::sigaddset(&mut set, libc::SIGTERM);
        set
    }
}

fn block_shutdown_signals() {
    let set = shutdown_sigset();
    unsafe {
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }
}

fn wait_for_shutdown_signal() {
    let set = shutdown_sigset();
    let mut signal: libc::c_int = 0;
    loop {
        let rc = unsafe { libc::sigwait(&set, &mut signal) };
        if rc == 0 && (signal == libc::SIGINT || signal == libc::SIGTERM) {
            return;
        }
        if rc != 0 && rc != libc::EINTR {
            error!("sigwait failed: {}", rc);
            return;
        }
    }
}
