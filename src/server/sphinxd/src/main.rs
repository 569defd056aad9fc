// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The sphinxd binary: parses the command line, loads the optional
//! configuration file, applies flag overrides, and launches the workers.

#[macro_use]
extern crate log;

use backtrace::Backtrace;
use clap::{App, Arg};
use config::{DebugConfig, SphinxdConfig};
use sphinxd::Sphinxd;

fn main() {
    // terminate the whole process after unwinding any worker panic
    std::panic::set_hook(Box::new(|s| {
        error!("{}", s);
        eprintln!("{:?}", Backtrace::new());
        std::process::exit(101);
    }));

    let matches = App::new("sphinxd")
        .version(env!("CARGO_PKG_VERSION"))
        .long_about(
            "A shared-nothing, thread-per-core key/value cache speaking \
            the memcached ASCII protocol over TCP and UDP. Each worker \
            owns a disjoint shard of the keyspace backed by log-structured \
            segment storage.",
        )
        .arg(
            Arg::with_name("CONFIG")
                .help("Server configuration file")
                .index(1),
        )
        .arg(
            Arg::with_name("listen-tcp")
                .long("listen-tcp")
                .value_name("IFACE:PORT")
                .help("TCP listen address")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("listen-udp")
                .long("listen-udp")
                .value_name("IFACE:PORT")
                .help("UDP listen address")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .value_name("N")
                .help("Number of worker threads, 0 means one per core")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("memory")
                .long("memory")
                .value_name("BYTES")
                .help("Total bytes of item storage")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("segment-size")
                .long("segment-size")
                .value_name("BYTES")
                .help("Size of each storage segment")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("backend")
                .long("backend")
                .value_name("BACKEND")
                .help("Event notification backend")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("stats")
                .short("s")
                .long("stats")
                .help("List all metrics in stats")
                .takes_value(false),
        )
        .arg(
            Arg::with_name("print-config")
                .help("List all options in config")
                .long("config")
                .short("c"),
        )
        .get_matches();

    if matches.is_present("stats") {
        for (name, _) in common::metrics::snapshot() {
            println!("{:<31} counter", name);
        }
        std::process::exit(0);
    }

    let mut config = if let Some(file) = matches.value_of("CONFIG") {
        match SphinxdConfig::load(file) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("unable to load config file: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Default::default()
    };

    if let Some(addr) = matches.value_of("listen-tcp") {
        config.server_mut().set_listen_tcp(addr.to_string());
    }
    if let Some(addr) = matches.value_of("listen-udp") {
        config.server_mut().set_listen_udp(addr.to_string());
    }
    if let Some(backend) = matches.value_of("backend") {
        config.server_mut().set_backend(backend.to_string());
    }
    if let Some(threads) = matches.value_of("threads") {
        match threads.parse() {
            Ok(threads) => config.worker_mut().set_threads(threads),
            Err(_) => {
                eprintln!("invalid value for --threads: {}", threads);
                std::process::exit(1);
            }
        }
    }
    if let Some(bytes) = matches.value_of("memory") {
        match bytes.parse() {
            Ok(bytes) => config.logmem_mut().set_heap_size(bytes),
            Err(_) => {
                eprintln!("invalid value for --memory: {}", bytes);
                std::process::exit(1);
            }
        }
    }
    if let Some(bytes) = matches.value_of("segment-size") {
        match bytes.parse() {
            Ok(bytes) => config.logmem_mut().set_segment_size(bytes),
            Err(_) => {
                eprintln!("invalid value for --segment-size: {}", bytes);
                std::process::exit(1);
            }
        }
    }

    if matches.is_present("print-config") {
        config.print();
        std::process::exit(0);
    }

    configure_logging(&config);

    match Sphinxd::new(config) {
        Ok(sphinxd) => sphinxd.wait(),
        Err(e) => {
            eprintln!("error launching sphinxd: {}", e);
            std::process::exit(1);
        }
    }
}

fn configure_logging(config: &SphinxdConfig) {
    let level = match config.debug().log_level() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}
