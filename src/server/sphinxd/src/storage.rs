// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Maps memcached commands onto a worker's logmem shard. Only keys owned
//! by this worker ever reach these methods; routing happens in the worker
//! before execution.

use common::metrics::*;
use config::{LogmemConfig, SphinxdConfig};
use logmem::{Logmem, LogmemError};
use protocol_common::Execute;
use protocol_memcache::{Arithmetic, Cas, Delete, Get, Request, Response, Store, Value};

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Storage {
    data: Logmem,
}

impl Storage {
    /// Builds one worker's shard; the configured heap is divided evenly
    /// across `nr_workers` shards.
    pub fn new(config: &SphinxdConfig, nr_workers: usize) -> Self {
        let data = Logmem::builder()
            .heap_size(config.logmem().heap_size() / nr_workers)
            .segment_size(config.logmem().segment_size())
            .build();
        Self { data }
    }

    /// Looks up a single key, shaping the result for a values response.
    pub fn get_value(&mut self, key: &[u8], want_cas: bool) -> Option<Value> {
        CMD_GET.increment();
        match self.data.get(key) {
            Some(item) => {
                GET_HIT.increment();
                let cas = if want_cas { Some(item.cas()) } else { None };
                Some(Value::new(key, item.flags(), cas, item.value()))
            }
            None => {
                GET_MISS.increment();
                None
            }
        }
    }

    /// Unconditionally clears the shard.
    pub fn clear_now(&mut self) {
        self.data.clear();
    }

    fn get(&mut self, get: &Get, want_cas: bool) -> Response {
        let mut values = Vec::with_capacity(get.keys().len());
        for key in get.keys() {
            if let Some(value) = self.get_value(key, want_cas) {
                values.push(value);
            }
        }
        Response::values(values)
    }

    fn store(&mut self, store: &Store) -> Response {
        CMD_SET.increment();
        match self.data.insert(
            store.key(),
            store.value(),
            store.flags(),
            store.expiry().as_secs(),
        ) {
            Ok(()) => {
                SET_STORED.increment();
                Response::stored(store.noreply())
            }
            Err(e) => {
                SET_NOT_STORED.increment();
                storage_error(e)
            }
        }
    }

    fn add(&mut self, add: &Store) -> Response {
        if self.data.get(add.key()).is_some() {
            SET_NOT_STORED.increment();
            return Response::not_stored(add.noreply());
        }
        self.store(add)
    }

    fn replace(&mut self, replace: &Store) -> Response {
        if self.data.get(replace.key()).is_none() {
            SET_NOT_STORED.increment();
            return Response::not_stored(replace.noreply());
        }
        self.store(replace)
    }

    fn concat(&mut self, request: &Store, append: bool) -> Response {
        let (flags, expiry, combined) = match self.data.get(request.key()) {
            Some(item) => {
                let mut combined = Vec::with_capacity(item.value().len() + request.value().len());
                if append {
                    combined.extend_from_slice(item.value());
                    combined.extend_from_slice(request.value());
                } else {
                    combined.extend_from_slice(request.value());
                    combined.extend_from_slice(item.value());
                }
                // concatenation keeps the stored flags and expiry
                (item.flags(), item.expiry(), combined)
            }
            None => {
                SET_NOT_STORED.increment();
                return Response::not_stored(request.noreply());
            }
        };
        CMD_SET.increment();
        match self.data.insert(request.key(), &combined, flags, expiry) {
            Ok(()) => {
                SET_STORED.increment();
                Response::stored(request.noreply())
            }
            Err(e) => {
                SET_NOT_STORED.increment();
                storage_error(e)
            }
        }
    }

    fn cas(&mut self, cas: &Cas) -> Response {
        CMD_SET.increment();
        match self.data.cas_store(
            cas.key(),
            cas.value(),
            cas.flags(),
            cas.expiry().as_secs(),
            cas.cas(),
        ) {
            Ok(()) => {
                SET_STORED.increment();
                Response::stored(cas.noreply())
            }
            Err(LogmemError::Exists) => Response::exists(cas.noreply()),
            Err(LogmemError::NotFound) => Response::not_found(cas.noreply()),
            Err(e) => storage_error(e),
        }
    }

    fn delete(&mut self, delete: &Delete) -> Response {
        CMD_DELETE.increment();
        if self.data.delete(delete.key()) {
            Response::deleted(delete.noreply())
        } else {
            Response::not_found(delete.noreply())
        }
    }

    fn incr(&mut self, incr: &Arithmetic) -> Response {
        CMD_INCR.increment();
        match self.data.saturating_incr(incr.key(), incr.delta()) {
            Ok(value) => Response::numeric(value, incr.noreply()),
            Err(e) => arithmetic_error(e, incr.noreply()),
        }
    }

    fn decr(&mut self, decr: &Arithmetic) -> Response {
        CMD_DECR.increment();
        match self.data.saturating_decr(decr.key(), decr.delta()) {
            Ok(value) => Response::numeric(value, decr.noreply()),
            Err(e) => arithmetic_error(e, decr.noreply()),
        }
    }
}

fn storage_error(e: LogmemError) -> Response {
    match e {
        LogmemError::ItemOversized => Response::server_error("object too large for cache"),
        _ => Response::server_error("out of memory storing object"),
    }
}

fn arithmetic_error(e: LogmemError, noreply: bool) -> Response {
    match e {
        LogmemError::NotFound => Response::not_found(noreply),
        LogmemError::NotNumeric => {
            Response::client_error("cannot increment or decrement non-numeric value")
        }
        other => storage_error(other),
    }
}

impl Execute<Request, Response> for Storage {
    fn execute(&mut self, request: &Request) -> Response {
        match request {
            Request::Get(get) => self.get(get, false),
            Request::Gets(get) => self.get(get, true),
            Request::Set(store) => self.store(store),
            Request::Add(add) => self.add(add),
            Request::Replace(replace) => self.replace(replace),
            Request::Append(append) => self.concat(append, true),
            Request::Prepend(prepend) => self.concat(prepend, false),
            Request::Cas(cas) => self.cas(cas),
            Request::Delete(delete) => self.delete(delete),
            Request::Incr(incr) => self.incr(incr),
            Request::Decr(decr) => self.decr(decr),
            Request::FlushAll(flush_all) => {
                // broadcast and scheduling happen in the worker; at the
                // storage level a flush is an immediate clear
                self.clear_now();
                Response::ok(flush_all.noreply())
            }
            Request::Version => Response::version(VERSION),
            Request::Stats => Response::stats(common::metrics::snapshot()),
            Request::Quit => Response::hangup(),
        }
    }
}
