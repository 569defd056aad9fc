// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The per-core worker: one reactor, one logmem shard, the sessions it
//! accepted, and the dispatch that routes each command to the worker
//! owning its key.
//!
//! Every worker listens on the shared TCP and UDP ports; the kernel
//! spreads connections and datagrams across them. Commands for keys owned
//! elsewhere travel the mesh and their responses come back to the worker
//! holding the client connection.

use crate::message::{ConnId, Message, PendingId, ReplyTo};
use crate::storage::Storage;
use common::hash::key_owner;
use common::metrics::*;
use common::time::UnixInstant;
use config::{BufConfig, LogmemConfig, QueueConfig, SphinxdConfig, TcpConfig, WorkerConfig};
use mio::net::{TcpListener, UdpSocket};
use mio::{Events, Interest, Token};
use protocol_common::{Compose, Execute, Parse};
use protocol_memcache::{
    FrameHeader, Request, RequestParser, Response, Value, UDP_HEADER_SIZE, UDP_MAX_PAYLOAD,
};
use reactor::{net, Reactor};
use session::Session;
use slab::Slab;
use std::collections::VecDeque;
use std::io::{Error, ErrorKind, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) const LISTENER_TOKEN: Token = Token(usize::MAX - 1);
pub(crate) const UDP_TOKEN: Token = Token(usize::MAX - 2);

// timer cookie for a scheduled flush
const FLUSH_COOKIE: u64 = 1;

// largest possible datagram payload
const UDP_RECV_BUFFER: usize = 65535;

struct ServerSession {
    session: Session,
    gen: u32,
}

struct Pending {
    reply: ReplyTo,
    gen: u32,
    values: Vec<Option<Value>>,
    remaining: usize,
}

pub(crate) struct Worker {
    running: Arc<AtomicBool>,
    reactor: Reactor<Message>,
    storage: Storage,
    parser: RequestParser,
    listener: TcpListener,
    udp: UdpSocket,
    udp_buf: Box<[u8]>,
    sessions: Slab<ServerSession>,
    pending: Slab<Pending>,
    messages: VecDeque<(usize, Message)>,
    timer_fired: Vec<u64>,
    conn_gen: u32,
    pending_gen: u32,
    nevent: usize,
    retries: usize,
    nodelay: bool,
    max_recv_buffer: usize,
}

impl Worker {
    pub(crate) fn new(
        config: &SphinxdConfig,
        running: Arc<AtomicBool>,
        reactor: Reactor<Message>,
        storage: Storage,
        tcp_addr: SocketAddr,
        udp_addr: SocketAddr,
    ) -> Result<Self> {
        let mut listener = net::tcp_listener(tcp_addr, config.tcp().backlog())?;
        reactor
            .registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let mut udp = net::udp_socket(udp_addr)?;
        reactor
            .registry()
            .register(&mut udp, UDP_TOKEN, Interest::READABLE)?;

        let parser = RequestParser::new()
            .max_key_len(config.logmem().max_key_len())
            .max_value_size(config.logmem().segment_size());

        Ok(Self {
            running,
            reactor,
            storage,
            parser,
            listener,
            udp,
            udp_buf: vec![0u8; UDP_RECV_BUFFER].into_boxed_slice(),
            sessions: Slab::new(),
            pending: Slab::new(),
            messages: VecDeque::new(),
            timer_fired: Vec::new(),
            conn_gen: 0,
            pending_gen: 0,
            nevent: config.worker().nevent(),
            retries: config.queue().retries(),
            nodelay: config.tcp().nodelay(),
            max_recv_buffer: config.buf().max_recv_buffer(),
        })
    }

    /// The worker event loop. Each iteration drains cross-worker
    /// messages, runs due timers, polls for socket readiness, dispatches
    /// it, and parks only when the whole pass was idle.
    pub(crate) fn run(&mut self) {
        let mut events = Events::with_capacity(self.nevent);

        while self.running.load(Ordering::SeqCst) {
            common::time::refresh_clock();

            let msg_work = self.drain_messages();
            let timer_work = self.run_timers();

            if let Err(e) = self.reactor.poll(&mut events, msg_work || timer_work) {
                error!("worker {}: poll error: {}", self.reactor.id(), e);
            }
            let io_work = self.dispatch(&events);

            if !(msg_work || timer_work || io_work) {
                if let Err(e) = self.reactor.park(&mut events) {
                    error!("worker {}: park error: {}", self.reactor.id(), e);
                }
                self.dispatch(&events);
            }
        }

        // cooperative shutdown: close every connection on exit
        let registry = self.reactor.registry();
        for (_, server_session) in self.sessions.iter_mut() {
            let _ = server_session.session.deregister(registry);
        }
        self.sessions.clear();
    }

    fn dispatch(&mut self, events: &Events) -> bool {
        let mut any = false;
        for event in events.iter() {
            any = true;
            match event.token() {
                reactor::WAKER_TOKEN => {
                    // messages are drained at the top of the loop
                }
                LISTENER_TOKEN => self.accept(),
                UDP_TOKEN => self.udp_recv(),
                token => {
                    let slot = token.0;
                    if event.is_error() {
                        self.close(slot);
                        continue;
                    }
                    if event.is_writable() && self.write(slot).is_err() {
                        self.close(slot);
                        continue;
                    }
                    if event.is_readable() {
                        if let Err(e) = self.read(slot) {
                            if e.kind() != ErrorKind::NotFound {
                                self.close(slot);
                            }
                        }
                    }
                }
            }
        }
        any
    }

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    TCP_ACCEPT.increment();
                    let mut session = Session::new(stream, self.max_recv_buffer);
                    if self.nodelay {
                        let _ = session.set_nodelay(true);
                    }
                    self.conn_gen = self.conn_gen.wrapping_add(1);
                    let entry = self.sessions.vacant_entry();
                    let token = Token(entry.key());
                    let mut server_session = ServerSession {
                        session,
                        gen: self.conn_gen,
                    };
                    match server_session
                        .session
                        .register(self.reactor.registry(), token)
                    {
                        Ok(()) => {
                            entry.insert(server_session);
                        }
                        Err(e) => {
                            error!("failed to register connection: {}", e);
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn close(&mut self, slot: usize) {
        if self.sessions.contains(slot) {
            let mut server_session = self.sessions.remove(slot);
            let _ = server_session.session.deregister(self.reactor.registry());
            TCP_CLOSE.increment();
        }
    }

    /// Reads from a connection until it would block, parsing and routing
    /// every complete command.
    fn read(&mut self, slot: usize) -> Result<()> {
        loop {
            let filled = match self.sessions.get_mut(slot) {
                Some(server_session) => server_session.session.fill(),
                // the session was closed while processing (quit)
                None => return Err(Error::from(ErrorKind::NotFound)),
            };
            match filled {
                Ok(0) => {
                    // peer closed; handle any complete pipelined commands
                    // before tearing down
                    self.process_buffer(slot)?;
                    return Err(Error::new(ErrorKind::UnexpectedEof, "peer closed"));
                }
                Ok(_) => {
                    self.process_buffer(slot)?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.process_buffer(slot)?;
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::OutOfMemory => {
                    self.process_buffer(slot)?;
                    match self.sessions.get(slot) {
                        Some(server_session) if server_session.session.over_capacity() => {
                            // a single command exceeds the buffer cap
                            return Err(e);
                        }
                        Some(_) => {}
                        None => return Err(Error::from(ErrorKind::NotFound)),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Parses and routes every complete command in the session buffer.
    fn process_buffer(&mut self, slot: usize) -> Result<()> {
        loop {
            let (gen, parsed) = match self.sessions.get_mut(slot) {
                Some(server_session) => (
                    server_session.gen,
                    self.parser.parse(server_session.session.buffer()),
                ),
                None => return Ok(()),
            };

            let request = match parsed {
                Ok(ok) => {
                    let consumed = ok.consumed();
                    let request = ok.into_inner();
                    if let Some(server_session) = self.sessions.get_mut(slot) {
                        server_session.session.consume(consumed);
                    }
                    request
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(_) => {
                    // resynchronize at the next line terminator; the
                    // connection stays open
                    let resync = match self.sessions.get(slot) {
                        Some(server_session) => find_crlf(server_session.session.buffer()),
                        None => return Ok(()),
                    };
                    match resync {
                        Some(end) => {
                            if let Some(server_session) = self.sessions.get_mut(slot) {
                                server_session.session.consume(end);
                            }
                            let conn = ConnId { slot, gen };
                            self.deliver_tcp(
                                conn,
                                Response::client_error("bad command line format"),
                            );
                            continue;
                        }
                        // incomplete garbage; wait for the terminator
                        None => return Ok(()),
                    }
                }
            };

            let reply = ReplyTo::Tcp {
                conn: ConnId { slot, gen },
            };
            self.route(reply, request);
        }
    }

    fn write(&mut self, slot: usize) -> Result<()> {
        let server_session = self
            .sessions
            .get_mut(slot)
            .ok_or_else(|| Error::from(ErrorKind::NotFound))?;
        server_session.session.flush()?;
        let token = Token(slot);
        server_session
            .session
            .reregister(self.reactor.registry(), token)
    }

    /// Routes one parsed command: local keys execute against our shard,
    /// remote keys travel the mesh, multi-key gets scatter per key.
    fn route(&mut self, reply: ReplyTo, request: Request) {
        match &request {
            Request::Get(_) | Request::Gets(_) => self.route_get(reply, request),
            Request::FlushAll(_) => self.route_flush(reply, request),
            Request::Version | Request::Stats | Request::Quit => {
                let response = self.storage.execute(&request);
                self.deliver(reply, response);
            }
            _ => {
                // single-key commands always carry a routing key
                let key = request.routing_key().expect("command without key");
                let owner = key_owner(key, self.reactor.nr_workers());
                if owner == self.reactor.id() {
                    let response = self.storage.execute(&request);
                    self.deliver(reply, response);
                } else {
                    let noreply = request.noreply();
                    if let Err(Message::Request { reply, .. }) =
                        self.send_with_retry(owner, Message::Request { reply, request })
                    {
                        if !noreply {
                            self.deliver(reply, Response::server_error("busy"));
                        }
                    }
                }
            }
        }
    }

    fn route_get(&mut self, reply: ReplyTo, request: Request) {
        let (keys, want_cas) = match &request {
            Request::Get(get) => (get.keys(), false),
            Request::Gets(get) => (get.keys(), true),
            _ => unreachable!(),
        };

        let nr_workers = self.reactor.nr_workers();
        let me = self.reactor.id();

        if keys.iter().all(|key| key_owner(key, nr_workers) == me) {
            let response = self.storage.execute(&request);
            self.deliver(reply, response);
            return;
        }

        // scatter: local keys fill immediately, remote keys travel the
        // mesh and the response is assembled in request order
        self.pending_gen = self.pending_gen.wrapping_add(1);
        let gen = self.pending_gen;
        let mut values: Vec<Option<Value>> = Vec::with_capacity(keys.len());
        let mut remaining = 0;
        for key in keys {
            if key_owner(key, nr_workers) == me {
                values.push(self.storage.get_value(key, want_cas));
            } else {
                values.push(None);
                remaining += 1;
            }
        }

        let pending_slot = self.pending.insert(Pending {
            reply,
            gen,
            values,
            remaining,
        });
        let pending = PendingId {
            slot: pending_slot,
            gen,
        };

        let remote: Vec<(usize, Box<[u8]>)> = keys
            .iter()
            .enumerate()
            .filter(|(_, key)| key_owner(key, nr_workers) != me)
            .map(|(value_slot, key)| (value_slot, key.clone()))
            .collect();

        for (value_slot, key) in remote {
            let owner = key_owner(&key, nr_workers);
            let message = Message::GetKey {
                pending,
                value_slot,
                key,
                cas: want_cas,
            };
            if self.send_with_retry(owner, message).is_err() {
                let abandoned = self.pending.remove(pending_slot);
                self.deliver(abandoned.reply, Response::server_error("busy"));
                return;
            }
        }
    }

    fn route_flush(&mut self, reply: ReplyTo, request: Request) {
        let flush = match &request {
            Request::FlushAll(flush) => flush,
            _ => unreachable!(),
        };
        CMD_FLUSH.increment();

        let at = if flush.delay() == 0 {
            None
        } else {
            Some(UnixInstant::recent() + flush.delay())
        };
        let noreply = flush.noreply();

        for peer in 0..self.reactor.nr_workers() {
            if peer == self.reactor.id() {
                continue;
            }
            if self.send_with_retry(peer, Message::FlushAll { at }).is_err() {
                // the flush may be partial; surface the failure
                if !noreply {
                    self.deliver(reply, Response::server_error("busy"));
                }
                return;
            }
        }

        match at {
            None => self.storage.clear_now(),
            Some(deadline) => self.reactor.defer_at(deadline, FLUSH_COOKIE),
        }
        self.deliver(reply, Response::ok(noreply));
    }

    fn drain_messages(&mut self) -> bool {
        let mut messages = std::mem::take(&mut self.messages);
        self.reactor.poll_messages(&mut messages);
        let any = !messages.is_empty();
        if any {
            MSG_RECV.add(messages.len() as u64);
        }
        while let Some((from, message)) = messages.pop_front() {
            self.handle_message(from, message);
        }
        self.messages = messages;
        any
    }

    fn handle_message(&mut self, from: usize, message: Message) {
        match message {
            Message::Request { reply, request } => {
                let noreply = request.noreply();
                let response = self.storage.execute(&request);
                if noreply {
                    return;
                }
                if self
                    .send_with_retry(from, Message::Response { reply, response })
                    .is_err()
                {
                    // the origin never sees a reply; the client times out
                    error!("dropping response to worker {}: queue full", from);
                }
            }
            Message::Response { reply, response } => self.deliver(reply, response),
            Message::GetKey {
                pending,
                value_slot,
                key,
                cas,
            } => {
                let value = self.storage.get_value(&key, cas);
                let message = Message::GetValue {
                    pending,
                    value_slot,
                    value,
                };
                if self.send_with_retry(from, message).is_err() {
                    error!("dropping get value to worker {}: queue full", from);
                }
            }
            Message::GetValue {
                pending,
                value_slot,
                value,
            } => self.fill_pending(pending, value_slot, value),
            Message::FlushAll { at } => match at {
                None => self.storage.clear_now(),
                Some(deadline) => self.reactor.defer_at(deadline, FLUSH_COOKIE),
            },
        }
    }

    fn fill_pending(&mut self, pending: PendingId, value_slot: usize, value: Option<Value>) {
        let complete = match self.pending.get_mut(pending.slot) {
            Some(p) if p.gen == pending.gen => {
                p.values[value_slot] = value;
                p.remaining -= 1;
                p.remaining == 0
            }
            // the request was abandoned or the slot recycled
            _ => return,
        };
        if complete {
            let p = self.pending.remove(pending.slot);
            let values: Vec<Value> = p.values.into_iter().flatten().collect();
            self.deliver(p.reply, Response::values(values));
        }
    }

    fn run_timers(&mut self) -> bool {
        let mut fired = std::mem::take(&mut self.timer_fired);
        let any = self.reactor.take_expired(&mut fired);
        for cookie in fired.drain(..) {
            if cookie == FLUSH_COOKIE {
                self.storage.clear_now();
            }
        }
        self.timer_fired = fired;
        any
    }

    /// Bounded retry against a full peer queue, waking the peer between
    /// attempts so it drains. Returns the message on persistent failure.
    fn send_with_retry(&mut self, to: usize, message: Message) -> std::result::Result<(), Message> {
        MSG_SEND.increment();
        let mut message = message;
        for attempt in 0..self.retries.max(1) {
            match self.reactor.send_msg(to, message) {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    message = returned;
                    if attempt + 1 < self.retries.max(1) {
                        MSG_SEND_RETRY.increment();
                        self.reactor.kick(to);
                        std::thread::yield_now();
                    }
                }
            }
        }
        MSG_SEND_FAIL.increment();
        Err(message)
    }

    fn deliver(&mut self, reply: ReplyTo, response: Response) {
        match reply {
            ReplyTo::Tcp { conn } => self.deliver_tcp(conn, response),
            ReplyTo::Udp { peer, request_id } => self.deliver_udp(peer, request_id, response),
        }
    }

    fn deliver_tcp(&mut self, conn: ConnId, response: Response) {
        let server_session = match self.sessions.get_mut(conn.slot) {
            Some(s) if s.gen == conn.gen => s,
            // the connection went away while the command was in flight
            _ => return,
        };

        let hangup = response.should_hangup();
        response.compose(server_session.session.write_buffer());

        match server_session.session.flush() {
            Ok(_) => {}
            Err(_) => {
                // reset or broken pipe: silent drop
                self.close(conn.slot);
                return;
            }
        }

        if hangup {
            self.close(conn.slot);
            return;
        }

        if server_session.session.write_pending() > 0 {
            let token = Token(conn.slot);
            if server_session
                .session
                .reregister(self.reactor.registry(), token)
                .is_err()
            {
                self.close(conn.slot);
            }
        }
    }

    fn deliver_udp(&mut self, peer: SocketAddr, request_id: u16, response: Response) {
        let mut body = Vec::new();
        response.compose(&mut body);
        if body.is_empty() {
            return;
        }

        let total = FrameHeader::fragments(body.len());
        if total > u16::MAX as usize {
            error!("udp response of {} bytes dropped", body.len());
            return;
        }

        for (sequence, chunk) in body.chunks(UDP_MAX_PAYLOAD).enumerate() {
            let header = FrameHeader {
                request_id,
                sequence: sequence as u16,
                total: total as u16,
                reserved: 0,
            };
            let mut datagram = Vec::with_capacity(chunk.len() + UDP_HEADER_SIZE);
            header.compose(&mut datagram);
            datagram.extend_from_slice(chunk);
            match self.udp.send_to(&datagram, peer) {
                Ok(_) => UDP_SEND.increment(),
                Err(_) => {
                    // best effort: a reply datagram that cannot be sent
                    // now is dropped
                    return;
                }
            }
        }
    }

    fn udp_recv(&mut self) {
        loop {
            match self.udp.recv_from(&mut self.udp_buf) {
                Ok((len, peer)) => {
                    UDP_RECV.increment();
                    let datagram = self.udp_buf[..len].to_vec();
                    self.handle_datagram(&datagram, peer);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("udp recv failed: {}", e);
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, datagram: &[u8], peer: SocketAddr) {
        let (header, payload) = match FrameHeader::parse(datagram) {
            Some(parsed) => parsed,
            None => return,
        };
        // requests must fit a single datagram
        if header.sequence != 0 {
            return;
        }

        let reply = ReplyTo::Udp {
            peer,
            request_id: header.request_id,
        };
        match self.parser.parse(payload) {
            Ok(ok) => {
                let request = ok.into_inner();
                self.route(reply, request);
            }
            Err(_) => {
                self.deliver(reply, Response::client_error("bad command line format"));
            }
        }
    }
}

/// Position just past the first CRLF, if the buffer holds one.
fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(2)
        .position(|pair| pair == b"\r\n")
        .map(|at| at + 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_scanner() {
        assert_eq!(find_crlf(b""), None);
        assert_eq!(find_crlf(b"garbage"), None);
        assert_eq!(find_crlf(b"garbage\r"), None);
        assert_eq!(find_crlf(b"garbage\r\n"), Some(9));
        assert_eq!(find_crlf(b"\r\nget k\r\n"), Some(2));
    }
}
