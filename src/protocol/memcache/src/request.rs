// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::*;
use common::time::UnixInstant;
use core::fmt::{Display, Formatter};
use protocol_common::{BufMut, Compose, Parse, ParseOk, CRLF};

pub const DEFAULT_MAX_KEY_LEN: usize = 250;
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1024 * 1024;

// relative expiration times above this are unix timestamps
const EXPIRY_UNIX_THRESHOLD: i64 = 60 * 60 * 24 * 30;

/// Entry expiration, normalized to an absolute coarse timestamp at parse
/// time. `Never` survives until its segment is recycled.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Expiry {
    Never,
    At(UnixInstant),
}

impl Expiry {
    /// Converts a wire-format exptime. Zero means no expiration, negative
    /// values expire immediately, values up to thirty days are relative
    /// seconds, and anything larger is an absolute unix timestamp.
    pub fn from_wire(exptime: i64) -> Self {
        if exptime == 0 {
            Expiry::Never
        } else if exptime < 0 {
            Expiry::At(UnixInstant::from_secs(1))
        } else if exptime > EXPIRY_UNIX_THRESHOLD {
            let secs = if exptime > u32::MAX as i64 {
                u32::MAX
            } else {
                exptime as u32
            };
            Expiry::At(UnixInstant::from_secs(secs))
        } else {
            Expiry::At(UnixInstant::recent() + exptime as u32)
        }
    }

    /// The storage encoding: absolute seconds, with zero reserved for no
    /// expiration.
    pub fn as_secs(self) -> u32 {
        match self {
            Expiry::Never => 0,
            Expiry::At(t) => t.as_secs().max(1),
        }
    }

    pub fn from_secs(secs: u32) -> Self {
        if secs == 0 {
            Expiry::Never
        } else {
            Expiry::At(UnixInstant::from_secs(secs))
        }
    }

    pub fn is_expired(self, now: UnixInstant) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(t) => t <= now,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Get {
    pub(crate) keys: Box<[Box<[u8]>]>,
}

impl Get {
    pub fn new(keys: Box<[Box<[u8]>]>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &[Box<[u8]>] {
        &self.keys
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Store {
    pub(crate) key: Box<[u8]>,
    pub(crate) value: Box<[u8]>,
    pub(crate) flags: u32,
    pub(crate) expiry: Expiry,
    pub(crate) noreply: bool,
}

impl Store {
    pub fn new(key: &[u8], value: &[u8], flags: u32, expiry: Expiry, noreply: bool) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            flags,
            expiry,
            noreply,
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    pub fn noreply(&self) -> bool {
        self.noreply
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Cas {
    pub(crate) key: Box<[u8]>,
    pub(crate) value: Box<[u8]>,
    pub(crate) flags: u32,
    pub(crate) expiry: Expiry,
    pub(crate) cas: u64,
    pub(crate) noreply: bool,
}

impl Cas {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    pub fn cas(&self) -> u64 {
        self.cas
    }

    pub fn noreply(&self) -> bool {
        self.noreply
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Delete {
    pub(crate) key: Box<[u8]>,
    pub(crate) noreply: bool,
}

impl Delete {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn noreply(&self) -> bool {
        self.noreply
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Arithmetic {
    pub(crate) key: Box<[u8]>,
    pub(crate) delta: u64,
    pub(crate) noreply: bool,
}

impl Arithmetic {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn delta(&self) -> u64 {
        self.delta
    }

    pub fn noreply(&self) -> bool {
        self.noreply
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct FlushAll {
    pub(crate) delay: u32,
    pub(crate) noreply: bool,
}

impl FlushAll {
    pub fn delay(&self) -> u32 {
        self.delay
    }

    pub fn noreply(&self) -> bool {
        self.noreply
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Request {
    Get(Get),
    Gets(Get),
    Set(Store),
    Add(Store),
    Replace(Store),
    Append(Store),
    Prepend(Store),
    Cas(Cas),
    Delete(Delete),
    Incr(Arithmetic),
    Decr(Arithmetic),
    FlushAll(FlushAll),
    Version,
    Stats,
    Quit,
}

impl Request {
    pub fn noreply(&self) -> bool {
        match self {
            Request::Set(r) | Request::Add(r) | Request::Replace(r) | Request::Append(r)
            | Request::Prepend(r) => r.noreply,
            Request::Cas(r) => r.noreply,
            Request::Delete(r) => r.noreply,
            Request::Incr(r) | Request::Decr(r) => r.noreply,
            Request::FlushAll(r) => r.noreply,
            _ => false,
        }
    }

    /// The key deciding which shard executes this command. `None` for
    /// commands that are keyless or routed per key (`get`/`gets`).
    pub fn routing_key(&self) -> Option<&[u8]> {
        match self {
            Request::Set(r) | Request::Add(r) | Request::Replace(r) | Request::Append(r)
            | Request::Prepend(r) => Some(&r.key),
            Request::Cas(r) => Some(&r.key),
            Request::Delete(r) => Some(&r.key),
            Request::Incr(r) | Request::Decr(r) => Some(&r.key),
            _ => None,
        }
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Request::Get(_) => write!(f, "get"),
            Request::Gets(_) => write!(f, "gets"),
            Request::Set(_) => write!(f, "set"),
            Request::Add(_) => write!(f, "add"),
            Request::Replace(_) => write!(f, "replace"),
            Request::Append(_) => write!(f, "append"),
            Request::Prepend(_) => write!(f, "prepend"),
            Request::Cas(_) => write!(f, "cas"),
            Request::Delete(_) => write!(f, "delete"),
            Request::Incr(_) => write!(f, "incr"),
            Request::Decr(_) => write!(f, "decr"),
            Request::FlushAll(_) => write!(f, "flush_all"),
            Request::Version => write!(f, "version"),
            Request::Stats => write!(f, "stats"),
            Request::Quit => write!(f, "quit"),
        }
    }
}

#[derive(Copy, Clone)]
pub struct RequestParser {
    max_key_len: usize,
    max_value_size: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self {
            max_key_len: DEFAULT_MAX_KEY_LEN,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn max_key_len(mut self, bytes: usize) -> Self {
        self.max_key_len = bytes;
        self
    }

    pub fn max_value_size(mut self, bytes: usize) -> Self {
        self.max_value_size = bytes;
        self
    }

    pub fn parse_request<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], Request> {
        let (remaining, token) = take_till(|b| (b == b' ' || b == b'\r'))(input)?;
        match token {
            b"get" | b"GET" => {
                let (input, request) = self.parse_get(remaining)?;
                Ok((input, Request::Get(request)))
            }
            b"gets" | b"GETS" => {
                let (input, request) = self.parse_get(remaining)?;
                Ok((input, Request::Gets(request)))
            }
            b"set" | b"SET" => {
                let (input, request) = self.parse_store(remaining)?;
                Ok((input, Request::Set(request)))
            }
            b"add" | b"ADD" => {
                let (input, request) = self.parse_store(remaining)?;
                Ok((input, Request::Add(request)))
            }
            b"replace" | b"REPLACE" => {
                let (input, request) = self.parse_store(remaining)?;
                Ok((input, Request::Replace(request)))
            }
            b"append" | b"APPEND" => {
                let (input, request) = self.parse_store(remaining)?;
                Ok((input, Request::Append(request)))
            }
            b"prepend" | b"PREPEND" => {
                let (input, request) = self.parse_store(remaining)?;
                Ok((input, Request::Prepend(request)))
            }
            b"cas" | b"CAS" => {
                let (input, request) = self.parse_cas(remaining)?;
                Ok((input, Request::Cas(request)))
            }
            b"delete" | b"DELETE" => {
                let (input, request) = self.parse_delete(remaining)?;
                Ok((input, Request::Delete(request)))
            }
            b"incr" | b"INCR" => {
                let (input, request) = self.parse_arithmetic(remaining)?;
                Ok((input, Request::Incr(request)))
            }
            b"decr" | b"DECR" => {
                let (input, request) = self.parse_arithmetic(remaining)?;
                Ok((input, Request::Decr(request)))
            }
            b"flush_all" | b"FLUSH_ALL" => {
                let (input, request) = self.parse_flush_all(remaining)?;
                Ok((input, Request::FlushAll(request)))
            }
            b"version" | b"VERSION" => {
                let (input, _) = line_end(remaining)?;
                Ok((input, Request::Version))
            }
            b"stats" | b"STATS" => {
                // stat subcommands are accepted and ignored
                let (input, _) = take_till(|b| b == b'\r')(remaining)?;
                let (input, _) = crlf(input)?;
                Ok((input, Request::Stats))
            }
            b"quit" | b"QUIT" => {
                let (input, _) = line_end(remaining)?;
                Ok((input, Request::Quit))
            }
            _ => Err(nom::Err::Failure((input, ErrorKind::Tag))),
        }
    }

    fn parse_get<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], Get> {
        let (mut input, _) = space1(input)?;
        let mut keys = Vec::new();
        loop {
            let (i, k) = key(input, self.max_key_len)?;
            match k {
                Some(k) => {
                    keys.push(k.to_owned().into_boxed_slice());
                    input = i;
                }
                None => break,
            }
            match space1(input) {
                Ok((i, _)) => input = i,
                Err(nom::Err::Incomplete(n)) => return Err(nom::Err::Incomplete(n)),
                Err(_) => break,
            }
        }
        if keys.is_empty() {
            return Err(nom::Err::Failure((input, ErrorKind::Tag)));
        }
        let (input, _) = line_end(input)?;
        Ok((
            input,
            Get {
                keys: keys.into_boxed_slice(),
            },
        ))
    }

    fn parse_store<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], Store> {
        let (input, _) = space1(input)?;
        let (input, k) = key(input, self.max_key_len)?;
        let k = match k {
            Some(k) => k,
            None => {
                return Err(nom::Err::Failure((input, ErrorKind::Tag)));
            }
        };
        let (input, _) = space1(input)?;
        let (input, flags) = parse_u32(input)?;
        let (input, _) = space1(input)?;
        let (input, exptime) = parse_i64(input)?;
        let (input, _) = space1(input)?;
        let (input, bytes) = parse_usize(input)?;
        if bytes > self.max_value_size {
            return Err(nom::Err::Failure((input, ErrorKind::Tag)));
        }
        let (input, noreply) = parse_noreply(input)?;
        let (input, _) = line_end(input)?;
        let (input, value) = take(bytes)(input)?;
        let (input, _) = crlf(input)?;
        Ok((
            input,
            Store {
                key: k.to_owned().into_boxed_slice(),
                value: value.to_owned().into_boxed_slice(),
                flags,
                expiry: Expiry::from_wire(exptime),
                noreply,
            },
        ))
    }

    fn parse_cas<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], Cas> {
        let (input, _) = space1(input)?;
        let (input, k) = key(input, self.max_key_len)?;
        let k = match k {
            Some(k) => k,
            None => {
                return Err(nom::Err::Failure((input, ErrorKind::Tag)));
            }
        };
        let (input, _) = space1(input)?;
        let (input, flags) = parse_u32(input)?;
        let (input, _) = space1(input)?;
        let (input, exptime) = parse_i64(input)?;
        let (input, _) = space1(input)?;
        let (input, bytes) = parse_usize(input)?;
        if bytes > self.max_value_size {
            return Err(nom::Err::Failure((input, ErrorKind::Tag)));
        }
        let (input, _) = space1(input)?;
        let (input, cas) = parse_u64(input)?;
        let (input, noreply) = parse_noreply(input)?;
        let (input, _) = line_end(input)?;
        let (input, value) = take(bytes)(input)?;
        let (input, _) = crlf(input)?;
        Ok((
            input,
            Cas {
                key: k.to_owned().into_boxed_slice(),
                value: value.to_owned().into_boxed_slice(),
                flags,
                expiry: Expiry::from_wire(exptime),
                cas,
                noreply,
            },
        ))
    }

    fn parse_delete<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], Delete> {
        let (input, _) = space1(input)?;
        let (input, k) = key(input, self.max_key_len)?;
        let k = match k {
            Some(k) => k,
            None => {
                return Err(nom::Err::Failure((input, ErrorKind::Tag)));
            }
        };
        let (input, noreply) = parse_noreply(input)?;
        let (input, _) = line_end(input)?;
        Ok((
            input,
            Delete {
                key: k.to_owned().into_boxed_slice(),
                noreply,
            },
        ))
    }

    fn parse_arithmetic<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], Arithmetic> {
        let (input, _) = space1(input)?;
        let (input, k) = key(input, self.max_key_len)?;
        let k = match k {
            Some(k) => k,
            None => {
                return Err(nom::Err::Failure((input, ErrorKind::Tag)));
            }
        };
        let (input, _) = space1(input)?;
        let (input, delta) = parse_u64(input)?;
        let (input, noreply) = parse_noreply(input)?;
        let (input, _) = line_end(input)?;
        Ok((
            input,
            Arithmetic {
                key: k.to_owned().into_boxed_slice(),
                delta,
                noreply,
            },
        ))
    }

    fn parse_flush_all<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], FlushAll> {
        let (input, _) = space0(input)?;
        let (input, delay) = match parse_u32(input) {
            Ok((input, delay)) => (input, delay),
            Err(nom::Err::Incomplete(n)) => return Err(nom::Err::Incomplete(n)),
            Err(_) => (input, 0),
        };
        let (input, noreply) = parse_noreply(input)?;
        let (input, _) = line_end(input)?;
        Ok((input, FlushAll { delay, noreply }))
    }
}

// consumes optional trailing spaces and the line terminator
fn line_end(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, _) = space0(input)?;
    crlf(input)
}

// consumes an optional " noreply" token
fn parse_noreply(input: &[u8]) -> IResult<&[u8], bool> {
    let (stripped, _) = space0(input)?;
    match tag::<_, _, (&[u8], nom::error::ErrorKind)>(&b"noreply"[..])(stripped) {
        Ok((input, _)) => Ok((input, true)),
        Err(nom::Err::Incomplete(n)) => Err(nom::Err::Incomplete(n)),
        Err(_) => Ok((input, false)),
    }
}

impl Parse<Request> for RequestParser {
    fn parse(&self, buffer: &[u8]) -> Result<ParseOk<Request>, std::io::Error> {
        match self.parse_request(buffer) {
            Ok((input, request)) => Ok(ParseOk::new(request, buffer.len() - input.len())),
            Err(Err::Incomplete(_)) => Err(std::io::Error::from(std::io::ErrorKind::WouldBlock)),
            Err(_) => Err(std::io::Error::from(std::io::ErrorKind::InvalidInput)),
        }
    }
}

fn compose_store(verb: &[u8], request: &Store, dst: &mut dyn BufMut) -> usize {
    let header = format!(
        " {} {} {}{}",
        request.flags,
        request.expiry.as_secs(),
        request.value.len(),
        if request.noreply { " noreply" } else { "" }
    )
    .into_bytes();

    let size = verb.len()
        + request.key.len()
        + header.len()
        + CRLF.len()
        + request.value.len()
        + CRLF.len();

    dst.put_slice(verb);
    dst.put_slice(&request.key);
    dst.put_slice(&header);
    dst.put_slice(CRLF);
    dst.put_slice(&request.value);
    dst.put_slice(CRLF);

    size
}

impl Compose for Request {
    fn compose(&self, dst: &mut dyn BufMut) -> usize {
        match self {
            Request::Get(r) | Request::Gets(r) => {
                let verb: &[u8] = if matches!(self, Request::Gets(_)) {
                    b"gets"
                } else {
                    b"get"
                };
                let mut size = verb.len();
                dst.put_slice(verb);
                for key in r.keys.iter() {
                    dst.put_slice(b" ");
                    dst.put_slice(key);
                    size += 1 + key.len();
                }
                dst.put_slice(CRLF);
                size + CRLF.len()
            }
            Request::Set(r) => compose_store(b"set ", r, dst),
            Request::Add(r) => compose_store(b"add ", r, dst),
            Request::Replace(r) => compose_store(b"replace ", r, dst),
            Request::Append(r) => compose_store(b"append ", r, dst),
            Request::Prepend(r) => compose_store(b"prepend ", r, dst),
            Request::Cas(r) => {
                let header = format!(
                    " {} {} {} {}{}",
                    r.flags,
                    r.expiry.as_secs(),
                    r.value.len(),
                    r.cas,
                    if r.noreply { " noreply" } else { "" }
                )
                .into_bytes();
                let size = 4 + r.key.len() + header.len() + CRLF.len() + r.value.len() + CRLF.len();
                dst.put_slice(b"cas ");
                dst.put_slice(&r.key);
                dst.put_slice(&header);
                dst.put_slice(CRLF);
                dst.put_slice(&r.value);
                dst.put_slice(CRLF);
                size
            }
            Request::Delete(r) => {
                let suffix: &[u8] = if r.noreply {
                    b" noreply\r\n"
                } else {
                    b"\r\n"
                };
                dst.put_slice(b"delete ");
                dst.put_slice(&r.key);
                dst.put_slice(suffix);
                7 + r.key.len() + suffix.len()
            }
            Request::Incr(r) | Request::Decr(r) => {
                let verb: &[u8] = if matches!(self, Request::Incr(_)) {
                    b"incr "
                } else {
                    b"decr "
                };
                let tail = format!(
                    " {}{}",
                    r.delta,
                    if r.noreply { " noreply" } else { "" }
                )
                .into_bytes();
                dst.put_slice(verb);
                dst.put_slice(&r.key);
                dst.put_slice(&tail);
                dst.put_slice(CRLF);
                verb.len() + r.key.len() + tail.len() + CRLF.len()
            }
            Request::FlushAll(r) => {
                let line = match (r.delay, r.noreply) {
                    (0, false) => "flush_all\r\n".to_string(),
                    (0, true) => "flush_all noreply\r\n".to_string(),
                    (d, false) => format!("flush_all {}\r\n", d),
                    (d, true) => format!("flush_all {} noreply\r\n", d),
                };
                dst.put_slice(line.as_bytes());
                line.len()
            }
            Request::Version => {
                dst.put_slice(b"version\r\n");
                9
            }
            Request::Stats => {
                dst.put_slice(b"stats\r\n");
                7
            }
            Request::Quit => {
                dst.put_slice(b"quit\r\n");
                6
            }
        }
    }
}
