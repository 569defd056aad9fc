// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use protocol_common::{BufMut, Compose, CRLF};

/// A single key/value pair in a `get`/`gets` response.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Value {
    key: Box<[u8]>,
    flags: u32,
    cas: Option<u64>,
    data: Box<[u8]>,
}

impl Value {
    pub fn new(key: &[u8], flags: u32, cas: Option<u64>, data: &[u8]) -> Self {
        Self {
            key: key.into(),
            flags,
            cas,
            data: data.into(),
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn cas(&self) -> Option<u64> {
        self.cas
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Compose for Value {
    fn compose(&self, dst: &mut dyn BufMut) -> usize {
        let header = if let Some(cas) = self.cas {
            format!(" {} {} {}\r\n", self.flags, self.data.len(), cas).into_bytes()
        } else {
            format!(" {} {}\r\n", self.flags, self.data.len()).into_bytes()
        };

        let prefix = b"VALUE ";
        let size = prefix.len() + self.key.len() + header.len() + self.data.len() + CRLF.len();

        dst.put_slice(prefix);
        dst.put_slice(&self.key);
        dst.put_slice(&header);
        dst.put_slice(&self.data);
        dst.put_slice(CRLF);

        size
    }
}

/// The ordered collection of values answering a `get`/`gets`. Missing keys
/// simply do not appear.
#[derive(Debug, PartialEq, Eq)]
pub struct Values {
    values: Vec<Value>,
}

impl Values {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl Compose for Values {
    fn compose(&self, dst: &mut dyn BufMut) -> usize {
        let suffix = b"END\r\n";
        let mut size = suffix.len();
        for value in &self.values {
            size += value.compose(dst);
        }
        dst.put_slice(suffix);
        size
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Response {
    Error,
    ClientError(String),
    ServerError(String),
    Stored { noreply: bool },
    NotStored { noreply: bool },
    Exists { noreply: bool },
    NotFound { noreply: bool },
    Deleted { noreply: bool },
    Values(Values),
    Numeric { value: u64, noreply: bool },
    Ok { noreply: bool },
    Version(String),
    Stats(Vec<(&'static str, u64)>),
    Hangup,
}

impl Response {
    pub fn error() -> Self {
        Self::Error
    }

    pub fn client_error<T: ToString>(msg: T) -> Self {
        Self::ClientError(msg.to_string())
    }

    pub fn server_error<T: ToString>(msg: T) -> Self {
        Self::ServerError(msg.to_string())
    }

    pub fn stored(noreply: bool) -> Self {
        Self::Stored { noreply }
    }

    pub fn not_stored(noreply: bool) -> Self {
        Self::NotStored { noreply }
    }

    pub fn exists(noreply: bool) -> Self {
        Self::Exists { noreply }
    }

    pub fn not_found(noreply: bool) -> Self {
        Self::NotFound { noreply }
    }

    pub fn deleted(noreply: bool) -> Self {
        Self::Deleted { noreply }
    }

    pub fn values(values: Vec<Value>) -> Self {
        Self::Values(Values::new(values))
    }

    pub fn numeric(value: u64, noreply: bool) -> Self {
        Self::Numeric { value, noreply }
    }

    pub fn ok(noreply: bool) -> Self {
        Self::Ok { noreply }
    }

    pub fn version<T: ToString>(version: T) -> Self {
        Self::Version(version.to_string())
    }

    pub fn stats(entries: Vec<(&'static str, u64)>) -> Self {
        Self::Stats(entries)
    }

    pub fn hangup() -> Self {
        Self::Hangup
    }
}

fn compose_fixed(line: &[u8], noreply: bool, dst: &mut dyn BufMut) -> usize {
    if noreply {
        0
    } else {
        dst.put_slice(line);
        line.len()
    }
}

impl Compose for Response {
    fn compose(&self, dst: &mut dyn BufMut) -> usize {
        match self {
            Self::Error => {
                dst.put_slice(b"ERROR\r\n");
                7
            }
            Self::ClientError(msg) => {
                let line = format!("CLIENT_ERROR {}\r\n", msg).into_bytes();
                dst.put_slice(&line);
                line.len()
            }
            Self::ServerError(msg) => {
                let line = format!("SERVER_ERROR {}\r\n", msg).into_bytes();
                dst.put_slice(&line);
                line.len()
            }
            Self::Stored { noreply } => compose_fixed(b"STORED\r\n", *noreply, dst),
            Self::NotStored { noreply } => compose_fixed(b"NOT_STORED\r\n", *noreply, dst),
            Self::Exists { noreply } => compose_fixed(b"EXISTS\r\n", *noreply, dst),
            Self::NotFound { noreply } => compose_fixed(b"NOT_FOUND\r\n", *noreply, dst),
            Self::Deleted { noreply } => compose_fixed(b"DELETED\r\n", *noreply, dst),
            Self::Values(values) => values.compose(dst),
            Self::Numeric { value, noreply } => {
                if *noreply {
                    0
                } else {
                    let line = format!("{}\r\n", value).into_bytes();
                    dst.put_slice(&line);
                    line.len()
                }
            }
            Self::Ok { noreply } => compose_fixed(b"OK\r\n", *noreply, dst),
            Self::Version(version) => {
                let line = format!("VERSION {}\r\n", version).into_bytes();
                dst.put_slice(&line);
                line.len()
            }
            Self::Stats(entries) => {
                let mut size = 0;
                for (name, value) in entries {
                    let line = format!("STAT {} {}\r\n", name, value).into_bytes();
                    dst.put_slice(&line);
                    size += line.len();
                }
                dst.put_slice(b"END\r\n");
                size + 5
            }
            Self::Hangup => 0,
        }
    }

    fn should_hangup(&self) -> bool {
        matches!(self, Self::Hangup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composed(response: &Response) -> Vec<u8> {
        let mut buf = Vec::new();
        let size = response.compose(&mut buf);
        assert_eq!(size, buf.len());
        buf
    }

    #[test]
    fn fixed_responses() {
        assert_eq!(composed(&Response::stored(false)), b"STORED\r\n");
        assert_eq!(composed(&Response::not_stored(false)), b"NOT_STORED\r\n");
        assert_eq!(composed(&Response::exists(false)), b"EXISTS\r\n");
        assert_eq!(composed(&Response::not_found(false)), b"NOT_FOUND\r\n");
        assert_eq!(composed(&Response::deleted(false)), b"DELETED\r\n");
        assert_eq!(composed(&Response::ok(false)), b"OK\r\n");
        assert_eq!(composed(&Response::error()), b"ERROR\r\n");
        assert_eq!(
            composed(&Response::server_error("busy")),
            b"SERVER_ERROR busy\r\n"
        );
        assert_eq!(
            composed(&Response::client_error("bad data chunk")),
            b"CLIENT_ERROR bad data chunk\r\n"
        );
    }

    #[test]
    fn noreply_suppresses_output() {
        assert_eq!(composed(&Response::stored(true)), b"");
        assert_eq!(composed(&Response::deleted(true)), b"");
        assert_eq!(composed(&Response::numeric(1, true)), b"");
    }

    #[test]
    fn values_response() {
        assert_eq!(composed(&Response::values(vec![])), b"END\r\n");
        assert_eq!(
            composed(&Response::values(vec![Value::new(b"foo", 0, None, b"hello")])),
            b"VALUE foo 0 5\r\nhello\r\nEND\r\n"
        );
        assert_eq!(
            composed(&Response::values(vec![
                Value::new(b"a", 1, Some(42), b"x"),
                Value::new(b"b", 0, Some(43), b""),
            ])),
            b"VALUE a 1 1 42\r\nx\r\nVALUE b 0 0 43\r\n\r\nEND\r\n"
        );
    }

    #[test]
    fn numeric_and_version() {
        assert_eq!(composed(&Response::numeric(7, false)), b"7\r\n");
        assert_eq!(
            composed(&Response::version("0.1.0")),
            b"VERSION 0.1.0\r\n"
        );
    }

    #[test]
    fn stats_response() {
        assert_eq!(
            composed(&Response::stats(vec![("cmd_get", 1), ("cmd_set", 2)])),
            b"STAT cmd_get 1\r\nSTAT cmd_set 2\r\nEND\r\n"
        );
        assert_eq!(composed(&Response::stats(vec![])), b"END\r\n");
    }

    #[test]
    fn hangup() {
        let response = Response::hangup();
        assert!(response.should_hangup());
        assert_eq!(composed(&response), b"");
        assert!(!Response::error().should_hangup());
    }
}
