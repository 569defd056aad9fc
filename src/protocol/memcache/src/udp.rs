// Copyright 2025 The Sphinxd Authors.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The 8-byte frame header prefixed to every datagram when the protocol
//! is carried over UDP. Responses larger than one datagram are split into
//! fragments sharing a request id, with ascending sequence numbers.

use protocol_common::BufMut;

pub const UDP_HEADER_SIZE: usize = 8;
pub const UDP_MAX_DATAGRAM: usize = 1400;
pub const UDP_MAX_PAYLOAD: usize = UDP_MAX_DATAGRAM - UDP_HEADER_SIZE;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub request_id: u16,
    pub sequence: u16,
    pub total: u16,
    pub reserved: u16,
}

impl FrameHeader {
    /// Splits a datagram into its header and payload. `None` if the
    /// datagram is shorter than a header.
    pub fn parse(datagram: &[u8]) -> Option<(FrameHeader, &[u8])> {
        if datagram.len() < UDP_HEADER_SIZE {
            return None;
        }
        let header = FrameHeader {
            request_id: u16::from_be_bytes([datagram[0], datagram[1]]),
            sequence: u16::from_be_bytes([datagram[2], datagram[3]]),
            total: u16::from_be_bytes([datagram[4], datagram[5]]),
            reserved: u16::from_be_bytes([datagram[6], datagram[7]]),
        };
        Some((header, &datagram[UDP_HEADER_SIZE..]))
    }

    pub fn compose(&self, dst: &mut dyn BufMut) -> usize {
        dst.put_slice(&self.request_id.to_be_bytes());
        dst.put_slice(&self.sequence.to_be_bytes());
        dst.put_slice(&self.total.to_be_bytes());
        dst.put_slice(&self.reserved.to_be_bytes());
        UDP_HEADER_SIZE
    }

    /// Number of datagrams needed to carry a response body. An empty body
    /// still occupies one datagram.
    pub fn fragments(body_len: usize) -> usize {
        if body_len == 0 {
            1
        } else {
            (body_len + UDP_MAX_PAYLOAD - 1) / UDP_MAX_PAYLOAD
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let header = FrameHeader {
            request_id: 0x0102,
            sequence: 3,
            total: 4,
            reserved: 0,
        };
        let mut buf = Vec::new();
        assert_eq!(header.compose(&mut buf), UDP_HEADER_SIZE);
        assert_eq!(buf, [0x01, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00, 0x00]);

        buf.extend_from_slice(b"get x\r\n");
        let (parsed, payload) = FrameHeader::parse(&buf).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(payload, b"get x\r\n");
    }

    #[test]
    fn short_datagram_is_rejected() {
        assert!(FrameHeader::parse(&[0u8; 7]).is_none());
        assert!(FrameHeader::parse(&[]).is_none());
    }

    #[test]
    fn fragment_counts() {
        assert_eq!(FrameHeader::fragments(0), 1);
        assert_eq!(FrameHeader::fragments(1), 1);
        assert_eq!(FrameHeader::fragments(UDP_MAX_PAYLOAD), 1);
        assert_eq!(FrameHeader::fragments(UDP_MAX_PAYLOAD + 1), 2);
        assert_eq!(FrameHeader::fragments(3 * UDP_MAX_PAYLOAD), 3);
    }
}
