// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Common OpenFlow header.

use crate::error::CodecError;
use byteorder::{BigEndian, ByteOrder};

/// Size of the common header in bytes.
pub const HEADER_LEN: usize = 8;

/// `OFPT_HELLO`, identical in every protocol version.
pub const MSG_HELLO: u8 = 0;

/// `OFPT_ECHO_REPLY`, identical in every protocol version.
pub const MSG_ECHO_REPLY: u8 = 3;

/// Common header prefixed to every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Wire protocol version.
    pub version: u8,
    /// Message type code (version specific).
    pub msg_type: u8,
    /// Total message length including this header.
    pub length: u16,
    /// Transaction id.
    pub xid: u32,
}

impl Header {
    /// Parse the header at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Truncated);
        }
        let header = Self {
            version: buf[0],
            msg_type: buf[1],
            length: BigEndian::read_u16(&buf[2..4]),
            xid: BigEndian::read_u32(&buf[4..8]),
        };
        if (header.length as usize) < HEADER_LEN {
            return Err(CodecError::Invalid(format!(
                "header length {}",
                header.length
            )));
        }
        Ok(header)
    }

    /// Serialize into the first [`HEADER_LEN`] bytes of `out`.
    pub fn write(&self, out: &mut [u8]) {
        out[0] = self.version;
        out[1] = self.msg_type;
        BigEndian::write_u16(&mut out[2..4], self.length);
        BigEndian::write_u32(&mut out[4..8], self.xid);
    }

    /// True for a HELLO of any version.
    pub fn is_hello(&self) -> bool {
        self.msg_type == MSG_HELLO
    }

    pub fn is_echo_reply(&self) -> bool {
        self.msg_type == MSG_ECHO_REPLY
    }
}

/// Peek the declared frame length once a full header is buffered.
///
/// Returns `None` while fewer than [`HEADER_LEN`] bytes are available.
pub fn frame_length(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    Some(BigEndian::read_u16(&buf[2..4]) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        let buf = [0x04, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x2a];
        let header = Header::parse(&buf).unwrap();
        assert_eq!(header.version, 0x04);
        assert!(header.is_hello());
        assert_eq!(header.length, 8);
        assert_eq!(header.xid, 42);
    }

    #[test]
    fn test_parse_short_buffer() {
        assert_eq!(Header::parse(&[0x04, 0x00, 0x00]), Err(CodecError::Truncated));
    }

    #[test]
    fn test_parse_rejects_undersized_length() {
        let buf = [0x01, 0x00, 0x00, 0x04, 0, 0, 0, 0];
        assert!(matches!(Header::parse(&buf), Err(CodecError::Invalid(_))));
    }

    #[test]
    fn test_frame_length_peek() {
        assert_eq!(frame_length(&[0x04, 0x0a, 0x00]), None);
        assert_eq!(frame_length(&[0x04, 0x0a, 0x01, 0x00, 0, 0, 0, 1, 0xff]), Some(256));
    }
}
