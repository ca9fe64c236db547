// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared framing helpers for the version codecs.

use crate::error::CodecError;
use crate::header::{Header, HEADER_LEN};
use crate::message::Version;
use crate::types::MacAddr;
use std::io::{self, Cursor, Read, Write};

pub(crate) type Reader<'a> = Cursor<&'a [u8]>;

/// Validate `frame` against `version` and return its header and body reader.
pub(crate) fn open(version: Version, frame: &[u8]) -> Result<(Header, Reader<'_>), CodecError> {
    let header = Header::parse(frame)?;
    if header.version != version.wire() {
        return Err(CodecError::VersionMismatch {
            expected: version.wire(),
            actual: header.version,
        });
    }
    let declared = header.length as usize;
    if frame.len() < declared {
        return Err(CodecError::Truncated);
    }
    if frame.len() > declared {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }
    Ok((header, Cursor::new(&frame[HEADER_LEN..declared])))
}

/// Outgoing frame; the header is patched in by [`FrameBuf::finish`].
pub(crate) struct FrameBuf {
    header: Header,
    buf: Vec<u8>,
}

impl FrameBuf {
    pub(crate) fn new(version: Version, msg_type: u8, xid: u32) -> Self {
        Self {
            header: Header {
                version: version.wire(),
                msg_type,
                length: 0,
                xid,
            },
            buf: vec![0; HEADER_LEN],
        }
    }

    pub(crate) fn finish(mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.buf.len();
        self.header.length = u16::try_from(len).map_err(|_| CodecError::TooLarge(len))?;
        self.header.write(&mut self.buf[..HEADER_LEN]);
        Ok(self.buf)
    }
}

impl Write for FrameBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(crate) fn read_array<const N: usize>(r: &mut Reader<'_>) -> Result<[u8; N], CodecError> {
    let mut out = [0u8; N];
    r.read_exact(&mut out)?;
    Ok(out)
}

pub(crate) fn read_mac(r: &mut Reader<'_>) -> Result<MacAddr, CodecError> {
    Ok(MacAddr(read_array::<6>(r)?))
}

/// Fixed-width, NUL-padded string field.
pub(crate) fn read_str(r: &mut Reader<'_>, width: usize) -> Result<String, CodecError> {
    let mut raw = vec![0u8; width];
    r.read_exact(&mut raw)?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

/// Write `s` into a `width`-byte field, always leaving a terminating NUL.
pub(crate) fn write_str<W: Write>(w: &mut W, s: &str, width: usize) -> io::Result<()> {
    let mut field = vec![0u8; width];
    let n = s.len().min(width.saturating_sub(1));
    field[..n].copy_from_slice(&s.as_bytes()[..n]);
    w.write_all(&field)
}

pub(crate) fn skip(r: &mut Reader<'_>, n: usize) -> Result<(), CodecError> {
    if remaining(r) < n {
        return Err(CodecError::Truncated);
    }
    r.set_position(r.position() + n as u64);
    Ok(())
}

pub(crate) fn pad<W: Write>(w: &mut W, n: usize) -> io::Result<()> {
    w.write_all(&[0u8; 8][..n])
}

pub(crate) fn remaining(r: &Reader<'_>) -> usize {
    r.get_ref().len().saturating_sub(r.position() as usize)
}

pub(crate) fn rest(r: &mut Reader<'_>) -> Vec<u8> {
    let pos = (r.position() as usize).min(r.get_ref().len());
    let out = r.get_ref()[pos..].to_vec();
    r.set_position(r.get_ref().len() as u64);
    out
}

/// Sub-reader over the next `n` bytes, advancing `r` past them.
pub(crate) fn take<'a>(r: &mut Reader<'a>, n: usize) -> Result<Reader<'a>, CodecError> {
    if remaining(r) < n {
        return Err(CodecError::Truncated);
    }
    let start = r.position() as usize;
    let slice: &'a [u8] = *r.get_ref();
    r.set_position((start + n) as u64);
    Ok(Cursor::new(&slice[start..start + n]))
}

/// Bytes needed to round `len` up to a multiple of 8.
pub(crate) fn pad8(len: usize) -> usize {
    (8 - len % 8) % 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_field_is_nul_terminated() {
        let mut out = Vec::new();
        write_str(&mut out, "abcdef", 4).unwrap();
        assert_eq!(out, b"abc\0");

        let mut r = Cursor::new(&out[..]);
        assert_eq!(read_str(&mut r, 4).unwrap(), "abc");
    }

    #[test]
    fn test_take_checks_bounds() {
        let data = [1u8, 2, 3];
        let mut r = Cursor::new(&data[..]);
        assert!(take(&mut r, 4).is_err());
        let mut sub = take(&mut r, 2).unwrap();
        assert_eq!(rest(&mut sub), vec![1, 2]);
        assert_eq!(remaining(&r), 1);
    }

    #[test]
    fn test_pad8() {
        assert_eq!(pad8(0), 0);
        assert_eq!(pad8(4), 4);
        assert_eq!(pad8(8), 0);
        assert_eq!(pad8(14), 2);
    }
}
