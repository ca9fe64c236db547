// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Codec errors.

use thiserror::Error;

/// Errors raised while encoding or decoding OpenFlow messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("message truncated")]
    Truncated,

    #[error("length mismatch: header declares {declared} bytes, buffer holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unsupported protocol version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("version mismatch: expected {expected:#04x}, got {actual:#04x}")]
    VersionMismatch { expected: u8, actual: u8 },

    #[error("{what} cannot be expressed in OpenFlow {version}")]
    Unsupported {
        what: &'static str,
        version: &'static str,
    },

    #[error("invalid {0}")]
    Invalid(String),

    #[error("message too large: {0} bytes")]
    TooLarge(usize),
}

// Cursor reads over a slice only fail when the slice runs out.
impl From<std::io::Error> for CodecError {
    fn from(_: std::io::Error) -> Self {
        Self::Truncated
    }
}
