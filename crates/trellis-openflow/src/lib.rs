// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OpenFlow wire protocol for Trellis.
//!
//! A version-independent [`Message`] model plus two wire codecs:
//! [`V10Codec`] (OpenFlow 1.0, wire version `0x01`) and [`V13Codec`]
//! (OpenFlow 1.3, wire version `0x04`).
//!
//! Every message starts with the common 8-byte header:
//!
//! ```text
//! +---------+---------+---------------+-------------------------------+
//! | version |  type   | length (BE16) |          xid (BE32)           |
//! +---------+---------+---------------+-------------------------------+
//! ```
//!
//! Only the message kinds a controller core exchanges are modelled. Anything
//! else decodes to [`Message::Unsupported`] so callers can log and skip it.
//!
//! # Example
//!
//! ```
//! use trellis_openflow::{codec_for, Message, Version};
//!
//! let codec = codec_for(Version::V1_3);
//! let bytes = codec.encode(7, &Message::BarrierRequest).unwrap();
//! assert_eq!(bytes.len(), 8);
//! assert_eq!(codec.decode(&bytes).unwrap(), Message::BarrierRequest);
//! ```

pub mod error;
pub mod flow;
pub mod header;
pub mod message;
pub mod types;

mod v10;
mod v13;
mod wire;

pub use error::CodecError;
pub use flow::{Action, FlowCommand, FlowMod, Instruction, Match, PacketIn, PacketOut};
pub use header::{frame_length, Header, HEADER_LEN, MSG_ECHO_REPLY};
pub use message::{codec_for, Codec, Message, Version};
pub use types::{
    port, Description, ErrorMsg, Features, MacAddr, PortDesc, PortReason, PortStatus,
    SwitchConfig,
};
pub use v10::V10Codec;
pub use v13::V13Codec;
