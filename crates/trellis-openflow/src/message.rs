// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Version-independent message model and the codec interface.

use crate::error::CodecError;
use crate::flow::{FlowMod, PacketIn, PacketOut};
use crate::types::{Description, ErrorMsg, Features, PortDesc, PortStatus, SwitchConfig};
use crate::v10::V10Codec;
use crate::v13::V13Codec;
use std::fmt;

/// Supported protocol generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Version {
    /// OpenFlow 1.0 (wire `0x01`).
    V1_0,
    /// OpenFlow 1.3 (wire `0x04`).
    V1_3,
}

impl Version {
    pub fn from_wire(v: u8) -> Result<Self, CodecError> {
        match v {
            0x01 => Ok(Self::V1_0),
            0x04 => Ok(Self::V1_3),
            other => Err(CodecError::UnsupportedVersion(other)),
        }
    }

    pub fn wire(self) -> u8 {
        match self {
            Self::V1_0 => 0x01,
            Self::V1_3 => 0x04,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_3 => "1.3",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// OpenFlow message, independent of wire version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello,
    Error(ErrorMsg),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    FeaturesRequest,
    FeaturesReply(Features),
    GetConfigRequest,
    GetConfigReply(SwitchConfig),
    SetConfig(SwitchConfig),
    PacketIn(PacketIn),
    PortStatus(PortStatus),
    PacketOut(PacketOut),
    FlowMod(FlowMod),
    BarrierRequest,
    BarrierReply,
    DescriptionRequest,
    DescriptionReply(Description),
    PortDescriptionRequest,
    PortDescriptionReply(Vec<PortDesc>),
    /// A well-framed message this crate does not model.
    Unsupported { msg_type: u8 },
}

impl Message {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::Error(_) => "ERROR",
            Self::EchoRequest(_) => "ECHO_REQUEST",
            Self::EchoReply(_) => "ECHO_REPLY",
            Self::FeaturesRequest => "FEATURES_REQUEST",
            Self::FeaturesReply(_) => "FEATURES_REPLY",
            Self::GetConfigRequest => "GET_CONFIG_REQUEST",
            Self::GetConfigReply(_) => "GET_CONFIG_REPLY",
            Self::SetConfig(_) => "SET_CONFIG",
            Self::PacketIn(_) => "PACKET_IN",
            Self::PortStatus(_) => "PORT_STATUS",
            Self::PacketOut(_) => "PACKET_OUT",
            Self::FlowMod(_) => "FLOW_MOD",
            Self::BarrierRequest => "BARRIER_REQUEST",
            Self::BarrierReply => "BARRIER_REPLY",
            Self::DescriptionRequest => "DESCRIPTION_REQUEST",
            Self::DescriptionReply(_) => "DESCRIPTION_REPLY",
            Self::PortDescriptionRequest => "PORT_DESCRIPTION_REQUEST",
            Self::PortDescriptionReply(_) => "PORT_DESCRIPTION_REPLY",
            Self::Unsupported { .. } => "UNSUPPORTED",
        }
    }
}

/// Encoder/decoder for one protocol version.
pub trait Codec: Send + Sync {
    fn version(&self) -> Version;

    /// Serialize `msg` as a complete frame with transaction id `xid`.
    fn encode(&self, xid: u32, msg: &Message) -> Result<Vec<u8>, CodecError>;

    /// Decode one complete frame, header included.
    fn decode(&self, frame: &[u8]) -> Result<Message, CodecError>;
}

static V10: V10Codec = V10Codec;
static V13: V13Codec = V13Codec;

/// Codec for a negotiated version.
pub fn codec_for(version: Version) -> &'static dyn Codec {
    match version {
        Version::V1_0 => &V10,
        Version::V1_3 => &V13,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_wire() {
        assert_eq!(Version::from_wire(0x01), Ok(Version::V1_0));
        assert_eq!(Version::from_wire(0x04), Ok(Version::V1_3));
        assert_eq!(
            Version::from_wire(0x05),
            Err(CodecError::UnsupportedVersion(0x05))
        );
        assert_eq!(
            Version::from_wire(0x02),
            Err(CodecError::UnsupportedVersion(0x02))
        );
    }

    #[test]
    fn test_codec_for_matches_version() {
        assert_eq!(codec_for(Version::V1_0).version(), Version::V1_0);
        assert_eq!(codec_for(Version::V1_3).version(), Version::V1_3);
    }
}
