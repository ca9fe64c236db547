// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Switch-level types shared by both protocol versions.

use crate::error::CodecError;
use std::fmt;
use std::str::FromStr;

/// Reserved port numbers in the 32-bit (1.3) numbering.
///
/// The 1.0 codec maps its 16-bit reserved range onto these values.
pub mod port {
    /// Highest number a physical port may use.
    pub const MAX: u32 = 0xffff_ff00;
    pub const IN_PORT: u32 = 0xffff_fff8;
    pub const TABLE: u32 = 0xffff_fff9;
    pub const NORMAL: u32 = 0xffff_fffa;
    pub const FLOOD: u32 = 0xffff_fffb;
    pub const ALL: u32 = 0xffff_fffc;
    pub const CONTROLLER: u32 = 0xffff_fffd;
    pub const LOCAL: u32 = 0xffff_fffe;
    /// Wildcard port (`OFPP_ANY`, `OFPP_NONE` in 1.0).
    pub const ANY: u32 = 0xffff_ffff;
}

/// 48-bit Ethernet hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const ZERO: MacAddr = MacAddr([0; 6]);
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Group bit set (includes broadcast).
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_unicast(&self) -> bool {
        !self.is_multicast() && *self != Self::ZERO
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for MacAddr {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| CodecError::Invalid(format!("MAC address {s:?}")))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| CodecError::Invalid(format!("MAC address {s:?}")))?;
        }
        if parts.next().is_some() {
            return Err(CodecError::Invalid(format!("MAC address {s:?}")));
        }
        Ok(Self(octets))
    }
}

/// Port description (`ofp_phy_port` / `ofp_port`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortDesc {
    pub number: u32,
    pub hw_addr: MacAddr,
    pub name: String,
    /// `OFPPC_*` administrative configuration bits.
    pub config: u32,
    /// `OFPPS_*` state bits.
    pub state: u32,
    /// `OFPPF_*` bits describing the current link mode.
    pub current: u32,
    /// Current bit rate in kbps. Derived from `current` on 1.0.
    pub curr_speed_kbps: u32,
    pub max_speed_kbps: u32,
}

impl PortDesc {
    /// `OFPPC_PORT_DOWN`
    pub const CONFIG_PORT_DOWN: u32 = 1 << 0;
    /// `OFPPS_LINK_DOWN`
    pub const STATE_LINK_DOWN: u32 = 1 << 0;

    /// Administratively enabled with carrier.
    pub fn is_up(&self) -> bool {
        self.config & Self::CONFIG_PORT_DOWN == 0 && self.state & Self::STATE_LINK_DOWN == 0
    }

    /// A numbered switch port rather than a reserved one.
    pub fn is_physical(&self) -> bool {
        self.number > 0 && self.number <= port::MAX
    }

    pub fn speed_mbps(&self) -> u64 {
        u64::from(self.curr_speed_kbps) / 1000
    }
}

/// FEATURES_REPLY body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Features {
    pub dpid: u64,
    pub n_buffers: u32,
    pub n_tables: u8,
    /// Auxiliary connection id (always 0 on 1.0).
    pub auxiliary_id: u8,
    pub capabilities: u32,
    /// Ports carried inline (1.0 only).
    pub ports: Vec<PortDesc>,
}

/// Switch description (`OFPST_DESC` / `OFPMP_DESC`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Description {
    pub manufacturer: String,
    pub hardware: String,
    pub software: String,
    pub serial: String,
    pub datapath: String,
}

/// SET_CONFIG / GET_CONFIG_REPLY body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchConfig {
    pub flags: u16,
    /// Bytes of each table-miss packet sent to the controller.
    pub miss_send_len: u16,
}

impl SwitchConfig {
    /// `OFPCML_NO_BUFFER`: send the whole packet, never buffer.
    pub const NO_BUFFER: u16 = 0xffff;
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            flags: 0,
            miss_send_len: Self::NO_BUFFER,
        }
    }
}

/// OFPT_ERROR body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub kind: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

/// Why a PORT_STATUS was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortReason {
    Add,
    Delete,
    Modify,
}

impl PortReason {
    pub(crate) fn from_wire(v: u8) -> Result<Self, CodecError> {
        match v {
            0 => Ok(Self::Add),
            1 => Ok(Self::Delete),
            2 => Ok(Self::Modify),
            other => Err(CodecError::Invalid(format!("port status reason {other}"))),
        }
    }

    pub(crate) fn to_wire(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Delete => 1,
            Self::Modify => 2,
        }
    }
}

/// PORT_STATUS body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub port: PortDesc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_and_display() {
        let mac: MacAddr = "00:1b:21:3a:4f:0c".parse().unwrap();
        assert_eq!(mac.0, [0x00, 0x1b, 0x21, 0x3a, 0x4f, 0x0c]);
        assert_eq!(mac.to_string(), "00:1b:21:3a:4f:0c");
        assert!(mac.is_unicast());

        assert!("00:1b:21".parse::<MacAddr>().is_err());
        assert!("00:1b:21:3a:4f:0c:99".parse::<MacAddr>().is_err());
        assert!("zz:1b:21:3a:4f:0c".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_classes() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(MacAddr::BROADCAST.is_multicast());
        assert!(MacAddr([0x01, 0x80, 0xc2, 0, 0, 0x0e]).is_multicast());
        assert!(!MacAddr::ZERO.is_unicast());
    }

    #[test]
    fn test_port_up_requires_config_and_state() {
        let mut port = PortDesc {
            number: 3,
            ..Default::default()
        };
        assert!(port.is_up());

        port.state = PortDesc::STATE_LINK_DOWN;
        assert!(!port.is_up());

        port.state = 0;
        port.config = PortDesc::CONFIG_PORT_DOWN;
        assert!(!port.is_up());
    }

    #[test]
    fn test_reserved_ports_are_not_physical() {
        let local = PortDesc {
            number: port::LOCAL,
            ..Default::default()
        };
        assert!(!local.is_physical());
    }
}
