// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ethernet and ARP frames, as carried in PACKET_IN / PACKET_OUT.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};
use std::net::Ipv4Addr;
use thiserror::Error;
use trellis_openflow::MacAddr;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const ETHERTYPE_LLDP: u16 = 0x88cc;

/// Ethernet header length without VLAN tag.
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Packet parsing error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("frame truncated")]
    Truncated,

    #[error("invalid {0}")]
    Invalid(&'static str),
}

impl From<std::io::Error> for PacketError {
    fn from(_: std::io::Error) -> Self {
        Self::Truncated
    }
}

/// Parsed Ethernet II header with a view of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame<'a> {
    pub dst: MacAddr,
    pub src: MacAddr,
    /// 802.1Q VLAN id, if the frame was tagged.
    pub vlan: Option<u16>,
    /// Inner ethertype (after any VLAN tag).
    pub ethertype: u16,
    pub payload: &'a [u8],
}

impl<'a> EthernetFrame<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        let mut cursor = Cursor::new(data);
        let dst = read_mac(&mut cursor)?;
        let src = read_mac(&mut cursor)?;
        let mut ethertype = cursor.read_u16::<BigEndian>()?;
        let mut vlan = None;
        if ethertype == ETHERTYPE_VLAN {
            let tci = cursor.read_u16::<BigEndian>()?;
            vlan = Some(tci & 0x0fff);
            ethertype = cursor.read_u16::<BigEndian>()?;
        }
        let offset = cursor.position() as usize;
        Ok(Self {
            dst,
            src,
            vlan,
            ethertype,
            payload: &data[offset..],
        })
    }

    pub fn is_lldp(&self) -> bool {
        self.ethertype == ETHERTYPE_LLDP
    }

    pub fn is_arp(&self) -> bool {
        self.ethertype == ETHERTYPE_ARP
    }
}

/// Serialize an untagged Ethernet II frame.
pub fn build_ethernet(dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ETHERNET_HEADER_LEN + payload.len());
    out.extend_from_slice(&dst.0);
    out.extend_from_slice(&src.0);
    out.extend_from_slice(&ethertype.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub(crate) fn read_mac(cursor: &mut Cursor<&[u8]>) -> Result<MacAddr, PacketError> {
    let mut octets = [0u8; 6];
    cursor.read_exact(&mut octets)?;
    Ok(MacAddr(octets))
}

/// ARP opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOperation {
    Request = 1,
    Reply = 2,
}

/// IPv4-over-Ethernet ARP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: ArpOperation,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub const LEN: usize = 28;

    const HTYPE_ETHERNET: u16 = 1;

    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        let mut cursor = Cursor::new(data);
        let htype = cursor.read_u16::<BigEndian>()?;
        let ptype = cursor.read_u16::<BigEndian>()?;
        let hlen = cursor.read_u8()?;
        let plen = cursor.read_u8()?;
        if htype != Self::HTYPE_ETHERNET || ptype != ETHERTYPE_IPV4 || hlen != 6 || plen != 4 {
            return Err(PacketError::Invalid("ARP address types"));
        }
        let operation = match cursor.read_u16::<BigEndian>()? {
            1 => ArpOperation::Request,
            2 => ArpOperation::Reply,
            _ => return Err(PacketError::Invalid("ARP operation")),
        };
        let sender_mac = read_mac(&mut cursor)?;
        let sender_ip = Ipv4Addr::from(cursor.read_u32::<BigEndian>()?);
        let target_mac = read_mac(&mut cursor)?;
        let target_ip = Ipv4Addr::from(cursor.read_u32::<BigEndian>()?);
        Ok(Self {
            operation,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        // Writes into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) -> std::io::Result<()> {
        out.write_u16::<BigEndian>(Self::HTYPE_ETHERNET)?;
        out.write_u16::<BigEndian>(ETHERTYPE_IPV4)?;
        out.write_u8(6)?;
        out.write_u8(4)?;
        out.write_u16::<BigEndian>(self.operation as u16)?;
        out.extend_from_slice(&self.sender_mac.0);
        out.write_u32::<BigEndian>(self.sender_ip.into())?;
        out.extend_from_slice(&self.target_mac.0);
        out.write_u32::<BigEndian>(self.target_ip.into())?;
        Ok(())
    }
}

/// Broadcast frame announcing that `ip` lives at `mac`.
pub fn gratuitous_arp(ip: Ipv4Addr, mac: MacAddr) -> Vec<u8> {
    let arp = ArpPacket {
        operation: ArpOperation::Request,
        sender_mac: mac,
        sender_ip: ip,
        target_mac: MacAddr::ZERO,
        target_ip: ip,
    };
    build_ethernet(MacAddr::BROADCAST, mac, ETHERTYPE_ARP, &arp.encode())
}
