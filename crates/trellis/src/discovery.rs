// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link discovery probes.
//!
//! A probe is an LLDP frame sent out of one switch port. When a neighbour
//! switch hands it back in a PACKET_IN, the tagged TLV names the port it
//! left from, which together with the ingress port gives one link.
//!
//! ```text
//! dst 01:80:c2:00:00:0e | src <port hw addr> | 0x88cc
//! Chassis ID  (subtype 7)  "dpid:<16 hex digits>"
//! Port ID     (subtype 7)  "<port number>"
//! TTL                      120
//! Org specific             OUI 02:74:72, subtype 1, dpid u64, port u32
//! End
//! ```

use crate::packet::{build_ethernet, EthernetFrame, PacketError, ETHERTYPE_LLDP};
use crate::topology::Point;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;
use trellis_openflow::MacAddr;

/// Nearest-bridge LLDP multicast address.
pub const LLDP_MULTICAST: MacAddr = MacAddr([0x01, 0x80, 0xc2, 0x00, 0x00, 0x0e]);

/// Organizationally unique identifier marking our probes.
pub const PROBE_OUI: [u8; 3] = [0x02, 0x74, 0x72];
pub const PROBE_SUBTYPE: u8 = 1;
pub const PROBE_TTL_SECS: u16 = 120;

const TLV_END: u8 = 0;
const TLV_CHASSIS_ID: u8 = 1;
const TLV_PORT_ID: u8 = 2;
const TLV_TTL: u8 = 3;
const TLV_ORG_SPECIFIC: u8 = 127;

/// Locally assigned chassis/port id subtype.
const SUBTYPE_LOCAL: u8 = 7;

/// Origin of a discovery probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub dpid: u64,
    pub port: u32,
}

impl Probe {
    pub fn new(dpid: u64, port: u32) -> Self {
        Self { dpid, port }
    }

    pub fn point(&self) -> Point {
        Point::new(self.dpid, self.port)
    }

    /// Complete Ethernet frame, sourced from `src`.
    pub fn encode(&self, src: MacAddr) -> Vec<u8> {
        let mut lldp = Vec::with_capacity(64);

        let chassis = format!("dpid:{:016x}", self.dpid);
        push_tlv(&mut lldp, TLV_CHASSIS_ID, &[&[SUBTYPE_LOCAL], chassis.as_bytes()]);

        let port = self.port.to_string();
        push_tlv(&mut lldp, TLV_PORT_ID, &[&[SUBTYPE_LOCAL], port.as_bytes()]);

        push_tlv(&mut lldp, TLV_TTL, &[&PROBE_TTL_SECS.to_be_bytes()]);

        push_tlv(
            &mut lldp,
            TLV_ORG_SPECIFIC,
            &[
                &PROBE_OUI,
                &[PROBE_SUBTYPE],
                &self.dpid.to_be_bytes(),
                &self.port.to_be_bytes(),
            ],
        );

        push_tlv(&mut lldp, TLV_END, &[]);

        build_ethernet(LLDP_MULTICAST, src, ETHERTYPE_LLDP, &lldp)
    }

    /// Extract the probe from an Ethernet frame.
    ///
    /// `Ok(None)` means the frame is not one of our probes (not LLDP, or an
    /// LLDP frame without our tag).
    pub fn decode(frame: &[u8]) -> Result<Option<Probe>, PacketError> {
        let eth = EthernetFrame::parse(frame)?;
        if !eth.is_lldp() {
            return Ok(None);
        }
        Self::decode_lldp(eth.payload)
    }

    /// Walk the TLVs of an LLDP payload looking for the probe tag.
    pub fn decode_lldp(payload: &[u8]) -> Result<Option<Probe>, PacketError> {
        let mut cursor = Cursor::new(payload);
        loop {
            let header = match cursor.read_u16::<BigEndian>() {
                Ok(header) => header,
                // tolerate a missing End TLV
                Err(_) => return Ok(None),
            };
            let kind = (header >> 9) as u8;
            let len = usize::from(header & 0x01ff);
            let start = cursor.position() as usize;
            let value = payload
                .get(start..start + len)
                .ok_or(PacketError::Truncated)?;
            cursor.set_position((start + len) as u64);

            match kind {
                TLV_END => return Ok(None),
                TLV_ORG_SPECIFIC if value.len() >= 4 && value[..3] == PROBE_OUI => {
                    if value[3] != PROBE_SUBTYPE {
                        continue;
                    }
                    let mut body = Cursor::new(&value[4..]);
                    let dpid = body.read_u64::<BigEndian>()?;
                    let port = body.read_u32::<BigEndian>()?;
                    return Ok(Some(Probe { dpid, port }));
                }
                _ => {}
            }
        }
    }
}

fn push_tlv(out: &mut Vec<u8>, kind: u8, parts: &[&[u8]]) {
    let len: usize = parts.iter().map(|p| p.len()).sum();
    let header = (u16::from(kind) << 9) | (len as u16 & 0x01ff);
    out.extend_from_slice(&header.to_be_bytes());
    for part in parts {
        out.extend_from_slice(part);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ETHERNET_HEADER_LEN;

    const SRC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x01, 0x03]);

    #[test]
    fn test_probe_layout() {
        let frame = Probe::new(0x1122_3344_5566_7788, 3).encode(SRC);
        let eth = EthernetFrame::parse(&frame).unwrap();
        assert_eq!(eth.dst, LLDP_MULTICAST);
        assert_eq!(eth.src, SRC);
        assert!(eth.is_lldp());

        let lldp = &frame[ETHERNET_HEADER_LEN..];
        // chassis id: type 1, len 1 + 21
        assert_eq!(&lldp[..3], &[0x02, 22, SUBTYPE_LOCAL]);
        assert_eq!(&lldp[3..24], b"dpid:1122334455667788");
        // port id: type 2, len 2
        assert_eq!(&lldp[24..28], &[0x04, 2, SUBTYPE_LOCAL, b'3']);
        // ttl
        assert_eq!(&lldp[28..32], &[0x06, 2, 0, 120]);
        // org specific: type 127, len 16
        assert_eq!(&lldp[32..38], &[0xfe, 16, 0x02, 0x74, 0x72, 1]);
        // end
        assert_eq!(&lldp[lldp.len() - 2..], &[0, 0]);
    }

    #[test]
    fn test_decode_probe() {
        let frame = Probe::new(42, 7).encode(SRC);
        assert_eq!(Probe::decode(&frame).unwrap(), Some(Probe::new(42, 7)));
    }

    #[test]
    fn test_foreign_lldp_is_ignored() {
        let mut lldp = Vec::new();
        push_tlv(&mut lldp, TLV_CHASSIS_ID, &[&[4], &SRC.0]);
        push_tlv(&mut lldp, TLV_PORT_ID, &[&[5], b"ge-0/0/1"]);
        push_tlv(&mut lldp, TLV_TTL, &[&[0, 120]]);
        push_tlv(&mut lldp, TLV_ORG_SPECIFIC, &[&[0x00, 0x80, 0xc2], &[1, 0, 10]]);
        push_tlv(&mut lldp, TLV_END, &[]);
        let frame = build_ethernet(LLDP_MULTICAST, SRC, ETHERTYPE_LLDP, &lldp);
        assert_eq!(Probe::decode(&frame).unwrap(), None);
    }

    #[test]
    fn test_non_lldp_is_ignored() {
        let frame = build_ethernet(MacAddr::BROADCAST, SRC, 0x0800, &[0; 20]);
        assert_eq!(Probe::decode(&frame).unwrap(), None);
    }

    #[test]
    fn test_truncated_tlv() {
        let frame = Probe::new(42, 7).encode(SRC);
        // cut inside the org-specific value
        let cut = ETHERNET_HEADER_LEN + 40;
        assert_eq!(Probe::decode(&frame[..cut]), Err(PacketError::Truncated));
    }
}
