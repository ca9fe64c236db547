// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OpenFlow 1.0 wire codec.
//!
//! Notable differences from 1.3:
//! - ports are 16-bit and arrive inline in FEATURES_REPLY
//! - the switch description travels in STATS_REQUEST / STATS_REPLY
//! - the match is the fixed 40-byte `ofp_match` with a wildcard bitmap
//! - there is a single flow table and no instructions, only actions

use crate::error::CodecError;
use crate::flow::{Action, FlowCommand, FlowMod, Instruction, Match, PacketIn, PacketOut, GROUP_ANY};
use crate::message::{Codec, Message, Version};
use crate::types::{
    Description, ErrorMsg, Features, PortDesc, PortReason, PortStatus, SwitchConfig,
};
use crate::wire::{self, FrameBuf, Reader};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

mod msg {
    pub const HELLO: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const ECHO_REQUEST: u8 = 2;
    pub const ECHO_REPLY: u8 = 3;
    pub const FEATURES_REQUEST: u8 = 5;
    pub const FEATURES_REPLY: u8 = 6;
    pub const GET_CONFIG_REQUEST: u8 = 7;
    pub const GET_CONFIG_REPLY: u8 = 8;
    pub const SET_CONFIG: u8 = 9;
    pub const PACKET_IN: u8 = 10;
    pub const PORT_STATUS: u8 = 12;
    pub const PACKET_OUT: u8 = 13;
    pub const FLOW_MOD: u8 = 14;
    pub const STATS_REQUEST: u8 = 16;
    pub const STATS_REPLY: u8 = 17;
    pub const BARRIER_REQUEST: u8 = 18;
    pub const BARRIER_REPLY: u8 = 19;
}

const STATS_DESC: u16 = 0;
const PHY_PORT_LEN: usize = 48;
const DESC_STR_LEN: usize = 256;
const SERIAL_NUM_LEN: usize = 32;
const PORT_NAME_LEN: usize = 16;
const ACTION_OUTPUT: u16 = 0;

const FW_IN_PORT: u32 = 1 << 0;
const FW_DL_SRC: u32 = 1 << 2;
const FW_DL_DST: u32 = 1 << 3;
const FW_DL_TYPE: u32 = 1 << 4;
const FW_ALL: u32 = (1 << 22) - 1;

const VERSION: &str = "1.0";

/// OpenFlow 1.0 codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct V10Codec;

impl Codec for V10Codec {
    fn version(&self) -> Version {
        Version::V1_0
    }

    fn encode(&self, xid: u32, message: &Message) -> Result<Vec<u8>, CodecError> {
        let msg_type = match message {
            Message::Hello => msg::HELLO,
            Message::Error(_) => msg::ERROR,
            Message::EchoRequest(_) => msg::ECHO_REQUEST,
            Message::EchoReply(_) => msg::ECHO_REPLY,
            Message::FeaturesRequest => msg::FEATURES_REQUEST,
            Message::FeaturesReply(_) => msg::FEATURES_REPLY,
            Message::GetConfigRequest => msg::GET_CONFIG_REQUEST,
            Message::GetConfigReply(_) => msg::GET_CONFIG_REPLY,
            Message::SetConfig(_) => msg::SET_CONFIG,
            Message::PacketIn(_) => msg::PACKET_IN,
            Message::PortStatus(_) => msg::PORT_STATUS,
            Message::PacketOut(_) => msg::PACKET_OUT,
            Message::FlowMod(_) => msg::FLOW_MOD,
            Message::DescriptionRequest => msg::STATS_REQUEST,
            Message::DescriptionReply(_) => msg::STATS_REPLY,
            Message::BarrierRequest => msg::BARRIER_REQUEST,
            Message::BarrierReply => msg::BARRIER_REPLY,
            Message::PortDescriptionRequest | Message::PortDescriptionReply(_) => {
                return Err(CodecError::Unsupported {
                    what: "port description",
                    version: VERSION,
                })
            }
            Message::Unsupported { msg_type } => *msg_type,
        };

        let mut w = FrameBuf::new(Version::V1_0, msg_type, xid);
        match message {
            Message::Hello
            | Message::FeaturesRequest
            | Message::GetConfigRequest
            | Message::BarrierRequest
            | Message::BarrierReply
            | Message::Unsupported { .. } => {}
            Message::Error(e) => {
                w.write_u16::<BigEndian>(e.kind)?;
                w.write_u16::<BigEndian>(e.code)?;
                std::io::Write::write_all(&mut w, &e.data)?;
            }
            Message::EchoRequest(data) | Message::EchoReply(data) => {
                std::io::Write::write_all(&mut w, data)?;
            }
            Message::FeaturesReply(f) => {
                w.write_u64::<BigEndian>(f.dpid)?;
                w.write_u32::<BigEndian>(f.n_buffers)?;
                w.write_u8(f.n_tables)?;
                wire::pad(&mut w, 3)?;
                w.write_u32::<BigEndian>(f.capabilities)?;
                w.write_u32::<BigEndian>(1 << ACTION_OUTPUT)?;
                for port in &f.ports {
                    write_port(&mut w, port)?;
                }
            }
            Message::GetConfigReply(c) | Message::SetConfig(c) => {
                w.write_u16::<BigEndian>(c.flags)?;
                w.write_u16::<BigEndian>(c.miss_send_len)?;
            }
            Message::PacketIn(p) => {
                w.write_u32::<BigEndian>(p.buffer_id)?;
                w.write_u16::<BigEndian>(p.total_len)?;
                w.write_u16::<BigEndian>(port_to_wire(p.in_port)?)?;
                w.write_u8(p.reason)?;
                wire::pad(&mut w, 1)?;
                std::io::Write::write_all(&mut w, &p.data)?;
            }
            Message::PortStatus(s) => {
                w.write_u8(s.reason.to_wire())?;
                wire::pad(&mut w, 7)?;
                write_port(&mut w, &s.port)?;
            }
            Message::PacketOut(p) => {
                w.write_u32::<BigEndian>(p.buffer_id)?;
                w.write_u16::<BigEndian>(port_to_wire(p.in_port)?)?;
                w.write_u16::<BigEndian>((p.actions.len() * 8) as u16)?;
                write_actions(&mut w, &p.actions)?;
                std::io::Write::write_all(&mut w, &p.data)?;
            }
            Message::FlowMod(fm) => write_flow_mod(&mut w, fm)?,
            Message::DescriptionRequest => {
                w.write_u16::<BigEndian>(STATS_DESC)?;
                w.write_u16::<BigEndian>(0)?;
            }
            Message::DescriptionReply(d) => {
                w.write_u16::<BigEndian>(STATS_DESC)?;
                w.write_u16::<BigEndian>(0)?;
                wire::write_str(&mut w, &d.manufacturer, DESC_STR_LEN)?;
                wire::write_str(&mut w, &d.hardware, DESC_STR_LEN)?;
                wire::write_str(&mut w, &d.software, DESC_STR_LEN)?;
                wire::write_str(&mut w, &d.serial, SERIAL_NUM_LEN)?;
                wire::write_str(&mut w, &d.datapath, DESC_STR_LEN)?;
            }
            Message::PortDescriptionRequest | Message::PortDescriptionReply(_) => {
                return Err(CodecError::Unsupported {
                    what: "port description",
                    version: VERSION,
                })
            }
        }
        w.finish()
    }

    fn decode(&self, frame: &[u8]) -> Result<Message, CodecError> {
        let (header, mut r) = wire::open(Version::V1_0, frame)?;
        let r = &mut r;
        let message = match header.msg_type {
            msg::HELLO => Message::Hello,
            msg::ERROR => Message::Error(ErrorMsg {
                kind: r.read_u16::<BigEndian>()?,
                code: r.read_u16::<BigEndian>()?,
                data: wire::rest(r),
            }),
            msg::ECHO_REQUEST => Message::EchoRequest(wire::rest(r)),
            msg::ECHO_REPLY => Message::EchoReply(wire::rest(r)),
            msg::FEATURES_REQUEST => Message::FeaturesRequest,
            msg::FEATURES_REPLY => Message::FeaturesReply(read_features(r)?),
            msg::GET_CONFIG_REQUEST => Message::GetConfigRequest,
            msg::GET_CONFIG_REPLY => Message::GetConfigReply(read_config(r)?),
            msg::SET_CONFIG => Message::SetConfig(read_config(r)?),
            msg::PACKET_IN => {
                let buffer_id = r.read_u32::<BigEndian>()?;
                let total_len = r.read_u16::<BigEndian>()?;
                let in_port = port_from_wire(r.read_u16::<BigEndian>()?);
                let reason = r.read_u8()?;
                wire::skip(r, 1)?;
                Message::PacketIn(PacketIn {
                    buffer_id,
                    total_len,
                    in_port,
                    reason,
                    table_id: 0,
                    cookie: 0,
                    data: wire::rest(r),
                })
            }
            msg::PORT_STATUS => {
                let reason = PortReason::from_wire(r.read_u8()?)?;
                wire::skip(r, 7)?;
                Message::PortStatus(PortStatus {
                    reason,
                    port: read_port(r)?,
                })
            }
            msg::PACKET_OUT => {
                let buffer_id = r.read_u32::<BigEndian>()?;
                let in_port = port_from_wire(r.read_u16::<BigEndian>()?);
                let actions_len = r.read_u16::<BigEndian>()? as usize;
                let actions = read_actions(&mut wire::take(r, actions_len)?)?;
                Message::PacketOut(PacketOut {
                    buffer_id,
                    in_port,
                    actions,
                    data: wire::rest(r),
                })
            }
            msg::FLOW_MOD => Message::FlowMod(read_flow_mod(r)?),
            msg::STATS_REQUEST => match r.read_u16::<BigEndian>()? {
                STATS_DESC => Message::DescriptionRequest,
                _ => Message::Unsupported {
                    msg_type: header.msg_type,
                },
            },
            msg::STATS_REPLY => {
                let kind = r.read_u16::<BigEndian>()?;
                let _flags = r.read_u16::<BigEndian>()?;
                match kind {
                    STATS_DESC => Message::DescriptionReply(read_description(r)?),
                    _ => Message::Unsupported {
                        msg_type: header.msg_type,
                    },
                }
            }
            msg::BARRIER_REQUEST => Message::BarrierRequest,
            msg::BARRIER_REPLY => Message::BarrierReply,
            other => Message::Unsupported { msg_type: other },
        };
        Ok(message)
    }
}

/// Map a 32-bit port number onto the 16-bit 1.0 numbering.
pub(crate) fn port_to_wire(port: u32) -> Result<u16, CodecError> {
    if port >= crate::types::port::MAX {
        Ok((port & 0xffff) as u16)
    } else if port < 0xff00 {
        Ok(port as u16)
    } else {
        Err(CodecError::Invalid(format!(
            "port {port} does not fit OpenFlow 1.0 numbering"
        )))
    }
}

pub(crate) fn port_from_wire(port: u16) -> u32 {
    if port >= 0xff00 {
        0xffff_0000 | u32::from(port)
    } else {
        u32::from(port)
    }
}

/// Current bit rate implied by `OFPPF_*` link mode bits.
fn speed_kbps(features: u32) -> u32 {
    const MODES: [(u32, u32); 7] = [
        (1 << 6, 10_000_000),
        (1 << 5, 1_000_000),
        (1 << 4, 1_000_000),
        (1 << 3, 100_000),
        (1 << 2, 100_000),
        (1 << 1, 10_000),
        (1 << 0, 10_000),
    ];
    MODES
        .iter()
        .find(|(bit, _)| features & bit != 0)
        .map(|(_, kbps)| *kbps)
        .unwrap_or(0)
}

fn read_port(r: &mut Reader<'_>) -> Result<PortDesc, CodecError> {
    let number = port_from_wire(r.read_u16::<BigEndian>()?);
    let hw_addr = wire::read_mac(r)?;
    let name = wire::read_str(r, PORT_NAME_LEN)?;
    let config = r.read_u32::<BigEndian>()?;
    let state = r.read_u32::<BigEndian>()?;
    let current = r.read_u32::<BigEndian>()?;
    let _advertised = r.read_u32::<BigEndian>()?;
    let supported = r.read_u32::<BigEndian>()?;
    let _peer = r.read_u32::<BigEndian>()?;
    Ok(PortDesc {
        number,
        hw_addr,
        name,
        config,
        state,
        current,
        curr_speed_kbps: speed_kbps(current),
        max_speed_kbps: speed_kbps(supported),
    })
}

fn write_port(w: &mut FrameBuf, port: &PortDesc) -> Result<(), CodecError> {
    w.write_u16::<BigEndian>(port_to_wire(port.number)?)?;
    std::io::Write::write_all(w, &port.hw_addr.octets())?;
    wire::write_str(w, &port.name, PORT_NAME_LEN)?;
    w.write_u32::<BigEndian>(port.config)?;
    w.write_u32::<BigEndian>(port.state)?;
    w.write_u32::<BigEndian>(port.current)?;
    w.write_u32::<BigEndian>(port.current)?;
    w.write_u32::<BigEndian>(port.current)?;
    w.write_u32::<BigEndian>(0)?;
    Ok(())
}

fn read_features(r: &mut Reader<'_>) -> Result<Features, CodecError> {
    let dpid = r.read_u64::<BigEndian>()?;
    let n_buffers = r.read_u32::<BigEndian>()?;
    let n_tables = r.read_u8()?;
    wire::skip(r, 3)?;
    let capabilities = r.read_u32::<BigEndian>()?;
    let _actions = r.read_u32::<BigEndian>()?;

    if wire::remaining(r) % PHY_PORT_LEN != 0 {
        return Err(CodecError::Invalid(format!(
            "features reply port table of {} bytes",
            wire::remaining(r)
        )));
    }
    let mut ports = Vec::with_capacity(wire::remaining(r) / PHY_PORT_LEN);
    while wire::remaining(r) >= PHY_PORT_LEN {
        ports.push(read_port(r)?);
    }

    Ok(Features {
        dpid,
        n_buffers,
        n_tables,
        auxiliary_id: 0,
        capabilities,
        ports,
    })
}

fn read_config(r: &mut Reader<'_>) -> Result<SwitchConfig, CodecError> {
    Ok(SwitchConfig {
        flags: r.read_u16::<BigEndian>()?,
        miss_send_len: r.read_u16::<BigEndian>()?,
    })
}

fn read_description(r: &mut Reader<'_>) -> Result<Description, CodecError> {
    Ok(Description {
        manufacturer: wire::read_str(r, DESC_STR_LEN)?,
        hardware: wire::read_str(r, DESC_STR_LEN)?,
        software: wire::read_str(r, DESC_STR_LEN)?,
        serial: wire::read_str(r, SERIAL_NUM_LEN)?,
        datapath: wire::read_str(r, DESC_STR_LEN)?,
    })
}

fn write_actions(w: &mut FrameBuf, actions: &[Action]) -> Result<(), CodecError> {
    for action in actions {
        match *action {
            Action::Output { port, max_len } => {
                w.write_u16::<BigEndian>(ACTION_OUTPUT)?;
                w.write_u16::<BigEndian>(8)?;
                w.write_u16::<BigEndian>(port_to_wire(port)?)?;
                w.write_u16::<BigEndian>(max_len)?;
            }
        }
    }
    Ok(())
}

fn read_actions(r: &mut Reader<'_>) -> Result<Vec<Action>, CodecError> {
    let mut actions = Vec::new();
    while wire::remaining(r) > 0 {
        let kind = r.read_u16::<BigEndian>()?;
        let len = r.read_u16::<BigEndian>()? as usize;
        if len < 8 || len % 8 != 0 {
            return Err(CodecError::Invalid(format!("action length {len}")));
        }
        if kind == ACTION_OUTPUT {
            let port = port_from_wire(r.read_u16::<BigEndian>()?);
            let max_len = r.read_u16::<BigEndian>()?;
            actions.push(Action::Output { port, max_len });
            wire::skip(r, len - 8)?;
        } else {
            wire::skip(r, len - 4)?;
        }
    }
    Ok(actions)
}

fn write_match(w: &mut FrameBuf, m: &Match) -> Result<(), CodecError> {
    let mut wildcards = FW_ALL;
    if m.in_port.is_some() {
        wildcards &= !FW_IN_PORT;
    }
    if m.eth_src.is_some() {
        wildcards &= !FW_DL_SRC;
    }
    if m.eth_dst.is_some() {
        wildcards &= !FW_DL_DST;
    }
    if m.eth_type.is_some() {
        wildcards &= !FW_DL_TYPE;
    }

    w.write_u32::<BigEndian>(wildcards)?;
    w.write_u16::<BigEndian>(match m.in_port {
        Some(port) => port_to_wire(port)?,
        None => 0,
    })?;
    std::io::Write::write_all(w, &m.eth_src.unwrap_or_default().octets())?;
    std::io::Write::write_all(w, &m.eth_dst.unwrap_or_default().octets())?;
    w.write_u16::<BigEndian>(0)?; // dl_vlan
    w.write_u8(0)?; // dl_vlan_pcp
    wire::pad(w, 1)?;
    w.write_u16::<BigEndian>(m.eth_type.unwrap_or(0))?;
    // nw_tos, nw_proto, pad, nw_src, nw_dst, tp_src, tp_dst
    std::io::Write::write_all(w, &[0u8; 16])?;
    Ok(())
}

fn read_match(r: &mut Reader<'_>) -> Result<Match, CodecError> {
    let wildcards = r.read_u32::<BigEndian>()?;
    let in_port = port_from_wire(r.read_u16::<BigEndian>()?);
    let dl_src = wire::read_mac(r)?;
    let dl_dst = wire::read_mac(r)?;
    wire::skip(r, 4)?;
    let dl_type = r.read_u16::<BigEndian>()?;
    wire::skip(r, 16)?;

    let set = |bit: u32| wildcards & bit == 0;
    Ok(Match {
        in_port: set(FW_IN_PORT).then_some(in_port),
        eth_src: set(FW_DL_SRC).then_some(dl_src),
        eth_dst: set(FW_DL_DST).then_some(dl_dst),
        eth_type: set(FW_DL_TYPE).then_some(dl_type),
    })
}

fn write_flow_mod(w: &mut FrameBuf, fm: &FlowMod) -> Result<(), CodecError> {
    let mut actions: Vec<Action> = Vec::new();
    for instruction in &fm.instructions {
        match instruction {
            Instruction::ApplyActions(list) => actions.extend_from_slice(list),
            Instruction::GotoTable(_) => {
                return Err(CodecError::Unsupported {
                    what: "goto-table instruction",
                    version: VERSION,
                })
            }
        }
    }

    write_match(w, &fm.matching)?;
    w.write_u64::<BigEndian>(fm.cookie)?;
    w.write_u16::<BigEndian>(u16::from(fm.command.to_wire()))?;
    w.write_u16::<BigEndian>(fm.idle_timeout)?;
    w.write_u16::<BigEndian>(fm.hard_timeout)?;
    w.write_u16::<BigEndian>(fm.priority)?;
    w.write_u32::<BigEndian>(fm.buffer_id)?;
    w.write_u16::<BigEndian>(port_to_wire(fm.out_port)?)?;
    w.write_u16::<BigEndian>(fm.flags)?;
    write_actions(w, &actions)
}

fn read_flow_mod(r: &mut Reader<'_>) -> Result<FlowMod, CodecError> {
    let matching = read_match(r)?;
    let cookie = r.read_u64::<BigEndian>()?;
    let raw_command = r.read_u16::<BigEndian>()?;
    let command = FlowCommand::from_wire(raw_command)
        .ok_or_else(|| CodecError::Invalid(format!("flow mod command {raw_command}")))?;
    let idle_timeout = r.read_u16::<BigEndian>()?;
    let hard_timeout = r.read_u16::<BigEndian>()?;
    let priority = r.read_u16::<BigEndian>()?;
    let buffer_id = r.read_u32::<BigEndian>()?;
    let out_port = port_from_wire(r.read_u16::<BigEndian>()?);
    let flags = r.read_u16::<BigEndian>()?;
    let actions = read_actions(r)?;

    Ok(FlowMod {
        cookie,
        cookie_mask: 0,
        table_id: 0,
        command,
        idle_timeout,
        hard_timeout,
        priority,
        buffer_id,
        out_port,
        out_group: GROUP_ANY,
        flags,
        matching,
        instructions: if actions.is_empty() {
            Vec::new()
        } else {
            vec![Instruction::ApplyActions(actions)]
        },
    })
}
