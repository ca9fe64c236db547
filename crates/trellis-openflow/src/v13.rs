// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OpenFlow 1.3 wire codec.

use crate::error::CodecError;
use crate::flow::{Action, FlowCommand, FlowMod, Instruction, Match, PacketIn, PacketOut};
use crate::message::{Codec, Message, Version};
use crate::types::{
    Description, ErrorMsg, Features, PortDesc, PortReason, PortStatus, SwitchConfig,
};
use crate::wire::{self, FrameBuf, Reader};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write;

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
    pub const MULTIPART_REQUEST: u8 = 18;
    pub const MULTIPART_REPLY: u8 = 19;
    pub const BARRIER_REQUEST: u8 = 20;
    pub const BARRIER_REPLY: u8 = 21;
}

const MP_DESC: u16 = 0;
const MP_PORT_DESC: u16 = 13;

const PORT_LEN: usize = 64;
const PORT_NAME_LEN: usize = 16;
const DESC_STR_LEN: usize = 256;
const SERIAL_NUM_LEN: usize = 32;

const MATCH_TYPE_OXM: u16 = 1;
const OXM_CLASS_BASIC: u16 = 0x8000;
const OXM_IN_PORT: u8 = 0;
const OXM_ETH_DST: u8 = 3;
const OXM_ETH_SRC: u8 = 4;
const OXM_ETH_TYPE: u8 = 5;

const INSTRUCTION_GOTO_TABLE: u16 = 1;
const INSTRUCTION_APPLY_ACTIONS: u16 = 4;
const ACTION_OUTPUT: u16 = 0;
const ACTION_OUTPUT_LEN: u16 = 16;

/// OpenFlow 1.3 codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct V13Codec;

impl Codec for V13Codec {
    fn version(&self) -> Version {
        Version::V1_3
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
            Message::DescriptionRequest | Message::PortDescriptionRequest => {
                msg::MULTIPART_REQUEST
            }
            Message::DescriptionReply(_) | Message::PortDescriptionReply(_) => {
                msg::MULTIPART_REPLY
            }
            Message::BarrierRequest => msg::BARRIER_REQUEST,
            Message::BarrierReply => msg::BARRIER_REPLY,
            Message::Unsupported { msg_type } => *msg_type,
        };

        let mut w = FrameBuf::new(Version::V1_3, msg_type, xid);
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
                w.write_all(&e.data)?;
            }
            Message::EchoRequest(data) | Message::EchoReply(data) => w.write_all(data)?,
            Message::FeaturesReply(f) => {
                w.write_u64::<BigEndian>(f.dpid)?;
                w.write_u32::<BigEndian>(f.n_buffers)?;
                w.write_u8(f.n_tables)?;
                w.write_u8(f.auxiliary_id)?;
                wire::pad(&mut w, 2)?;
                w.write_u32::<BigEndian>(f.capabilities)?;
                w.write_u32::<BigEndian>(0)?;
            }
            Message::GetConfigReply(c) | Message::SetConfig(c) => {
                w.write_u16::<BigEndian>(c.flags)?;
                w.write_u16::<BigEndian>(c.miss_send_len)?;
            }
            Message::PacketIn(p) => {
                w.write_u32::<BigEndian>(p.buffer_id)?;
                w.write_u16::<BigEndian>(p.total_len)?;
                w.write_u8(p.reason)?;
                w.write_u8(p.table_id)?;
                w.write_u64::<BigEndian>(p.cookie)?;
                write_match(&mut w, &Match::any().with_in_port(p.in_port))?;
                wire::pad(&mut w, 2)?;
                w.write_all(&p.data)?;
            }
            Message::PortStatus(s) => {
                w.write_u8(s.reason.to_wire())?;
                wire::pad(&mut w, 7)?;
                write_port(&mut w, &s.port)?;
            }
            Message::PacketOut(p) => {
                w.write_u32::<BigEndian>(p.buffer_id)?;
                w.write_u32::<BigEndian>(p.in_port)?;
                w.write_u16::<BigEndian>(p.actions.len() as u16 * ACTION_OUTPUT_LEN)?;
                wire::pad(&mut w, 6)?;
                write_actions(&mut w, &p.actions)?;
                w.write_all(&p.data)?;
            }
            Message::FlowMod(fm) => write_flow_mod(&mut w, fm)?,
            Message::DescriptionRequest => write_multipart_header(&mut w, MP_DESC)?,
            Message::PortDescriptionRequest => write_multipart_header(&mut w, MP_PORT_DESC)?,
            Message::DescriptionReply(d) => {
                write_multipart_header(&mut w, MP_DESC)?;
                wire::write_str(&mut w, &d.manufacturer, DESC_STR_LEN)?;
                wire::write_str(&mut w, &d.hardware, DESC_STR_LEN)?;
                wire::write_str(&mut w, &d.software, DESC_STR_LEN)?;
                wire::write_str(&mut w, &d.serial, SERIAL_NUM_LEN)?;
                wire::write_str(&mut w, &d.datapath, DESC_STR_LEN)?;
            }
            Message::PortDescriptionReply(ports) => {
                write_multipart_header(&mut w, MP_PORT_DESC)?;
                for port in ports {
                    write_port(&mut w, port)?;
                }
            }
        }
        w.finish()
    }

    fn decode(&self, frame: &[u8]) -> Result<Message, CodecError> {
        let (header, mut r) = wire::open(Version::V1_3, frame)?;
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
            msg::FEATURES_REPLY => {
                let dpid = r.read_u64::<BigEndian>()?;
                let n_buffers = r.read_u32::<BigEndian>()?;
                let n_tables = r.read_u8()?;
                let auxiliary_id = r.read_u8()?;
                wire::skip(r, 2)?;
                let capabilities = r.read_u32::<BigEndian>()?;
                let _reserved = r.read_u32::<BigEndian>()?;
                Message::FeaturesReply(Features {
                    dpid,
                    n_buffers,
                    n_tables,
                    auxiliary_id,
                    capabilities,
                    ports: Vec::new(),
                })
            }
            msg::GET_CONFIG_REQUEST => Message::GetConfigRequest,
            msg::GET_CONFIG_REPLY => Message::GetConfigReply(read_config(r)?),
            msg::SET_CONFIG => Message::SetConfig(read_config(r)?),
            msg::PACKET_IN => {
                let buffer_id = r.read_u32::<BigEndian>()?;
                let total_len = r.read_u16::<BigEndian>()?;
                let reason = r.read_u8()?;
                let table_id = r.read_u8()?;
                let cookie = r.read_u64::<BigEndian>()?;
                let matching = read_match(r)?;
                wire::skip(r, 2)?;
                let in_port = matching
                    .in_port
                    .ok_or_else(|| CodecError::Invalid("packet-in without in_port".into()))?;
                Message::PacketIn(PacketIn {
                    buffer_id,
                    total_len,
                    in_port,
                    reason,
                    table_id,
                    cookie,
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
                let in_port = r.read_u32::<BigEndian>()?;
                let actions_len = r.read_u16::<BigEndian>()? as usize;
                wire::skip(r, 6)?;
                let actions = read_actions(&mut wire::take(r, actions_len)?)?;
                Message::PacketOut(PacketOut {
                    buffer_id,
                    in_port,
                    actions,
                    data: wire::rest(r),
                })
            }
            msg::FLOW_MOD => Message::FlowMod(read_flow_mod(r)?),
            msg::MULTIPART_REQUEST => match read_multipart_header(r)? {
                MP_DESC => Message::DescriptionRequest,
                MP_PORT_DESC => Message::PortDescriptionRequest,
                _ => Message::Unsupported {
                    msg_type: header.msg_type,
                },
            },
            msg::MULTIPART_REPLY => match read_multipart_header(r)? {
                MP_DESC => Message::DescriptionReply(Description {
                    manufacturer: wire::read_str(r, DESC_STR_LEN)?,
                    hardware: wire::read_str(r, DESC_STR_LEN)?,
                    software: wire::read_str(r, DESC_STR_LEN)?,
                    serial: wire::read_str(r, SERIAL_NUM_LEN)?,
                    datapath: wire::read_str(r, DESC_STR_LEN)?,
                }),
                MP_PORT_DESC => {
                    if wire::remaining(r) % PORT_LEN != 0 {
                        return Err(CodecError::Invalid(format!(
                            "port description body of {} bytes",
                            wire::remaining(r)
                        )));
                    }
                    let mut ports = Vec::with_capacity(wire::remaining(r) / PORT_LEN);
                    while wire::remaining(r) >= PORT_LEN {
                        ports.push(read_port(r)?);
                    }
                    Message::PortDescriptionReply(ports)
                }
                _ => Message::Unsupported {
                    msg_type: header.msg_type,
                },
            },
            msg::BARRIER_REQUEST => Message::BarrierRequest,
            msg::BARRIER_REPLY => Message::BarrierReply,
            other => Message::Unsupported { msg_type: other },
        };
        Ok(message)
    }
}

fn write_multipart_header(w: &mut FrameBuf, kind: u16) -> Result<(), CodecError> {
    w.write_u16::<BigEndian>(kind)?;
    w.write_u16::<BigEndian>(0)?;
    wire::pad(w, 4)?;
    Ok(())
}

/// Returns the multipart type; flags are ignored.
fn read_multipart_header(r: &mut Reader<'_>) -> Result<u16, CodecError> {
    let kind = r.read_u16::<BigEndian>()?;
    let _flags = r.read_u16::<BigEndian>()?;
    wire::skip(r, 4)?;
    Ok(kind)
}

fn read_config(r: &mut Reader<'_>) -> Result<SwitchConfig, CodecError> {
    Ok(SwitchConfig {
        flags: r.read_u16::<BigEndian>()?,
        miss_send_len: r.read_u16::<BigEndian>()?,
    })
}

fn read_port(r: &mut Reader<'_>) -> Result<PortDesc, CodecError> {
    let number = r.read_u32::<BigEndian>()?;
    wire::skip(r, 4)?;
    let hw_addr = wire::read_mac(r)?;
    wire::skip(r, 2)?;
    let name = wire::read_str(r, PORT_NAME_LEN)?;
    let config = r.read_u32::<BigEndian>()?;
    let state = r.read_u32::<BigEndian>()?;
    let current = r.read_u32::<BigEndian>()?;
    // advertised, supported, peer
    wire::skip(r, 12)?;
    let curr_speed_kbps = r.read_u32::<BigEndian>()?;
    let max_speed_kbps = r.read_u32::<BigEndian>()?;
    Ok(PortDesc {
        number,
        hw_addr,
        name,
        config,
        state,
        current,
        curr_speed_kbps,
        max_speed_kbps,
    })
}

fn write_port(w: &mut FrameBuf, port: &PortDesc) -> Result<(), CodecError> {
    w.write_u32::<BigEndian>(port.number)?;
    wire::pad(w, 4)?;
    w.write_all(&port.hw_addr.octets())?;
    wire::pad(w, 2)?;
    wire::write_str(w, &port.name, PORT_NAME_LEN)?;
    w.write_u32::<BigEndian>(port.config)?;
    w.write_u32::<BigEndian>(port.state)?;
    w.write_u32::<BigEndian>(port.current)?;
    w.write_u32::<BigEndian>(port.current)?;
    w.write_u32::<BigEndian>(port.current)?;
    w.write_u32::<BigEndian>(0)?;
    w.write_u32::<BigEndian>(port.curr_speed_kbps)?;
    w.write_u32::<BigEndian>(port.max_speed_kbps)?;
    Ok(())
}

fn oxm_header(w: &mut Vec<u8>, field: u8, len: u8) {
    w.extend_from_slice(&OXM_CLASS_BASIC.to_be_bytes());
    w.push(field << 1);
    w.push(len);
}

/// `ofp_match` with its OXM fields, padded to a multiple of 8.
fn write_match(w: &mut FrameBuf, m: &Match) -> Result<(), CodecError> {
    let mut oxm = Vec::new();
    if let Some(port) = m.in_port {
        oxm_header(&mut oxm, OXM_IN_PORT, 4);
        oxm.extend_from_slice(&port.to_be_bytes());
    }
    if let Some(mac) = m.eth_dst {
        oxm_header(&mut oxm, OXM_ETH_DST, 6);
        oxm.extend_from_slice(&mac.octets());
    }
    if let Some(mac) = m.eth_src {
        oxm_header(&mut oxm, OXM_ETH_SRC, 6);
        oxm.extend_from_slice(&mac.octets());
    }
    if let Some(eth_type) = m.eth_type {
        oxm_header(&mut oxm, OXM_ETH_TYPE, 2);
        oxm.extend_from_slice(&eth_type.to_be_bytes());
    }

    let len = 4 + oxm.len();
    w.write_u16::<BigEndian>(MATCH_TYPE_OXM)?;
    w.write_u16::<BigEndian>(len as u16)?;
    w.write_all(&oxm)?;
    wire::pad(w, wire::pad8(len))?;
    Ok(())
}

fn read_match(r: &mut Reader<'_>) -> Result<Match, CodecError> {
    let kind = r.read_u16::<BigEndian>()?;
    let len = r.read_u16::<BigEndian>()? as usize;
    if kind != MATCH_TYPE_OXM || len < 4 {
        return Err(CodecError::Invalid(format!("match type {kind} length {len}")));
    }
    let mut fields = wire::take(r, len - 4)?;
    wire::skip(r, wire::pad8(len))?;

    let mut m = Match::any();
    while wire::remaining(&fields) > 0 {
        let class = fields.read_u16::<BigEndian>()?;
        let field_and_mask = fields.read_u8()?;
        let value_len = fields.read_u8()? as usize;
        let mut value = wire::take(&mut fields, value_len)?;
        if class != OXM_CLASS_BASIC || field_and_mask & 1 != 0 {
            continue;
        }
        match field_and_mask >> 1 {
            OXM_IN_PORT => m.in_port = Some(value.read_u32::<BigEndian>()?),
            OXM_ETH_DST => m.eth_dst = Some(wire::read_mac(&mut value)?),
            OXM_ETH_SRC => m.eth_src = Some(wire::read_mac(&mut value)?),
            OXM_ETH_TYPE => m.eth_type = Some(value.read_u16::<BigEndian>()?),
            _ => {}
        }
    }
    Ok(m)
}

fn write_actions(w: &mut FrameBuf, actions: &[Action]) -> Result<(), CodecError> {
    for action in actions {
        match *action {
            Action::Output { port, max_len } => {
                w.write_u16::<BigEndian>(ACTION_OUTPUT)?;
                w.write_u16::<BigEndian>(ACTION_OUTPUT_LEN)?;
                w.write_u32::<BigEndian>(port)?;
                w.write_u16::<BigEndian>(max_len)?;
                wire::pad(w, 6)?;
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
        let mut body = wire::take(r, len - 4)?;
        if kind == ACTION_OUTPUT {
            let port = body.read_u32::<BigEndian>()?;
            let max_len = body.read_u16::<BigEndian>()?;
            actions.push(Action::Output { port, max_len });
        }
    }
    Ok(actions)
}

fn write_flow_mod(w: &mut FrameBuf, fm: &FlowMod) -> Result<(), CodecError> {
    w.write_u64::<BigEndian>(fm.cookie)?;
    w.write_u64::<BigEndian>(fm.cookie_mask)?;
    w.write_u8(fm.table_id)?;
    w.write_u8(fm.command.to_wire())?;
    w.write_u16::<BigEndian>(fm.idle_timeout)?;
    w.write_u16::<BigEndian>(fm.hard_timeout)?;
    w.write_u16::<BigEndian>(fm.priority)?;
    w.write_u32::<BigEndian>(fm.buffer_id)?;
    w.write_u32::<BigEndian>(fm.out_port)?;
    w.write_u32::<BigEndian>(fm.out_group)?;
    w.write_u16::<BigEndian>(fm.flags)?;
    wire::pad(w, 2)?;
    write_match(w, &fm.matching)?;

    for instruction in &fm.instructions {
        match instruction {
            Instruction::GotoTable(table) => {
                w.write_u16::<BigEndian>(INSTRUCTION_GOTO_TABLE)?;
                w.write_u16::<BigEndian>(8)?;
                w.write_u8(*table)?;
                wire::pad(w, 3)?;
            }
            Instruction::ApplyActions(actions) => {
                w.write_u16::<BigEndian>(INSTRUCTION_APPLY_ACTIONS)?;
                w.write_u16::<BigEndian>(8 + actions.len() as u16 * ACTION_OUTPUT_LEN)?;
                wire::pad(w, 4)?;
                write_actions(w, actions)?;
            }
        }
    }
    Ok(())
}

fn read_flow_mod(r: &mut Reader<'_>) -> Result<FlowMod, CodecError> {
    let cookie = r.read_u64::<BigEndian>()?;
    let cookie_mask = r.read_u64::<BigEndian>()?;
    let table_id = r.read_u8()?;
    let raw_command = r.read_u8()?;
    let command = FlowCommand::from_wire(u16::from(raw_command))
        .ok_or_else(|| CodecError::Invalid(format!("flow mod command {raw_command}")))?;
    let idle_timeout = r.read_u16::<BigEndian>()?;
    let hard_timeout = r.read_u16::<BigEndian>()?;
    let priority = r.read_u16::<BigEndian>()?;
    let buffer_id = r.read_u32::<BigEndian>()?;
    let out_port = r.read_u32::<BigEndian>()?;
    let out_group = r.read_u32::<BigEndian>()?;
    let flags = r.read_u16::<BigEndian>()?;
    wire::skip(r, 2)?;
    let matching = read_match(r)?;

    let mut instructions = Vec::new();
    while wire::remaining(r) > 0 {
        let kind = r.read_u16::<BigEndian>()?;
        let len = r.read_u16::<BigEndian>()? as usize;
        if len < 8 {
            return Err(CodecError::Invalid(format!("instruction length {len}")));
        }
        let mut body = wire::take(r, len - 4)?;
        match kind {
            INSTRUCTION_GOTO_TABLE => instructions.push(Instruction::GotoTable(body.read_u8()?)),
            INSTRUCTION_APPLY_ACTIONS => {
                wire::skip(&mut body, 4)?;
                instructions.push(Instruction::ApplyActions(read_actions(&mut body)?));
            }
            _ => {}
        }
    }

    Ok(FlowMod {
        cookie,
        cookie_mask,
        table_id,
        command,
        idle_timeout,
        hard_timeout,
        priority,
        buffer_id,
        out_port,
        out_group,
        flags,
        matching,
        instructions,
    })
}
