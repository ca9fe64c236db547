// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flow programming and packet I/O messages.

use crate::types::{port, MacAddr, SwitchConfig};

/// Buffer id meaning "packet carried inline".
pub const NO_BUFFER: u32 = 0xffff_ffff;

/// Table id addressing every table (`OFPTT_ALL`).
pub const TABLE_ALL: u8 = 0xff;

/// Group wildcard (`OFPG_ANY`).
pub const GROUP_ANY: u32 = 0xffff_ffff;

/// Flow match. `None` fields are wildcarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Match {
    pub in_port: Option<u32>,
    pub eth_dst: Option<MacAddr>,
    pub eth_src: Option<MacAddr>,
    pub eth_type: Option<u16>,
}

impl Match {
    /// Match everything.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_eth_dst(mut self, mac: MacAddr) -> Self {
        self.eth_dst = Some(mac);
        self
    }

    pub fn with_eth_src(mut self, mac: MacAddr) -> Self {
        self.eth_src = Some(mac);
        self
    }

    pub fn with_in_port(mut self, port: u32) -> Self {
        self.in_port = Some(port);
        self
    }
}

/// Flow or packet-out action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Output { port: u32, max_len: u16 },
}

impl Action {
    /// Output to `port`, sending whole packets when `port` is the controller.
    pub fn output(port: u32) -> Self {
        Self::Output {
            port,
            max_len: SwitchConfig::NO_BUFFER,
        }
    }
}

/// Flow instruction. 1.0 only understands [`Instruction::ApplyActions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    GotoTable(u8),
    ApplyActions(Vec<Action>),
}

/// FLOW_MOD command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowCommand {
    Add,
    Modify,
    ModifyStrict,
    Delete,
    DeleteStrict,
}

impl FlowCommand {
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Modify => 1,
            Self::ModifyStrict => 2,
            Self::Delete => 3,
            Self::DeleteStrict => 4,
        }
    }

    pub(crate) fn from_wire(v: u16) -> Option<Self> {
        match v {
            0 => Some(Self::Add),
            1 => Some(Self::Modify),
            2 => Some(Self::ModifyStrict),
            3 => Some(Self::Delete),
            4 => Some(Self::DeleteStrict),
            _ => None,
        }
    }
}

/// FLOW_MOD body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub cookie: u64,
    pub cookie_mask: u64,
    pub table_id: u8,
    pub command: FlowCommand,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub out_port: u32,
    pub out_group: u32,
    pub flags: u16,
    pub matching: Match,
    pub instructions: Vec<Instruction>,
}

impl FlowMod {
    /// Add a permanent flow in `table_id`.
    pub fn add(table_id: u8, priority: u16, matching: Match, instructions: Vec<Instruction>) -> Self {
        Self {
            cookie: 0,
            cookie_mask: 0,
            table_id,
            command: FlowCommand::Add,
            idle_timeout: 0,
            hard_timeout: 0,
            priority,
            buffer_id: NO_BUFFER,
            out_port: port::ANY,
            out_group: GROUP_ANY,
            flags: 0,
            matching,
            instructions,
        }
    }

    /// Delete every flow in every table.
    pub fn delete_all() -> Self {
        Self::delete(TABLE_ALL, Match::any())
    }

    /// Delete the flows in `table_id` matching `matching`.
    pub fn delete(table_id: u8, matching: Match) -> Self {
        Self {
            command: FlowCommand::Delete,
            ..Self::add(table_id, 0, matching, Vec::new())
        }
    }

    /// Permanent, priority-0, wildcard entry used to catch table misses.
    pub fn table_miss(table_id: u8, instructions: Vec<Instruction>) -> Self {
        Self::add(table_id, 0, Match::any(), instructions)
    }
}

/// PACKET_IN body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub buffer_id: u32,
    pub total_len: u16,
    pub in_port: u32,
    pub reason: u8,
    /// Always 0 on 1.0.
    pub table_id: u8,
    pub cookie: u64,
    pub data: Vec<u8>,
}

impl PacketIn {
    /// Unbuffered table-miss packet received on `in_port`.
    pub fn new(in_port: u32, data: Vec<u8>) -> Self {
        Self {
            buffer_id: NO_BUFFER,
            total_len: data.len() as u16,
            in_port,
            reason: 0,
            table_id: 0,
            cookie: 0,
            data,
        }
    }
}

/// PACKET_OUT body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub buffer_id: u32,
    pub in_port: u32,
    pub actions: Vec<Action>,
    pub data: Vec<u8>,
}

impl PacketOut {
    /// Emit `data` from the controller out of `out_port`.
    pub fn emit(out_port: u32, data: Vec<u8>) -> Self {
        Self {
            buffer_id: NO_BUFFER,
            in_port: port::CONTROLLER,
            actions: vec![Action::output(out_port)],
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_all_is_wildcard_everywhere() {
        let fm = FlowMod::delete_all();
        assert_eq!(fm.command, FlowCommand::Delete);
        assert_eq!(fm.table_id, TABLE_ALL);
        assert_eq!(fm.out_port, port::ANY);
        assert_eq!(fm.out_group, GROUP_ANY);
        assert!(fm.matching.is_wildcard());
        assert!(fm.instructions.is_empty());
    }

    #[test]
    fn test_table_miss_is_permanent_lowest_priority() {
        let fm = FlowMod::table_miss(
            100,
            vec![Instruction::ApplyActions(vec![Action::output(port::CONTROLLER)])],
        );
        assert_eq!(fm.priority, 0);
        assert_eq!(fm.idle_timeout, 0);
        assert_eq!(fm.hard_timeout, 0);
        assert_eq!(fm.table_id, 100);
        assert!(fm.matching.is_wildcard());
    }
}
