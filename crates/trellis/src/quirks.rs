// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Table-miss strategies and the vendor quirk table.
//!
//! A strategy is the set of permanent low-priority flows that send unmatched
//! packets to the controller, plus the table where the controller installs
//! its own rules. Switches are matched by their description strings.

use std::fmt;
use trellis_openflow::{port, Action, Description, FlowMod, Instruction, Message};

/// Installs table-miss entries for one class of switch.
pub trait TableMissStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Table the controller programs once the strategy is installed.
    fn flow_table(&self) -> u8;

    /// Table-miss flows, in installation order.
    fn flows(&self) -> Vec<FlowMod>;
}

fn to_controller() -> Vec<Instruction> {
    vec![Instruction::ApplyActions(vec![Action::output(port::CONTROLLER)])]
}

/// Single table: table 0 misses go to the controller unbuffered.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTableMiss;

impl TableMissStrategy for DefaultTableMiss {
    fn name(&self) -> &'static str {
        "default"
    }

    fn flow_table(&self) -> u8 {
        0
    }

    fn flows(&self) -> Vec<FlowMod> {
        vec![FlowMod::table_miss(0, to_controller())]
    }
}

/// HP/Aruba ProCurve: table 0 only chains into the software table 100.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProCurveTableMiss;

impl ProCurveTableMiss {
    pub const SOFTWARE_TABLE: u8 = 100;
}

impl TableMissStrategy for ProCurveTableMiss {
    fn name(&self) -> &'static str {
        "procurve"
    }

    fn flow_table(&self) -> u8 {
        Self::SOFTWARE_TABLE
    }

    fn flows(&self) -> Vec<FlowMod> {
        vec![
            FlowMod::table_miss(0, vec![Instruction::GotoTable(Self::SOFTWARE_TABLE)]),
            FlowMod::table_miss(Self::SOFTWARE_TABLE, to_controller()),
        ]
    }
}

static DEFAULT: DefaultTableMiss = DefaultTableMiss;
static PROCURVE: ProCurveTableMiss = ProCurveTableMiss;

struct Quirk {
    /// Lowercase manufacturer names that must match exactly.
    names: &'static [&'static str],
    /// Lowercase substrings matched against manufacturer and hardware.
    markers: &'static [&'static str],
    strategy: &'static dyn TableMissStrategy,
}

impl Quirk {
    fn matches(&self, manufacturer: &str, hardware: &str) -> bool {
        self.names.contains(&manufacturer)
            || self
                .markers
                .iter()
                .any(|m| manufacturer.contains(m) || hardware.contains(m))
    }
}

static QUIRKS: &[Quirk] = &[Quirk {
    names: &["hp", "hp networking"],
    markers: &["hewlett", "aruba", "procurve"],
    strategy: &PROCURVE,
}];

/// The single-table strategy every 1.0 switch uses.
pub fn default_strategy() -> &'static dyn TableMissStrategy {
    &DEFAULT
}

/// Pick a strategy from a switch description.
pub fn select(description: &Description) -> &'static dyn TableMissStrategy {
    let manufacturer = description.manufacturer.trim().to_ascii_lowercase();
    let hardware = description.hardware.to_ascii_lowercase();
    QUIRKS
        .iter()
        .find(|quirk| quirk.matches(&manufacturer, &hardware))
        .map(|quirk| quirk.strategy)
        .unwrap_or(&DEFAULT)
}

/// Messages installing `strategy`: each flow followed by a barrier.
pub fn install(strategy: &dyn TableMissStrategy) -> Vec<Message> {
    strategy
        .flows()
        .into_iter()
        .flat_map(|flow| [Message::FlowMod(flow), Message::BarrierRequest])
        .collect()
}
