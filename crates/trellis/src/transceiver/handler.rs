// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-version protocol handlers.
//!
//! The handler is chosen once, from the switch HELLO, and fixes the codec,
//! handshake and table-miss policy for the connection's lifetime.

use crate::quirks::{self, TableMissStrategy};
use trellis_openflow::{codec_for, Codec, Description, FlowMod, Message, SwitchConfig, Version};

/// Version-specific behaviour of a connection.
pub trait Handler: Send + Sync {
    fn version(&self) -> Version;

    fn codec(&self) -> &'static dyn Codec {
        codec_for(self.version())
    }

    /// Messages sent right after negotiation, in order.
    fn handshake(&self) -> Vec<Message>;

    /// Whether FEATURES_REPLY carries the port table.
    fn ports_in_features(&self) -> bool;

    /// Table-miss strategy for a switch with this description.
    fn table_miss(&self, description: &Description) -> &'static dyn TableMissStrategy;
}

fn common_handshake() -> Vec<Message> {
    vec![
        Message::Hello,
        Message::SetConfig(SwitchConfig::default()),
        Message::FeaturesRequest,
        Message::FlowMod(FlowMod::delete_all()),
        Message::BarrierRequest,
        Message::DescriptionRequest,
        Message::BarrierRequest,
    ]
}

/// OpenFlow 1.0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Of10Handler;

impl Handler for Of10Handler {
    fn version(&self) -> Version {
        Version::V1_0
    }

    fn handshake(&self) -> Vec<Message> {
        let mut messages = common_handshake();
        messages.push(Message::GetConfigRequest);
        messages
    }

    fn ports_in_features(&self) -> bool {
        true
    }

    // A single flow table, so vendor quirks never apply.
    fn table_miss(&self, _description: &Description) -> &'static dyn TableMissStrategy {
        quirks::default_strategy()
    }
}

/// OpenFlow 1.3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Of13Handler;

impl Handler for Of13Handler {
    fn version(&self) -> Version {
        Version::V1_3
    }

    fn handshake(&self) -> Vec<Message> {
        let mut messages = common_handshake();
        messages.push(Message::PortDescriptionRequest);
        messages
    }

    fn ports_in_features(&self) -> bool {
        false
    }

    fn table_miss(&self, description: &Description) -> &'static dyn TableMissStrategy {
        quirks::select(description)
    }
}

pub fn handler_for(version: Version) -> Box<dyn Handler> {
    match version {
        Version::V1_0 => Box::new(Of10Handler),
        Version::V1_3 => Box::new(Of13Handler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(messages: &[Message]) -> Vec<&'static str> {
        messages.iter().map(Message::kind).collect()
    }

    #[test]
    fn test_of13_handshake_order() {
        assert_eq!(
            kinds(&Of13Handler.handshake()),
            [
                "HELLO",
                "SET_CONFIG",
                "FEATURES_REQUEST",
                "FLOW_MOD",
                "BARRIER_REQUEST",
                "DESCRIPTION_REQUEST",
                "BARRIER_REQUEST",
                "PORT_DESCRIPTION_REQUEST",
            ]
        );
    }

    #[test]
    fn test_of10_handshake_ends_with_get_config() {
        let handshake = Of10Handler.handshake();
        assert_eq!(handshake.len(), 8);
        assert_eq!(handshake.last(), Some(&Message::GetConfigRequest));
        assert!(!handshake.contains(&Message::PortDescriptionRequest));
    }

    #[test]
    fn test_of10_ignores_vendor_quirks() {
        let hp = Description {
            manufacturer: "HP".into(),
            ..Default::default()
        };
        assert_eq!(Of10Handler.table_miss(&hp).name(), "default");
        assert_eq!(Of13Handler.table_miss(&hp).name(), "procurve");
    }

    #[test]
    fn test_handler_for_version() {
        assert_eq!(handler_for(Version::V1_0).version(), Version::V1_0);
        assert!(handler_for(Version::V1_0).ports_in_features());
        assert_eq!(handler_for(Version::V1_3).codec().version(), Version::V1_3);
    }
}
