// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Trellis OpenFlow controller
//!
//! Accepts switch connections over TCP, negotiates OpenFlow 1.0 or 1.3,
//! discovers the links between switches and keeps a loop-free spanning
//! forest over them so forwarding applications can install paths that
//! never loop.
//!
//! # Features
//!
//! - **Session engine**: version negotiation, ordered handshake, vendor
//!   table-miss quirks, echo keepalive with latency measurement
//! - **Topology**: LLDP link discovery, minimum spanning forest with
//!   802.1D link weights, shortest loop-free paths
//! - **Hosts**: MAC learning with move detection and a port settling window
//! - **Northbound events**: async listeners with a read-only [`Finder`]
//!
//! # Quick Start
//!
//! ```bash
//! # Listen on the default port (6653)
//! trellis
//!
//! # Using a config file
//! trellis --config trellis.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! bind_address = "0.0.0.0"
//! port = 6653
//! echo_interval_secs = 30
//! discovery_interval_secs = 5
//! link_timeout_secs = 20
//! port_settle_ms = 5000
//! ```

pub mod admin;
pub mod config;
pub mod controller;
pub mod device;
pub mod discovery;
pub mod event;
pub mod host;
pub mod network;
pub mod packet;
pub mod port;
pub mod quirks;
pub mod session;
pub mod topology;
pub mod transceiver;
pub mod transport;

pub use admin::{always_active, ActivePredicate, AdminError};
pub use config::{ConfigError, ControllerConfig};
pub use controller::{Controller, ControllerError};
pub use device::{Device, DeviceRegistry, Dpid};
pub use event::{Event, EventError, EventListener, Finder, LogListener};
pub use host::{HostTracker, Learn};
pub use network::Network;
pub use topology::{link_weight, Edge, Hop, Point, Topology, TopologyChange, TopologyError};
pub use transceiver::{SessionError, SessionState, Transceiver};
pub use transport::TransportError;

pub use trellis_openflow as openflow;
