// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection glue between a [`Transceiver`] and the [`Network`].

use crate::device::{Device, Dpid, MAIN_CONNECTION};
use crate::network::Network;
use crate::quirks;
use crate::transceiver::{MessageHandler, SessionError, Transceiver};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};
use trellis_openflow::{Description, Features, PacketIn, PortDesc, PortStatus};

/// Handles the messages of one switch connection.
///
/// Replies that arrive before FEATURES_REPLY are held until the device is
/// known.
pub struct Session {
    network: Arc<Network>,
    device: Mutex<Option<Arc<Device>>>,
    pending_description: Mutex<Option<Description>>,
    pending_ports: Mutex<Option<Vec<PortDesc>>>,
}

impl Session {
    pub fn new(network: Arc<Network>) -> Self {
        Self {
            network,
            device: Mutex::new(None),
            pending_description: Mutex::new(None),
            pending_ports: Mutex::new(None),
        }
    }

    pub fn device(&self) -> Option<Arc<Device>> {
        self.device.lock().clone()
    }

    /// Record the description and install the matching table-miss flows.
    async fn apply_description(
        &self,
        conn: &Arc<Transceiver>,
        device: &Arc<Device>,
        description: Description,
    ) -> Result<(), SessionError> {
        let strategy = conn.handler().table_miss(&description);
        info!(
            dpid = %Dpid(device.dpid()),
            manufacturer = %description.manufacturer,
            hardware = %description.hardware,
            software = %description.software,
            strategy = strategy.name(),
            "switch description"
        );
        device.set_description(description, strategy);
        conn.send_all(quirks::install(strategy)).await
    }
}

#[async_trait]
impl MessageHandler for Session {
    async fn on_features(
        &self,
        conn: &Arc<Transceiver>,
        features: Features,
    ) -> Result<(), SessionError> {
        conn.set_dpid(features.dpid);
        let device = self.network.attach(conn, &features);
        *self.device.lock() = Some(device.clone());

        if features.auxiliary_id == MAIN_CONNECTION {
            if conn.handler().ports_in_features() {
                device.set_ports(features.ports.clone(), Instant::now());
            }
            device.set_features(features);
        }

        let description = self.pending_description.lock().take();
        if let Some(description) = description {
            self.apply_description(conn, &device, description).await?;
        }
        let ports = self.pending_ports.lock().take();
        if let Some(ports) = ports {
            device.set_ports(ports, Instant::now());
        }

        self.network.maybe_ready(&device).await;
        Ok(())
    }

    async fn on_description(
        &self,
        conn: &Arc<Transceiver>,
        description: Description,
    ) -> Result<(), SessionError> {
        let Some(device) = self.device() else {
            debug!(peer = %conn.peer(), "holding description until features arrive");
            *self.pending_description.lock() = Some(description);
            return Ok(());
        };
        self.apply_description(conn, &device, description).await?;
        self.network.maybe_ready(&device).await;
        Ok(())
    }

    async fn on_ports(
        &self,
        conn: &Arc<Transceiver>,
        ports: Vec<PortDesc>,
    ) -> Result<(), SessionError> {
        let Some(device) = self.device() else {
            debug!(peer = %conn.peer(), "holding port table until features arrive");
            self.pending_ports
                .lock()
                .get_or_insert_with(Vec::new)
                .extend(ports);
            return Ok(());
        };
        debug!(dpid = %Dpid(device.dpid()), ports = ports.len(), "port table");
        device.set_ports(ports, Instant::now());
        self.network.maybe_ready(&device).await;
        Ok(())
    }

    async fn on_port_status(
        &self,
        conn: &Arc<Transceiver>,
        status: PortStatus,
    ) -> Result<(), SessionError> {
        match self.device() {
            Some(device) => self.network.port_status(&device, status).await,
            None => trace!(peer = %conn.peer(), "port status before features"),
        }
        Ok(())
    }

    async fn on_packet_in(
        &self,
        conn: &Arc<Transceiver>,
        packet_in: PacketIn,
    ) -> Result<(), SessionError> {
        match self.device() {
            Some(device) => self.network.packet_in(&device, packet_in).await,
            None => trace!(peer = %conn.peer(), "packet-in before features"),
        }
        Ok(())
    }

    async fn on_close(&self, conn: &Arc<Transceiver>) {
        let device = self.device.lock().take();
        if let Some(device) = device {
            self.network.detach(&device, conn).await;
        }
    }
}
