// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Administrative operations.
//!
//! These act on every ready switch at once. In a replicated deployment only
//! the active controller may run them; the [`ActivePredicate`] supplied to
//! [`Network::with_active_predicate`] decides which one that is.

use crate::device::Dpid;
use crate::event::Event;
use crate::network::Network;
use crate::packet::gratuitous_arp;
use crate::quirks;
use crate::topology::Point;
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use trellis_openflow::{FlowMod, Match, MacAddr, Message, PacketOut};

/// Whether this controller instance is the active one.
pub type ActivePredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Predicate for a standalone controller.
pub fn always_active() -> ActivePredicate {
    Arc::new(|| true)
}

/// Admin error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("controller is not active")]
    Inactive,
}

impl Network {
    fn ensure_active(&self) -> Result<(), AdminError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(AdminError::Inactive)
        }
    }

    /// Wipe every flow on every ready switch and reinstall table-miss entries.
    ///
    /// Returns the number of switches reached.
    pub async fn remove_all_flows(&self) -> Result<usize, AdminError> {
        self.ensure_active()?;

        let mut reached = 0;
        for device in self.registry().ready() {
            let mut messages = vec![
                Message::FlowMod(FlowMod::delete_all()),
                Message::BarrierRequest,
            ];
            messages.extend(quirks::install(device.strategy()));
            match device.send_all(messages).await {
                Ok(()) => reached += 1,
                Err(e) => warn!(dpid = %Dpid(device.dpid()), "flow wipe failed: {}", e),
            }
        }
        info!(devices = reached, "removed all flows");
        self.emit(Event::TopologyChange).await;
        Ok(reached)
    }

    /// Delete the flows matching `mac` as source or destination everywhere,
    /// and forget the host.
    pub async fn remove_flows_by_mac(&self, mac: MacAddr) -> Result<usize, AdminError> {
        self.ensure_active()?;

        let mut reached = 0;
        for device in self.registry().ready() {
            let table = device.flow_table();
            let messages = vec![
                Message::FlowMod(FlowMod::delete(table, Match::any().with_eth_dst(mac))),
                Message::FlowMod(FlowMod::delete(table, Match::any().with_eth_src(mac))),
            ];
            match device.send_all(messages).await {
                Ok(()) => reached += 1,
                Err(e) => warn!(dpid = %Dpid(device.dpid()), host = %mac, "flow removal failed: {}", e),
            }
        }
        let location = self.hosts().forget_addr(mac);
        info!(host = %mac, devices = reached, ?location, "removed flows for host");
        Ok(reached)
    }

    /// Flood a gratuitous ARP for `ip` at `mac` out of every host-facing port.
    ///
    /// Returns the number of frames sent.
    pub async fn announce(&self, ip: Ipv4Addr, mac: MacAddr) -> Result<usize, AdminError> {
        self.ensure_active()?;

        let frame = gratuitous_arp(ip, mac);
        let mut sent = 0;
        for device in self.registry().ready() {
            let ports: Vec<u32> = device
                .ports()
                .into_iter()
                .filter(|p| p.is_physical() && p.is_up())
                .map(|p| p.number)
                .filter(|&n| !self.topology().is_edge(Point::new(device.dpid(), n)))
                .collect();
            for port in ports {
                let packet_out = PacketOut::emit(port, frame.clone());
                if let Err(e) = device.send(Message::PacketOut(packet_out)).await {
                    warn!(dpid = %Dpid(device.dpid()), port, "announce failed: {}", e);
                    break;
                }
                sent += 1;
            }
        }
        info!(%ip, %mac, frames = sent, "announced address binding");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn standby() -> (Network, Arc<AtomicBool>) {
        let active = Arc::new(AtomicBool::new(false));
        let flag = active.clone();
        let network = Network::new(ControllerConfig::default())
            .with_active_predicate(Arc::new(move || flag.load(Ordering::SeqCst)));
        (network, active)
    }

    #[tokio::test]
    async fn test_inactive_controller_refuses() {
        let (network, _) = standby();
        let mac = MacAddr([0x02, 0, 0, 0, 0, 1]);
        network.hosts().learn(mac, Point::new(1, 1));

        assert_eq!(network.remove_all_flows().await, Err(AdminError::Inactive));
        assert_eq!(network.remove_flows_by_mac(mac).await, Err(AdminError::Inactive));
        assert_eq!(
            network.announce(Ipv4Addr::new(10, 0, 0, 1), mac).await,
            Err(AdminError::Inactive)
        );
        // no side effects
        assert_eq!(network.hosts().lookup(mac), Some(Point::new(1, 1)));
    }

    #[tokio::test]
    async fn test_active_without_devices() {
        let (network, active) = standby();
        active.store(true, Ordering::SeqCst);
        let mac = MacAddr([0x02, 0, 0, 0, 0, 1]);
        network.hosts().learn(mac, Point::new(1, 1));

        assert_eq!(network.remove_all_flows().await, Ok(0));
        assert_eq!(network.remove_flows_by_mac(mac).await, Ok(0));
        assert_eq!(network.hosts().lookup(mac), None);
        assert_eq!(network.announce(Ipv4Addr::new(10, 0, 0, 1), mac).await, Ok(0));
    }
}
