// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared controller state and the routing of switch events into it.
//!
//! [`Network`] owns the device registry, the topology graph, the host table
//! and the listener chain. Every connection's [`Session`] calls into it; it
//! decides what a PACKET_IN or PORT_STATUS means for the graph and the
//! hosts, then tells the listeners once no lock is held.

use crate::admin::{always_active, ActivePredicate};
use crate::config::ControllerConfig;
use crate::device::{Device, DeviceRegistry, Dpid};
use crate::discovery::Probe;
use crate::event::{Event, EventListener, Finder, Listeners};
use crate::host::{HostTracker, Learn};
use crate::packet::EthernetFrame;
use crate::port::PortTransition;
use crate::session::Session;
use crate::topology::{link_weight, Edge, Point, Topology, TopologyChange};
use crate::transceiver::{SessionError, Transceiver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use trellis_openflow::{Features, Message, PacketIn, PacketOut, PortDesc, PortReason, PortStatus};

/// Controller-wide state, shared by every session.
pub struct Network {
    config: Arc<ControllerConfig>,
    registry: Arc<DeviceRegistry>,
    topology: Arc<Topology>,
    hosts: Arc<HostTracker>,
    listeners: Listeners,
    active: ActivePredicate,
    shutdown: CancellationToken,
    next_conn_id: AtomicU64,
}

impl Network {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(DeviceRegistry::new()),
            topology: Arc::new(Topology::new()),
            hosts: Arc::new(HostTracker::new()),
            listeners: Listeners::new(),
            active: always_active(),
            shutdown: CancellationToken::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Gate administrative operations on `predicate`.
    pub fn with_active_predicate(mut self, predicate: ActivePredicate) -> Self {
        self.active = predicate;
        self
    }

    pub fn register_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.register(listener);
    }

    pub fn finder(&self) -> Finder {
        Finder::new(
            self.registry.clone(),
            self.topology.clone(),
            self.hosts.clone(),
        )
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn hosts(&self) -> &HostTracker {
        &self.hosts
    }

    pub fn is_active(&self) -> bool {
        (self.active)()
    }

    /// Cancel every session and background task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Negotiate and serve one switch connection until it closes.
    pub async fn serve<S>(self: &Arc<Self>, stream: S, peer: String) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        let (conn, reader) =
            Transceiver::negotiate(stream, id, peer, self.config.clone(), cancel).await?;
        let session = Arc::new(Session::new(self.clone()));
        conn.run(reader, session).await
    }

    pub(crate) async fn emit(&self, event: Event) {
        self.listeners.emit(&event, &self.finder()).await;
    }

    /// Forget hosts at newly disabled points, then tell listeners.
    pub(crate) async fn notify_topology_change(&self, change: TopologyChange) {
        for point in &change.disabled {
            let purged = self.hosts.forget(*point);
            if !purged.is_empty() {
                debug!(point = %point, hosts = purged.len(), "forgot hosts behind disabled link");
            }
        }
        if change.changed {
            self.emit(Event::TopologyChange).await;
        }
    }

    /// Bind a connection to the device named in its FEATURES_REPLY.
    pub(crate) fn attach(&self, conn: &Arc<Transceiver>, features: &Features) -> Arc<Device> {
        let attached = self.registry.attach(
            features.dpid,
            conn.version(),
            features.auxiliary_id,
            conn.clone(),
        );
        let device = attached.device;

        if attached.created {
            info!(dpid = %Dpid(features.dpid), peer = %conn.peer(), "new device");
        } else if device.version() != conn.version() {
            warn!(
                dpid = %Dpid(features.dpid),
                device = %device.version(),
                connection = %conn.version(),
                "connection version differs from device"
            );
        }
        if let Some(old) = attached.replaced.filter(|old| old.id() != conn.id()) {
            info!(
                dpid = %Dpid(features.dpid),
                auxiliary_id = features.auxiliary_id,
                old = %old.peer(),
                new = %conn.peer(),
                "replacing connection"
            );
            old.close();
        }
        debug!(
            dpid = %Dpid(features.dpid),
            auxiliary_id = features.auxiliary_id,
            connections = device.connection_count(),
            "connection attached"
        );
        device
    }

    /// Bring the device up once everything about it is known.
    pub(crate) async fn maybe_ready(self: &Arc<Self>, device: &Arc<Device>) {
        if !device.try_mark_ready() {
            return;
        }
        info!(
            dpid = %Dpid(device.dpid()),
            version = %device.version(),
            table = device.flow_table(),
            strategy = device.strategy().name(),
            "device ready"
        );
        let change = self.topology.add_vertex(device.dpid());
        self.emit(Event::DeviceUp(device.clone())).await;
        self.notify_topology_change(change).await;
        self.start_discovery(device);
    }

    /// A connection closed. Retire the device with its last connection.
    pub(crate) async fn detach(&self, device: &Arc<Device>, conn: &Transceiver) {
        if !self.registry.detach(device, conn.id()) {
            debug!(
                dpid = %Dpid(device.dpid()),
                remaining = device.connection_count(),
                "connection detached"
            );
            return;
        }

        device.stop_discovery();
        let change = self.topology.remove_vertex(device.dpid());
        let forgotten = self.hosts.forget_device(device.dpid());
        info!(
            dpid = %Dpid(device.dpid()),
            hosts = forgotten.len(),
            "device removed"
        );
        if device.is_ready() {
            self.emit(Event::DeviceDown(device.clone())).await;
        }
        self.notify_topology_change(change).await;
    }

    pub(crate) async fn port_status(&self, device: &Arc<Device>, status: PortStatus) {
        let number = status.port.number;
        let transition = match status.reason {
            PortReason::Delete => match device.remove_port(number) {
                Some(old) if old.is_up() => PortTransition::Down,
                _ => PortTransition::Unchanged,
            },
            PortReason::Add | PortReason::Modify => {
                device.update_port(status.port.clone(), Instant::now())
            }
        };
        debug!(
            dpid = %Dpid(device.dpid()),
            port = number,
            reason = ?status.reason,
            ?transition,
            "port status"
        );
        if !device.is_ready() {
            return;
        }

        match transition {
            PortTransition::Unchanged => {}
            PortTransition::Down => {
                let point = Point::new(device.dpid(), number);
                let change = self.topology.remove_point(point);
                self.hosts.forget(point);
                self.emit(Event::PortDown {
                    device: device.clone(),
                    port: number,
                })
                .await;
                self.notify_topology_change(change).await;
            }
            PortTransition::Up => {
                self.emit(Event::PortUp {
                    device: device.clone(),
                    port: number,
                })
                .await;
                if status.port.is_physical() {
                    if let Err(e) = self.send_probe(device, &status.port).await {
                        debug!(dpid = %Dpid(device.dpid()), port = number, "probe failed: {}", e);
                    }
                }
            }
        }
    }

    pub(crate) async fn packet_in(&self, device: &Arc<Device>, packet_in: PacketIn) {
        if !device.is_ready() {
            trace!(dpid = %Dpid(device.dpid()), "packet-in before device ready");
            return;
        }
        let ingress = Point::new(device.dpid(), packet_in.in_port);
        let eth = match EthernetFrame::parse(&packet_in.data) {
            Ok(eth) => eth,
            Err(e) => {
                debug!(point = %ingress, "unparseable frame: {}", e);
                return;
            }
        };

        if eth.is_lldp() {
            match Probe::decode_lldp(eth.payload) {
                Ok(Some(probe)) => self.link_discovered(device, probe, ingress).await,
                Ok(None) => trace!(point = %ingress, "dropping foreign LLDP"),
                Err(e) => debug!(point = %ingress, "malformed LLDP: {}", e),
            }
            return;
        }

        let src = eth.src;
        if self.topology.is_edge(ingress) {
            if !self.topology.is_enabled(ingress) {
                trace!(point = %ingress, "dropping frame on disabled link");
                return;
            }
        } else if src.is_unicast()
            && device.port_settled(packet_in.in_port, Instant::now(), self.config.port_settle())
        {
            match self.hosts.learn(src, ingress) {
                Learn::New => debug!(host = %src, point = %ingress, "learned host"),
                Learn::Moved(from) => {
                    info!(host = %src, from = %from, to = %ingress, "host moved")
                }
                Learn::Unchanged => {}
            }
        }

        self.emit(Event::PacketIn {
            device: device.clone(),
            port: packet_in.in_port,
            frame: packet_in.data,
        })
        .await;
    }

    /// A probe sent by `probe.dpid` arrived at `ingress`.
    pub(crate) async fn link_discovered(&self, device: &Arc<Device>, probe: Probe, ingress: Point) {
        let neighbor = match self.registry.get(probe.dpid) {
            Some(neighbor) if neighbor.is_ready() => neighbor,
            _ => {
                debug!(from = %probe.point(), to = %ingress, "probe from unknown device");
                return;
            }
        };
        let Some(remote) = neighbor.port(probe.port) else {
            debug!(from = %probe.point(), to = %ingress, "probe from unknown port");
            return;
        };
        let local_speed = device
            .port(ingress.port)
            .map(|p| p.speed_mbps())
            .unwrap_or_default();
        let weight = link_weight(local_speed.min(remote.speed_mbps()));
        let edge = Edge::new(probe.point(), ingress, weight);

        match self.topology.add_edge(edge) {
            Ok(change) => {
                if change.changed {
                    info!(link = %edge, "link discovered");
                    self.hosts.forget(edge.a);
                    self.hosts.forget(edge.b);
                }
                self.notify_topology_change(change).await;
            }
            Err(e) => debug!(link = %edge, "ignoring link: {}", e),
        }
    }

    /// Expire links no probe has refreshed within `link_timeout`.
    pub async fn sweep_links(&self) -> usize {
        let (removed, change) = self.topology.remove_stale(self.config.link_timeout());
        for edge in &removed {
            info!(link = %edge, "link expired");
        }
        self.notify_topology_change(change).await;
        removed.len()
    }

    /// Send one discovery probe out of `port`.
    pub(crate) async fn send_probe(
        &self,
        device: &Device,
        port: &PortDesc,
    ) -> Result<(), SessionError> {
        let frame = Probe::new(device.dpid(), port.number).encode(port.hw_addr);
        device
            .send(Message::PacketOut(PacketOut::emit(port.number, frame)))
            .await?;
        trace!(dpid = %Dpid(device.dpid()), port = port.number, "probe sent");
        Ok(())
    }

    async fn probe_device(&self, device: &Device) -> Result<(), SessionError> {
        if device.main_connection().is_none() {
            trace!(dpid = %Dpid(device.dpid()), "no main connection, skipping probes");
            return Ok(());
        }
        for port in device.ports() {
            if port.is_physical() && port.is_up() {
                self.send_probe(device, &port).await?;
            }
        }
        Ok(())
    }

    /// Probe every up port now and then every `discovery_interval`.
    ///
    /// Runs until the device is removed. A failed round is retried on the
    /// next tick, so probing resumes when the main connection comes back.
    fn start_discovery(self: &Arc<Self>, device: &Arc<Device>) {
        let token = self.shutdown.child_token();
        device.set_discovery(token.clone());

        let network = Arc::clone(self);
        let device = Arc::clone(device);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(network.config.discovery_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = network.probe_device(&device).await {
                            debug!(dpid = %Dpid(device.dpid()), "discovery round failed: {}", e);
                        }
                    }
                }
            }
            trace!(dpid = %Dpid(device.dpid()), "discovery task exited");
        });
    }
}
