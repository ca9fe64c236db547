// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Northbound events for forwarding applications.
//!
//! Applications implement [`EventListener`] and register it on the
//! [`Network`](crate::network::Network). Listeners are called in
//! registration order; returning an error stops that event from reaching
//! the listeners after it. Callbacks never run with a controller lock held.

use crate::device::{Device, DeviceRegistry, Dpid};
use crate::host::HostTracker;
use crate::topology::{Edge, Hop, Point, Topology};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use trellis_openflow::MacAddr;

/// Listener error types.
#[derive(Debug, Error)]
pub enum EventError {
    /// The listener fully handled the event.
    #[error("event consumed by {0}")]
    Consumed(&'static str),

    #[error("listener failed: {0}")]
    Failed(String),
}

/// Read-only view of controller state handed to listeners.
#[derive(Clone)]
pub struct Finder {
    registry: Arc<DeviceRegistry>,
    topology: Arc<Topology>,
    hosts: Arc<HostTracker>,
}

impl Finder {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        topology: Arc<Topology>,
        hosts: Arc<HostTracker>,
    ) -> Self {
        Self {
            registry,
            topology,
            hosts,
        }
    }

    pub fn device(&self, dpid: u64) -> Option<Arc<Device>> {
        self.registry.get(dpid)
    }

    /// Ready devices, ordered by dpid.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.registry.ready()
    }

    /// Loop-free path between two switches.
    pub fn path(&self, src: u64, dst: u64) -> Vec<Hop> {
        self.topology.find_path(src, dst)
    }

    pub fn host_location(&self, addr: MacAddr) -> Option<Point> {
        self.hosts.lookup(addr)
    }

    /// Whether `point` faces another switch.
    pub fn is_edge(&self, point: Point) -> bool {
        self.topology.is_edge(point)
    }

    pub fn is_enabled(&self, point: Point) -> bool {
        self.topology.is_enabled(point)
    }

    pub fn links(&self) -> Vec<(Edge, bool)> {
        self.topology.edges()
    }
}

/// Application callbacks. Every method defaults to doing nothing.
#[async_trait]
pub trait EventListener: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_packet_in(
        &self,
        _finder: &Finder,
        _device: &Arc<Device>,
        _port: u32,
        _frame: &[u8],
    ) -> Result<(), EventError> {
        Ok(())
    }

    async fn on_port_up(
        &self,
        _finder: &Finder,
        _device: &Arc<Device>,
        _port: u32,
    ) -> Result<(), EventError> {
        Ok(())
    }

    async fn on_port_down(
        &self,
        _finder: &Finder,
        _device: &Arc<Device>,
        _port: u32,
    ) -> Result<(), EventError> {
        Ok(())
    }

    async fn on_device_up(&self, _finder: &Finder, _device: &Arc<Device>) -> Result<(), EventError> {
        Ok(())
    }

    async fn on_device_down(
        &self,
        _finder: &Finder,
        _device: &Arc<Device>,
    ) -> Result<(), EventError> {
        Ok(())
    }

    async fn on_topology_change(&self, _finder: &Finder) -> Result<(), EventError> {
        Ok(())
    }
}

/// A controller event, as delivered to listeners.
#[derive(Debug, Clone)]
pub enum Event {
    PacketIn {
        device: Arc<Device>,
        port: u32,
        frame: Vec<u8>,
    },
    PortUp {
        device: Arc<Device>,
        port: u32,
    },
    PortDown {
        device: Arc<Device>,
        port: u32,
    },
    DeviceUp(Arc<Device>),
    DeviceDown(Arc<Device>),
    TopologyChange,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PacketIn { .. } => "packet_in",
            Self::PortUp { .. } => "port_up",
            Self::PortDown { .. } => "port_down",
            Self::DeviceUp(_) => "device_up",
            Self::DeviceDown(_) => "device_down",
            Self::TopologyChange => "topology_change",
        }
    }

    async fn deliver(&self, listener: &dyn EventListener, finder: &Finder) -> Result<(), EventError> {
        match self {
            Self::PacketIn {
                device,
                port,
                frame,
            } => listener.on_packet_in(finder, device, *port, frame).await,
            Self::PortUp { device, port } => listener.on_port_up(finder, device, *port).await,
            Self::PortDown { device, port } => listener.on_port_down(finder, device, *port).await,
            Self::DeviceUp(device) => listener.on_device_up(finder, device).await,
            Self::DeviceDown(device) => listener.on_device_down(finder, device).await,
            Self::TopologyChange => listener.on_topology_change(finder).await,
        }
    }
}

/// Ordered listener chain.
#[derive(Default)]
pub struct Listeners {
    chain: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn EventListener>) {
        info!(listener = listener.name(), "registered event listener");
        self.chain.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.chain.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.read().is_empty()
    }

    /// Deliver `event` down the chain. Returns how many listeners saw it.
    pub async fn emit(&self, event: &Event, finder: &Finder) -> usize {
        let chain: Vec<_> = self.chain.read().clone();
        let mut delivered = 0;
        for listener in chain {
            delivered += 1;
            match event.deliver(listener.as_ref(), finder).await {
                Ok(()) => {}
                Err(EventError::Consumed(by)) => {
                    debug!(event = event.name(), listener = by, "event consumed");
                    break;
                }
                Err(e) => {
                    warn!(event = event.name(), listener = listener.name(), "{}", e);
                    break;
                }
            }
        }
        delivered
    }
}

/// Logs device, port and topology lifecycle events.
#[derive(Debug, Default)]
pub struct LogListener;

#[async_trait]
impl EventListener for LogListener {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn on_port_up(
        &self,
        _finder: &Finder,
        device: &Arc<Device>,
        port: u32,
    ) -> Result<(), EventError> {
        info!(dpid = %Dpid(device.dpid()), port, "port up");
        Ok(())
    }

    async fn on_port_down(
        &self,
        _finder: &Finder,
        device: &Arc<Device>,
        port: u32,
    ) -> Result<(), EventError> {
        info!(dpid = %Dpid(device.dpid()), port, "port down");
        Ok(())
    }

    async fn on_device_up(&self, _finder: &Finder, device: &Arc<Device>) -> Result<(), EventError> {
        let description = device.description().unwrap_or_default();
        info!(
            dpid = %Dpid(device.dpid()),
            version = %device.version(),
            manufacturer = %description.manufacturer,
            hardware = %description.hardware,
            ports = device.ports().len(),
            "device up"
        );
        Ok(())
    }

    async fn on_device_down(
        &self,
        _finder: &Finder,
        device: &Arc<Device>,
    ) -> Result<(), EventError> {
        info!(dpid = %Dpid(device.dpid()), "device down");
        Ok(())
    }

    async fn on_topology_change(&self, finder: &Finder) -> Result<(), EventError> {
        let links = finder.links();
        let enabled = links.iter().filter(|(_, on)| *on).count();
        info!(
            devices = finder.devices().len(),
            links = links.len(),
            enabled,
            "topology changed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
        result: fn() -> Result<(), EventError>,
    }

    #[async_trait]
    impl EventListener for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn on_topology_change(&self, _finder: &Finder) -> Result<(), EventError> {
            self.seen.lock().push(self.name);
            (self.result)()
        }
    }

    fn finder() -> Finder {
        Finder::new(
            Arc::new(DeviceRegistry::new()),
            Arc::new(Topology::new()),
            Arc::new(HostTracker::new()),
        )
    }

    fn chain(results: &[(&'static str, fn() -> Result<(), EventError>)]) -> (Listeners, Arc<Mutex<Vec<&'static str>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listeners = Listeners::new();
        for &(name, result) in results {
            listeners.register(Arc::new(Recorder {
                name,
                seen: seen.clone(),
                result,
            }));
        }
        (listeners, seen)
    }

    #[tokio::test]
    async fn test_emit_in_registration_order() {
        let (listeners, seen) = chain(&[("a", || Ok(())), ("b", || Ok(()))]);
        assert_eq!(listeners.emit(&Event::TopologyChange, &finder()).await, 2);
        assert_eq!(*seen.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_error_stops_propagation() {
        let (listeners, seen) = chain(&[
            ("a", || Err(EventError::Consumed("a"))),
            ("b", || Ok(())),
        ]);
        assert_eq!(listeners.emit(&Event::TopologyChange, &finder()).await, 1);
        assert_eq!(*seen.lock(), vec!["a"]);

        let (listeners, seen) = chain(&[
            ("a", || Ok(())),
            ("b", || Err(EventError::Failed("boom".into()))),
            ("c", || Ok(())),
        ]);
        assert_eq!(listeners.emit(&Event::TopologyChange, &finder()).await, 2);
        assert_eq!(*seen.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_defaults_ignore_events() {
        let listeners = Listeners::new();
        listeners.register(Arc::new(LogListener));
        let device = Arc::new(Device::new(1, trellis_openflow::Version::V1_3));
        let event = Event::PacketIn {
            device,
            port: 1,
            frame: vec![0; 14],
        };
        assert_eq!(listeners.emit(&event, &finder()).await, 1);
    }

    #[test]
    fn test_finder_queries() {
        let finder = finder();
        assert!(finder.devices().is_empty());
        assert!(finder.path(1, 2).is_empty());
        assert_eq!(finder.host_location(MacAddr::BROADCAST), None);
        assert!(!finder.is_edge(Point::new(1, 1)));
    }
}
