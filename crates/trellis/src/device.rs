// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Switch (datapath) model and the device registry.

use crate::port::{Port, PortTransition};
use crate::quirks::{self, TableMissStrategy};
use crate::transceiver::{SessionError, Transceiver};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use trellis_openflow::{Description, Features, Message, PortDesc, Version};

/// Auxiliary id of the main connection.
pub const MAIN_CONNECTION: u8 = 0;

/// Datapath id formatted as 16 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dpid(pub u64);

impl fmt::Display for Dpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

struct DeviceState {
    features: Option<Features>,
    description: Option<Description>,
    ports: BTreeMap<u32, Port>,
    ports_known: bool,
    strategy: &'static dyn TableMissStrategy,
}

/// One switch, identified by its datapath id.
pub struct Device {
    dpid: u64,
    version: Version,
    state: RwLock<DeviceState>,
    connections: Mutex<BTreeMap<u8, Arc<Transceiver>>>,
    discovery: Mutex<Option<CancellationToken>>,
    ready: AtomicBool,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("dpid", &Dpid(self.dpid))
            .field("version", &self.version)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Device {
    pub fn new(dpid: u64, version: Version) -> Self {
        Self {
            dpid,
            version,
            state: RwLock::new(DeviceState {
                features: None,
                description: None,
                ports: BTreeMap::new(),
                ports_known: false,
                strategy: quirks::default_strategy(),
            }),
            connections: Mutex::new(BTreeMap::new()),
            discovery: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    pub fn dpid(&self) -> u64 {
        self.dpid
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Attach a connection; returns the one it replaces, if any.
    pub fn attach(&self, auxiliary_id: u8, conn: Arc<Transceiver>) -> Option<Arc<Transceiver>> {
        self.connections.lock().insert(auxiliary_id, conn)
    }

    /// Detach connection `conn_id`. Returns true when no connection remains.
    ///
    /// A connection that was already replaced leaves the table untouched.
    pub fn detach(&self, conn_id: u64) -> bool {
        let mut connections = self.connections.lock();
        connections.retain(|_, conn| conn.id() != conn_id);
        connections.is_empty()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn main_connection(&self) -> Option<Arc<Transceiver>> {
        self.connections.lock().get(&MAIN_CONNECTION).cloned()
    }

    /// Send on the main connection.
    pub async fn send(&self, message: Message) -> Result<u32, SessionError> {
        let conn = self.main_connection().ok_or(SessionError::Closed)?;
        conn.send(message).await
    }

    /// Send several messages, in order, on the main connection.
    pub async fn send_all(&self, messages: Vec<Message>) -> Result<(), SessionError> {
        let conn = self.main_connection().ok_or(SessionError::Closed)?;
        conn.send_all(messages).await
    }

    pub fn set_features(&self, features: Features) {
        self.state.write().features = Some(features);
    }

    pub fn features(&self) -> Option<Features> {
        self.state.read().features.clone()
    }

    pub fn set_description(&self, description: Description, strategy: &'static dyn TableMissStrategy) {
        let mut state = self.state.write();
        state.description = Some(description);
        state.strategy = strategy;
    }

    pub fn description(&self) -> Option<Description> {
        self.state.read().description.clone()
    }

    pub fn strategy(&self) -> &'static dyn TableMissStrategy {
        self.state.read().strategy
    }

    /// Table the controller installs its own flows into.
    pub fn flow_table(&self) -> u8 {
        self.strategy().flow_table()
    }

    /// Merge a port table report.
    pub fn set_ports(&self, ports: Vec<PortDesc>, now: Instant) {
        let mut state = self.state.write();
        for desc in ports {
            match state.ports.get_mut(&desc.number) {
                Some(port) => {
                    port.update(desc, now);
                }
                None => {
                    state.ports.insert(desc.number, Port::new(desc, now));
                }
            }
        }
        state.ports_known = true;
    }

    /// Apply a PORT_STATUS add/modify. A previously unknown port counts as down.
    pub fn update_port(&self, desc: PortDesc, now: Instant) -> PortTransition {
        let mut state = self.state.write();
        match state.ports.get_mut(&desc.number) {
            Some(port) => port.update(desc, now),
            None => {
                let up = desc.is_up();
                state.ports.insert(desc.number, Port::new(desc, now));
                if up {
                    PortTransition::Up
                } else {
                    PortTransition::Unchanged
                }
            }
        }
    }

    /// Remove a port; returns its last description.
    pub fn remove_port(&self, number: u32) -> Option<PortDesc> {
        self.state
            .write()
            .ports
            .remove(&number)
            .map(|port| port.desc().clone())
    }

    pub fn port(&self, number: u32) -> Option<PortDesc> {
        self.state.read().ports.get(&number).map(|p| p.desc().clone())
    }

    pub fn ports(&self) -> Vec<PortDesc> {
        self.state
            .read()
            .ports
            .values()
            .map(|p| p.desc().clone())
            .collect()
    }

    /// Up and past the settling window.
    pub fn port_settled(&self, number: u32, now: Instant, window: Duration) -> bool {
        self.state
            .read()
            .ports
            .get(&number)
            .is_some_and(|port| port.is_settled(now, window))
    }

    /// Mark the device ready once features, description and ports are known
    /// and the main connection is attached. True only on the transition.
    pub fn try_mark_ready(&self) -> bool {
        if self.main_connection().is_none() {
            return false;
        }
        let complete = {
            let state = self.state.read();
            state.features.is_some() && state.description.is_some() && state.ports_known
        };
        complete
            && self
                .ready
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Install the discovery task's token, cancelling any previous one.
    pub(crate) fn set_discovery(&self, token: CancellationToken) {
        if let Some(old) = self.discovery.lock().replace(token) {
            old.cancel();
        }
    }

    pub(crate) fn stop_discovery(&self) {
        if let Some(token) = self.discovery.lock().take() {
            token.cancel();
        }
    }
}

/// Outcome of [`DeviceRegistry::attach`].
pub struct Attached {
    pub device: Arc<Device>,
    pub created: bool,
    /// Connection previously holding the same auxiliary id.
    pub replaced: Option<Arc<Transceiver>>,
}

/// All live devices, keyed by datapath id.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<u64, Arc<Device>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dpid: u64) -> Option<Arc<Device>> {
        self.devices.read().get(&dpid).cloned()
    }

    /// Attach `conn` to the device for `dpid`, creating the device if needed.
    ///
    /// Runs under the registry lock so a concurrent [`detach`](Self::detach)
    /// cannot retire the device between lookup and attach.
    pub fn attach(
        &self,
        dpid: u64,
        version: Version,
        auxiliary_id: u8,
        conn: Arc<Transceiver>,
    ) -> Attached {
        let mut devices = self.devices.write();
        let (device, created) = match devices.get(&dpid) {
            Some(device) => (device.clone(), false),
            None => {
                let device = Arc::new(Device::new(dpid, version));
                devices.insert(dpid, device.clone());
                (device, true)
            }
        };
        let replaced = device.attach(auxiliary_id, conn);
        Attached {
            device,
            created,
            replaced,
        }
    }

    /// Detach connection `conn_id` from `device`.
    ///
    /// Returns true if that was the last connection and the device has been
    /// removed from the registry.
    pub fn detach(&self, device: &Arc<Device>, conn_id: u64) -> bool {
        let mut devices = self.devices.write();
        if !device.detach(conn_id) {
            return false;
        }
        match devices.get(&device.dpid()) {
            Some(current) if Arc::ptr_eq(current, device) => {
                devices.remove(&device.dpid());
                true
            }
            _ => false,
        }
    }

    /// Every device, ordered by dpid.
    pub fn all(&self) -> Vec<Arc<Device>> {
        let mut devices: Vec<_> = self.devices.read().values().cloned().collect();
        devices.sort_by_key(|d| d.dpid());
        devices
    }

    pub fn ready(&self) -> Vec<Arc<Device>> {
        self.all().into_iter().filter(|d| d.is_ready()).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}
