// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// End-to-end: several in-memory switches, link discovery through injected
// probes, host learning, port and device removal.

mod common;

use async_trait::async_trait;
use common::{port, test_config, wait_ready, wait_until, FakeSwitch, SwitchSpec};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use trellis::discovery::Probe;
use trellis::openflow::{MacAddr, PortDesc, PortReason, Version};
use trellis::packet::{build_ethernet, ETHERTYPE_IPV4};
use trellis::{ControllerConfig, Device, EventError, EventListener, Finder, Network, Point};

const HOST_A: MacAddr = MacAddr([0x02, 0xaa, 0, 0, 0, 1]);
const HOST_B: MacAddr = MacAddr([0x02, 0xbb, 0, 0, 0, 2]);

/// Records every event as a short string.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
}

impl Recorder {
    fn contains(&self, entry: &str) -> bool {
        self.seen.lock().iter().any(|e| e == entry)
    }

    fn count(&self, entry: &str) -> usize {
        self.seen.lock().iter().filter(|e| *e == entry).count()
    }

    fn push(&self, entry: String) {
        self.seen.lock().push(entry);
    }
}

#[async_trait]
impl EventListener for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    async fn on_packet_in(
        &self,
        _finder: &Finder,
        device: &Arc<Device>,
        port: u32,
        _frame: &[u8],
    ) -> Result<(), EventError> {
        self.push(format!("packet_in {}/{}", device.dpid(), port));
        Ok(())
    }

    async fn on_port_down(
        &self,
        _finder: &Finder,
        device: &Arc<Device>,
        port: u32,
    ) -> Result<(), EventError> {
        self.push(format!("port_down {}/{}", device.dpid(), port));
        Ok(())
    }

    async fn on_device_up(&self, _finder: &Finder, device: &Arc<Device>) -> Result<(), EventError> {
        self.push(format!("device_up {}", device.dpid()));
        Ok(())
    }

    async fn on_device_down(
        &self,
        _finder: &Finder,
        device: &Arc<Device>,
    ) -> Result<(), EventError> {
        self.push(format!("device_down {}", device.dpid()));
        Ok(())
    }

    async fn on_topology_change(&self, _finder: &Finder) -> Result<(), EventError> {
        self.push("topology_change".to_string());
        Ok(())
    }
}

fn setup() -> (Arc<Network>, Arc<Recorder>) {
    setup_with(test_config())
}

fn setup_with(config: ControllerConfig) -> (Arc<Network>, Arc<Recorder>) {
    let network = Arc::new(Network::new(config));
    let recorder = Arc::new(Recorder::default());
    network.register_listener(recorder.clone());
    (network, recorder)
}

async fn start(network: &Arc<Network>, dpid: u64, ports: &[u32]) -> FakeSwitch {
    let switch = FakeSwitch::connect(network, SwitchSpec::new(dpid, Version::V1_3, ports)).await;
    wait_ready(network, dpid).await;
    switch
}

fn host_frame(src: MacAddr) -> Vec<u8> {
    build_ethernet(MacAddr::BROADCAST, src, ETHERTYPE_IPV4, &[0x45; 20])
}

#[tokio::test]
async fn test_link_discovery_and_host_learning() {
    let (network, recorder) = setup();
    let mut a = start(&network, 1, &[1, 2]).await;
    let b = start(&network, 2, &[1, 2]).await;
    wait_until(|| recorder.contains("device_up 1") && recorder.contains("device_up 2")).await;

    // A's probe out of 1/1 shows up at 2/1.
    let probes = a.probes().await;
    b.packet_in(1, probes[&1].clone()).await;
    wait_until(|| network.topology().is_edge(Point::new(2, 1))).await;

    assert!(network.topology().is_edge(Point::new(1, 1)));
    assert!(network.topology().is_enabled(Point::new(1, 1)));
    let path = network.finder().path(1, 2);
    assert_eq!(path.len(), 1);
    assert_eq!(path[0].egress(), Point::new(1, 1));
    assert_eq!(path[0].ingress(), Point::new(2, 1));
    let links = network.finder().links();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].0.weight, 4);
    wait_until(|| recorder.count("topology_change") >= 1).await;

    // Probes never reach the application as packets.
    assert!(!recorder.contains("packet_in 2/1"));

    // Hosts behind access ports are learned.
    b.packet_in(2, host_frame(HOST_B)).await;
    wait_until(|| recorder.contains("packet_in 2/2")).await;
    assert_eq!(network.hosts().lookup(HOST_B), Some(Point::new(2, 2)));

    // Frames crossing an inter-switch link are delivered but not learned.
    b.packet_in(1, host_frame(HOST_A)).await;
    wait_until(|| recorder.contains("packet_in 2/1")).await;
    assert_eq!(network.hosts().lookup(HOST_A), None);

    // The same probe again only refreshes the link.
    let changes = recorder.count("topology_change");
    b.packet_in(1, probes[&1].clone()).await;
    b.packet_in(2, host_frame(HOST_B)).await;
    wait_until(|| recorder.count("packet_in 2/2") == 2).await;
    assert_eq!(recorder.count("topology_change"), changes);
}

#[tokio::test]
async fn test_triangle_disables_one_link() {
    let (network, recorder) = setup();
    let mut s1 = start(&network, 1, &[1, 2]).await;
    let mut s2 = start(&network, 2, &[1, 2]).await;
    let s3 = start(&network, 3, &[1, 2]).await;

    let p1 = s1.probes().await;
    let p2 = s2.probes().await;
    s2.packet_in(1, p1[&1].clone()).await; // 1/1 - 2/1
    s3.packet_in(1, p2[&2].clone()).await; // 2/2 - 3/1
    s3.packet_in(2, p1[&2].clone()).await; // 1/2 - 3/2
    wait_until(|| network.finder().links().len() == 3).await;

    // Equal weights: the highest endpoint pair is the one left out.
    assert!(network.topology().is_enabled(Point::new(1, 1)));
    assert!(network.topology().is_enabled(Point::new(3, 2)));
    assert!(!network.topology().is_enabled(Point::new(2, 2)));
    assert!(!network.topology().is_enabled(Point::new(3, 1)));

    let path = network.finder().path(2, 3);
    let vertices: Vec<u64> = path.iter().map(|hop| hop.vertex).collect();
    assert_eq!(vertices, vec![2, 1]);

    // Traffic on the disabled link is dropped before any listener sees it.
    s3.packet_in(1, host_frame(HOST_A)).await;
    s3.packet_in(2, host_frame(HOST_A)).await;
    wait_until(|| recorder.contains("packet_in 3/2")).await;
    assert!(!recorder.contains("packet_in 3/1"));

    // Losing 1/2 brings the backup link back.
    let mut down: PortDesc = port(1, 2);
    down.state = PortDesc::STATE_LINK_DOWN;
    s1.port_status(PortReason::Modify, down).await;
    wait_until(|| recorder.contains("port_down 1/2")).await;
    wait_until(|| network.topology().is_enabled(Point::new(2, 2))).await;
    assert!(!network.topology().is_edge(Point::new(3, 2)));
    assert_eq!(network.finder().path(1, 3).len(), 2);
}

#[tokio::test]
async fn test_disconnect_removes_device_and_hosts() {
    let (network, recorder) = setup();
    let mut a = start(&network, 1, &[1, 2]).await;
    let b = start(&network, 2, &[1, 2]).await;

    let probes = a.probes().await;
    b.packet_in(1, probes[&1].clone()).await;
    b.packet_in(2, host_frame(HOST_B)).await;
    wait_until(|| network.hosts().lookup(HOST_B).is_some()).await;
    assert!(network.topology().is_edge(Point::new(1, 1)));

    b.disconnect().await.unwrap();

    wait_until(|| recorder.contains("device_down 2")).await;
    assert!(network.registry().get(2).is_none());
    assert!(!network.topology().has_vertex(2));
    assert!(!network.topology().is_edge(Point::new(1, 1)));
    assert_eq!(network.hosts().lookup(HOST_B), None);
    assert!(network.finder().path(1, 2).is_empty());

    // The survivor keeps working.
    assert!(network.registry().get(1).is_some_and(|d| d.is_ready()));
    assert_eq!(network.finder().devices().len(), 1);
}

#[tokio::test]
async fn test_probe_from_unknown_switch_is_ignored() {
    let (network, _recorder) = setup();
    let b = start(&network, 2, &[1]).await;

    let probe = Probe::new(0x99, 4).encode(MacAddr([0x02, 0, 0, 0, 0, 9]));
    b.packet_in(1, probe).await;
    b.packet_in(1, host_frame(HOST_A)).await;
    wait_until(|| network.hosts().lookup(HOST_A).is_some()).await;
    assert!(network.finder().links().is_empty());
    assert!(!network.topology().is_edge(Point::new(2, 1)));
}

#[tokio::test]
async fn test_host_on_settling_port_is_not_learned() {
    let (network, recorder) = setup_with(ControllerConfig {
        port_settle_ms: 800,
        ..test_config()
    });
    let switch = start(&network, 5, &[1]).await;

    // A port that just came up is still settling.
    switch.port_status(PortReason::Add, port(5, 2)).await;
    switch.packet_in(2, host_frame(HOST_A)).await;
    wait_until(|| recorder.contains("packet_in 5/2")).await;
    assert_eq!(network.hosts().lookup(HOST_A), None);

    tokio::time::sleep(Duration::from_millis(900)).await;
    switch.packet_in(2, host_frame(HOST_A)).await;
    wait_until(|| recorder.count("packet_in 5/2") == 2).await;
    assert_eq!(network.hosts().lookup(HOST_A), Some(Point::new(5, 2)));
}

#[tokio::test]
async fn test_discovery_resumes_when_main_connection_returns() {
    let (network, _recorder) = setup_with(ControllerConfig {
        discovery_interval_secs: 1,
        ..test_config()
    });
    let main = start(&network, 0x31, &[1, 2]).await;
    let aux_spec = SwitchSpec::new(0x31, Version::V1_3, &[1, 2]).with_auxiliary_id(1);
    let _aux = FakeSwitch::connect(&network, aux_spec).await;

    let device = network.registry().get(0x31).unwrap();
    wait_until(|| device.connection_count() == 2).await;
    assert_eq!(network.registry().len(), 1);

    // The auxiliary connection keeps the device alive.
    main.disconnect().await.unwrap();
    wait_until(|| device.connection_count() == 1).await;
    let current = network.registry().get(0x31).unwrap();
    assert!(Arc::ptr_eq(&current, &device));
    assert!(device.is_ready());
    assert!(device.main_connection().is_none());

    // Discovery ticks at least once with nowhere to send.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let mut main = FakeSwitch::connect(&network, SwitchSpec::new(0x31, Version::V1_3, &[1, 2])).await;
    let probes = main.probes().await;
    assert_eq!(probes.len(), 2);
    let decoded = Probe::decode(&probes[&2]).unwrap().unwrap();
    assert_eq!(decoded, Probe::new(0x31, 2));
    assert_eq!(device.connection_count(), 2);
}
