// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// In-memory OpenFlow switch for driving the controller in tests.
// It answers the handshake and echoes on its own and forwards every
// message it receives so tests can assert on order.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use trellis::openflow::{
    codec_for, Action, Codec, Description, Features, MacAddr, Message, PacketIn, PortDesc, PortReason,
    PortStatus, Version, HEADER_LEN,
};
use trellis::{ControllerConfig, Network, SessionError};

pub const WAIT: Duration = Duration::from_secs(5);

/// Config tuned for tests: short deadlines, no settling window.
pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        read_deadline_ms: 20,
        hello_timeout_secs: 2,
        port_settle_ms: 0,
        ..Default::default()
    }
}

/// Physical port that is up, at 1 Gb/s.
pub fn port(dpid: u64, number: u32) -> PortDesc {
    PortDesc {
        number,
        hw_addr: MacAddr([0x02, 0, 0, dpid as u8, 0, number as u8]),
        name: format!("eth{number}"),
        curr_speed_kbps: 1_000_000,
        max_speed_kbps: 1_000_000,
        ..Default::default()
    }
}

pub struct SwitchSpec {
    pub dpid: u64,
    pub version: Version,
    pub description: Description,
    pub ports: Vec<PortDesc>,
    pub auxiliary_id: u8,
}

impl SwitchSpec {
    pub fn new(dpid: u64, version: Version, ports: &[u32]) -> Self {
        Self {
            dpid,
            version,
            description: Description {
                manufacturer: "Open vSwitch".into(),
                hardware: "fake".into(),
                software: "test".into(),
                serial: format!("{dpid}"),
                datapath: String::new(),
            },
            ports: ports.iter().map(|&n| port(dpid, n)).collect(),
            auxiliary_id: 0,
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: &str) -> Self {
        self.description.manufacturer = manufacturer.into();
        self
    }

    pub fn with_auxiliary_id(mut self, auxiliary_id: u8) -> Self {
        self.auxiliary_id = auxiliary_id;
        self
    }
}

pub struct FakeSwitch {
    pub dpid: u64,
    pub ports: Vec<PortDesc>,
    codec: &'static dyn Codec,
    writer: Arc<Mutex<WriteHalf<DuplexStream>>>,
    received: mpsc::UnboundedReceiver<(u32, Message)>,
    reader: JoinHandle<()>,
    pub session: JoinHandle<Result<(), SessionError>>,
}

impl FakeSwitch {
    /// Connect to `network` and say HELLO.
    pub async fn connect(network: &Arc<Network>, spec: SwitchSpec) -> Self {
        let (switch_io, controller_io) = tokio::io::duplex(256 * 1024);
        let serving = network.clone();
        let peer = format!("fake-{:x}", spec.dpid);
        let session = tokio::spawn(async move { serving.serve(controller_io, peer).await });

        let codec = codec_for(spec.version);
        let (read_half, write_half) = tokio::io::split(switch_io);
        let writer = Arc::new(Mutex::new(write_half));
        let (tx, received) = mpsc::unbounded_channel();

        let hello = codec.encode(1, &Message::Hello).unwrap();
        writer.lock().await.write_all(&hello).await.unwrap();

        let replies = spec.clone_parts();
        let reader = tokio::spawn(reply_loop(read_half, writer.clone(), codec, replies, tx));

        Self {
            dpid: spec.dpid,
            ports: spec.ports,
            codec,
            writer,
            received,
            reader,
            session,
        }
    }

    pub async fn send(&self, message: Message) {
        self.send_xid(0x7000, message).await;
    }

    pub async fn send_xid(&self, xid: u32, message: Message) {
        let frame = self.codec.encode(xid, &message).unwrap();
        self.send_raw(&frame).await;
    }

    pub async fn send_raw(&self, bytes: &[u8]) {
        self.writer.lock().await.write_all(bytes).await.unwrap();
    }

    pub async fn packet_in(&self, port: u32, data: Vec<u8>) {
        self.send(Message::PacketIn(PacketIn::new(port, data))).await;
    }

    pub async fn port_status(&self, reason: PortReason, port: PortDesc) {
        self.send(Message::PortStatus(PortStatus { reason, port })).await;
    }

    /// Next message from the controller, with its xid.
    pub async fn recv_with_xid(&mut self) -> (u32, Message) {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("timed out waiting for controller")
            .expect("switch reader stopped")
    }

    pub async fn recv(&mut self) -> Message {
        self.recv_with_xid().await.1
    }

    /// Skip messages until one satisfies `pred`.
    pub async fn recv_until<F>(&mut self, mut pred: F) -> Message
    where
        F: FnMut(&Message) -> bool,
    {
        loop {
            let message = self.recv().await;
            if pred(&message) {
                return message;
            }
        }
    }

    /// Discovery probes sent out of each up port, keyed by port number.
    pub async fn probes(&mut self) -> HashMap<u32, Vec<u8>> {
        let wanted = self.ports.iter().filter(|p| p.is_up()).count();
        let mut probes = HashMap::new();
        while probes.len() < wanted {
            if let Message::PacketOut(packet_out) = self.recv().await {
                if let Some(Action::Output { port, .. }) = packet_out.actions.first() {
                    probes.insert(*port, packet_out.data);
                }
            }
        }
        probes
    }

    /// Collect the message kinds received until `count` have arrived.
    pub async fn kinds(&mut self, count: usize) -> Vec<&'static str> {
        let mut kinds = Vec::with_capacity(count);
        while kinds.len() < count {
            kinds.push(self.recv().await.kind());
        }
        kinds
    }

    /// Close the switch side; the controller sees EOF.
    pub async fn disconnect(self) -> Result<(), SessionError> {
        self.writer.lock().await.shutdown().await.ok();
        let result = tokio::time::timeout(WAIT, self.session)
            .await
            .expect("session did not end")
            .expect("session task panicked");
        self.reader.abort();
        result
    }
}

struct Replies {
    dpid: u64,
    version: Version,
    description: Description,
    ports: Vec<PortDesc>,
    auxiliary_id: u8,
}

impl SwitchSpec {
    fn clone_parts(&self) -> Replies {
        Replies {
            dpid: self.dpid,
            version: self.version,
            description: self.description.clone(),
            ports: self.ports.clone(),
            auxiliary_id: self.auxiliary_id,
        }
    }
}

async fn reply_loop(
    mut read_half: ReadHalf<DuplexStream>,
    writer: Arc<Mutex<WriteHalf<DuplexStream>>>,
    codec: &'static dyn Codec,
    replies: Replies,
    forward: mpsc::UnboundedSender<(u32, Message)>,
) {
    loop {
        let mut header = [0u8; HEADER_LEN];
        if read_half.read_exact(&mut header).await.is_err() {
            return;
        }
        let len = usize::from(u16::from_be_bytes([header[2], header[3]]));
        let xid = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        let mut frame = header.to_vec();
        frame.resize(len.max(HEADER_LEN), 0);
        if read_half.read_exact(&mut frame[HEADER_LEN..]).await.is_err() {
            return;
        }
        let message = codec.decode(&frame).expect("controller sent undecodable frame");

        let reply = match &message {
            Message::FeaturesRequest => Some(Message::FeaturesReply(Features {
                dpid: replies.dpid,
                n_buffers: 256,
                n_tables: 254,
                auxiliary_id: replies.auxiliary_id,
                capabilities: 0,
                ports: match replies.version {
                    Version::V1_0 => replies.ports.clone(),
                    Version::V1_3 => Vec::new(),
                },
            })),
            Message::DescriptionRequest => {
                Some(Message::DescriptionReply(replies.description.clone()))
            }
            Message::PortDescriptionRequest => {
                Some(Message::PortDescriptionReply(replies.ports.clone()))
            }
            Message::BarrierRequest => Some(Message::BarrierReply),
            Message::EchoRequest(payload) => Some(Message::EchoReply(payload.clone())),
            _ => None,
        };
        if let Some(reply) = reply {
            let bytes = codec.encode(xid, &reply).unwrap();
            if writer.lock().await.write_all(&bytes).await.is_err() {
                return;
            }
        }
        if forward.send((xid, message)).is_err() {
            return;
        }
    }
}

/// Poll `check` until it holds or the wait expires.
pub async fn wait_until<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the device for `dpid` is ready.
pub async fn wait_ready(network: &Network, dpid: u64) {
    wait_until(|| {
        network
            .registry()
            .get(dpid)
            .is_some_and(|device| device.is_ready())
    })
    .await;
}
