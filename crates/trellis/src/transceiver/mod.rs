// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection OpenFlow protocol engine.
//!
//! A [`Transceiver`] owns one switch socket. After version negotiation it
//! runs three cooperating tasks that share a [`CancellationToken`]:
//!
//! - a reader that pulls whole frames off the socket under a short,
//!   renewable deadline and queues them
//! - a keepalive ticker that probes an idle switch with timestamped echoes
//! - the dispatch loop, which decodes each frame and routes it to a
//!   [`MessageHandler`]
//!
//! Whichever task fails first cancels the token; cleanup then runs once.

pub mod handler;
pub mod keepalive;

pub use handler::{handler_for, Handler, Of10Handler, Of13Handler};
pub use keepalive::Keepalive;

use crate::config::ControllerConfig;
use crate::transport::{FrameReader, FrameWriter, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use trellis_openflow::{
    Codec, CodecError, Description, ErrorMsg, Features, Header, Message, PacketIn, PortDesc,
    PortStatus, Version, MSG_ECHO_REPLY,
};

/// Session error types.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("version mismatch: negotiated {negotiated}, frame carries {actual:#04x}")]
    VersionMismatch { negotiated: Version, actual: u8 },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("connection closed")]
    Closed,
}

impl SessionError {
    /// Whether this error ends the connection.
    ///
    /// Only malformed messages on an established connection are survivable.
    pub fn is_fatal(&self, established: bool) -> bool {
        match self {
            Self::Codec(CodecError::VersionMismatch { .. }) => true,
            Self::Codec(_) => !established,
            _ => true,
        }
    }
}

/// Connection lifecycle. Each state is entered at most once, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    Connected = 0,
    Negotiating = 1,
    Established = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connected,
            1 => Self::Negotiating,
            2 => Self::Established,
            _ => Self::Closed,
        }
    }
}

/// Receives decoded switch-to-controller messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_features(
        &self,
        conn: &Arc<Transceiver>,
        features: Features,
    ) -> Result<(), SessionError>;

    async fn on_description(
        &self,
        conn: &Arc<Transceiver>,
        description: Description,
    ) -> Result<(), SessionError>;

    async fn on_ports(
        &self,
        conn: &Arc<Transceiver>,
        ports: Vec<PortDesc>,
    ) -> Result<(), SessionError>;

    async fn on_port_status(
        &self,
        conn: &Arc<Transceiver>,
        status: PortStatus,
    ) -> Result<(), SessionError>;

    async fn on_packet_in(
        &self,
        conn: &Arc<Transceiver>,
        packet_in: PacketIn,
    ) -> Result<(), SessionError>;

    async fn on_error(&self, conn: &Arc<Transceiver>, error: ErrorMsg) -> Result<(), SessionError> {
        warn!(
            peer = %conn.peer(),
            kind = error.kind,
            code = error.code,
            "switch reported error"
        );
        Ok(())
    }

    /// Called exactly once when the connection is torn down.
    async fn on_close(&self, conn: &Arc<Transceiver>);
}

/// One negotiated switch connection.
pub struct Transceiver {
    id: u64,
    peer: String,
    handler: Box<dyn Handler>,
    config: Arc<ControllerConfig>,
    writer: FrameWriter,
    xid: AtomicU32,
    state: AtomicU8,
    keepalive: Mutex<Keepalive>,
    cancel: CancellationToken,
    closed: AtomicBool,
    dpid: OnceLock<u64>,
}

impl fmt::Debug for Transceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transceiver")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("version", &self.version())
            .field("state", &self.state())
            .finish()
    }
}

impl Transceiver {
    /// Wait for the switch HELLO and pick the protocol handler.
    ///
    /// On success the returned reader must be handed to [`Transceiver::run`].
    pub async fn negotiate<S>(
        stream: S,
        id: u64,
        peer: impl Into<String>,
        config: Arc<ControllerConfig>,
        cancel: CancellationToken,
    ) -> Result<(Arc<Self>, FrameReader), SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let peer = peer.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(
            Box::new(read_half) as crate::transport::BoxedReader,
            config.max_message_size,
        );
        let writer = FrameWriter::new(
            Box::new(write_half) as crate::transport::BoxedWriter,
            config.write_timeout(),
        );

        let frame = read_hello(&mut reader, &config, &cancel).await?;
        let header = Header::parse(&frame).map_err(|e| SessionError::Negotiation(e.to_string()))?;
        if !header.is_hello() {
            return Err(SessionError::Negotiation(format!(
                "expected HELLO, received message type {}",
                header.msg_type
            )));
        }
        let version = Version::from_wire(header.version)
            .map_err(|e| SessionError::Negotiation(e.to_string()))?;

        info!(peer = %peer, version = %version, "negotiated OpenFlow version");

        let transceiver = Arc::new(Self {
            id,
            peer,
            handler: handler_for(version),
            config,
            writer,
            xid: AtomicU32::new(1),
            state: AtomicU8::new(SessionState::Connected as u8),
            keepalive: Mutex::new(Keepalive::new(Instant::now())),
            cancel,
            closed: AtomicBool::new(false),
            dpid: OnceLock::new(),
        });
        Ok((transceiver, reader))
    }

    /// Send the handshake and serve the connection until it ends.
    ///
    /// Cleanup (including [`MessageHandler::on_close`]) has run by the time
    /// this returns. A clean EOF from the switch is `Ok(())`.
    pub async fn run(
        self: Arc<Self>,
        reader: FrameReader,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), SessionError> {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(self.config.queue_depth);
        let reader_task = tokio::spawn(self.clone().read_loop(reader, tx));
        let keepalive_task = tokio::spawn(self.clone().keepalive_loop());

        let result = match self.send_handshake().await {
            Ok(()) => self.dispatch_loop(&mut rx, handler.as_ref()).await,
            Err(e) => Err(e),
        };

        self.cancel.cancel();
        // Unblock a reader waiting on a full queue before joining it.
        drop(rx);
        let read_result = match reader_task.await {
            Ok(result) => result,
            Err(e) => {
                warn!(peer = %self.peer, "reader task failed: {}", e);
                Ok(())
            }
        };
        if let Err(e) = keepalive_task.await {
            warn!(peer = %self.peer, "keepalive task failed: {}", e);
        }

        self.cleanup(handler.as_ref()).await;

        let result = result.and(read_result);
        if let Err(e) = &result {
            warn!(peer = %self.peer, dpid = ?self.dpid(), "session ended: {}", e);
        }
        result
    }

    async fn send_handshake(&self) -> Result<(), SessionError> {
        self.advance(SessionState::Connected, SessionState::Negotiating);
        for message in self.handler.handshake() {
            self.send(message).await?;
        }
        Ok(())
    }

    async fn read_loop(
        self: Arc<Self>,
        mut reader: FrameReader,
        queue: mpsc::Sender<Vec<u8>>,
    ) -> Result<(), SessionError> {
        let deadline = self.config.read_deadline();
        let expected = self.version();

        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                result = reader.read_frame(deadline) => result,
            };
            let frame = match frame {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(TransportError::Closed) => {
                    info!(peer = %self.peer, dpid = ?self.dpid(), "switch closed connection");
                    self.cancel.cancel();
                    return Ok(());
                }
                Err(e) => {
                    self.cancel.cancel();
                    return Err(e.into());
                }
            };

            if frame[0] != expected.wire() {
                self.cancel.cancel();
                return Err(SessionError::VersionMismatch {
                    negotiated: expected,
                    actual: frame[0],
                });
            }
            // Echo replies answer our own probes and are not traffic.
            if frame[1] != MSG_ECHO_REPLY {
                self.keepalive.lock().touch(Instant::now());
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                sent = queue.send(frame) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn keepalive_loop(self: Arc<Self>) {
        let interval = self.config.echo_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let missed = {
                        let mut keepalive = self.keepalive.lock();
                        if !keepalive.should_probe(Instant::now(), interval) {
                            continue;
                        }
                        keepalive.on_probe_sent()
                    };
                    if missed > 1 {
                        warn!(
                            peer = %self.peer,
                            dpid = ?self.dpid(),
                            missed = missed - 1,
                            "echo requests unanswered"
                        );
                    }

                    let payload = keepalive::probe_payload(SystemTime::now());
                    if let Err(e) = self.send_inner(None, Message::EchoRequest(payload), false).await {
                        warn!(peer = %self.peer, "keepalive send failed: {}", e);
                        self.cancel.cancel();
                        break;
                    }
                }
            }
        }
    }

    async fn dispatch_loop(
        self: &Arc<Self>,
        queue: &mut mpsc::Receiver<Vec<u8>>,
        handler: &dyn MessageHandler,
    ) -> Result<(), SessionError> {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                frame = queue.recv() => match frame {
                    Some(frame) => frame,
                    None => return Ok(()),
                },
            };

            let xid = Header::parse(&frame).map(|h| h.xid).unwrap_or_default();
            let result = match self.codec().decode(&frame) {
                Ok(message) => self.dispatch(xid, message, handler).await,
                Err(e) => Err(SessionError::Codec(e)),
            };
            if let Err(e) = result {
                if e.is_fatal(self.is_established()) {
                    return Err(e);
                }
                warn!(peer = %self.peer, dpid = ?self.dpid(), xid, "dropping message: {}", e);
            }
        }
    }

    async fn dispatch(
        self: &Arc<Self>,
        xid: u32,
        message: Message,
        handler: &dyn MessageHandler,
    ) -> Result<(), SessionError> {
        match message {
            Message::EchoRequest(payload) => {
                self.send_inner(Some(xid), Message::EchoReply(payload), true)
                    .await?;
            }
            Message::EchoReply(payload) => {
                let latency = self.keepalive.lock().on_reply(&payload, SystemTime::now());
                if let Some(latency) = latency {
                    trace!(peer = %self.peer, xid, ?latency, "echo reply");
                }
            }
            Message::FeaturesReply(features) => {
                handler.on_features(self, features).await?;
                if self.advance(SessionState::Negotiating, SessionState::Established) {
                    info!(peer = %self.peer, dpid = ?self.dpid(), "connection established");
                }
            }
            Message::DescriptionReply(description) => {
                handler.on_description(self, description).await?
            }
            Message::PortDescriptionReply(ports) => handler.on_ports(self, ports).await?,
            Message::PortStatus(status) => handler.on_port_status(self, status).await?,
            Message::PacketIn(packet_in) => handler.on_packet_in(self, packet_in).await?,
            Message::Error(error) => handler.on_error(self, error).await?,
            Message::GetConfigReply(config) => {
                debug!(
                    peer = %self.peer,
                    flags = config.flags,
                    miss_send_len = config.miss_send_len,
                    "switch config"
                );
            }
            Message::BarrierReply => trace!(peer = %self.peer, xid, "barrier reply"),
            Message::Hello => debug!(peer = %self.peer, "ignoring repeated HELLO"),
            Message::Unsupported { msg_type } => {
                debug!(peer = %self.peer, msg_type, "skipping unsupported message");
            }
            other => {
                debug!(peer = %self.peer, kind = other.kind(), "unexpected message from switch");
            }
        }
        Ok(())
    }

    async fn cleanup(self: &Arc<Self>, handler: &dyn MessageHandler) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
        if let Err(e) = self.writer.shutdown().await {
            trace!(peer = %self.peer, "write shutdown: {}", e);
        }
        handler.on_close(self).await;
        debug!(peer = %self.peer, dpid = ?self.dpid(), "connection cleaned up");
    }

    /// Send `message` with a fresh transaction id; returns the xid.
    pub async fn send(&self, message: Message) -> Result<u32, SessionError> {
        self.send_inner(None, message, true).await
    }

    /// Send several messages in order.
    pub async fn send_all(&self, messages: Vec<Message>) -> Result<(), SessionError> {
        for message in messages {
            self.send(message).await?;
        }
        Ok(())
    }

    async fn send_inner(
        &self,
        xid: Option<u32>,
        message: Message,
        activity: bool,
    ) -> Result<u32, SessionError> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Closed);
        }
        let xid = xid.unwrap_or_else(|| self.xid.fetch_add(1, Ordering::Relaxed));
        let frame = self.codec().encode(xid, &message)?;
        if let Err(e) = self.writer.write_frame(&frame).await {
            self.cancel.cancel();
            return Err(e.into());
        }
        if activity {
            self.keepalive.lock().touch(Instant::now());
        }
        trace!(peer = %self.peer, xid, kind = message.kind(), "sent");
        Ok(xid)
    }

    fn advance(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Ask every task of this connection to stop.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn version(&self) -> Version {
        self.handler.version()
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub fn codec(&self) -> &'static dyn Codec {
        self.handler.codec()
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_established(&self) -> bool {
        self.state() == SessionState::Established
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Datapath id, once FEATURES_REPLY has been handled.
    pub fn dpid(&self) -> Option<u64> {
        self.dpid.get().copied()
    }

    pub(crate) fn set_dpid(&self, dpid: u64) {
        let _ = self.dpid.set(dpid);
    }

    /// Round-trip time measured by the last answered echo.
    pub fn latency(&self) -> Option<Duration> {
        self.keepalive.lock().latency()
    }

    /// Echo probes sent since the last reply.
    pub fn missed_echoes(&self) -> u32 {
        self.keepalive.lock().missed_echoes()
    }
}

async fn read_hello(
    reader: &mut FrameReader,
    config: &ControllerConfig,
    cancel: &CancellationToken,
) -> Result<Vec<u8>, SessionError> {
    let until = Instant::now() + config.hello_timeout();
    loop {
        let now = Instant::now();
        if now >= until {
            return Err(SessionError::Negotiation(format!(
                "no HELLO within {:?}",
                config.hello_timeout()
            )));
        }
        let wait = config.read_deadline().min(until - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(SessionError::Closed),
            result = reader.read_frame(wait) => match result {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => continue,
                Err(e) => return Err(e.into()),
            },
        }
    }
}
