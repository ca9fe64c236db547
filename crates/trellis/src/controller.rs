// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP front end: accepts switch connections and runs background upkeep.

use crate::config::{ConfigError, ControllerConfig};
use crate::network::Network;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Controller error types.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("controller already running")]
    AlreadyRunning,
}

/// OpenFlow controller listening for switches.
#[derive(Clone)]
pub struct Controller {
    network: Arc<Network>,
    running: Arc<AtomicBool>,
}

impl Controller {
    /// Create a controller with a fresh [`Network`].
    pub fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        config.validate()?;
        Ok(Self::with_network(Arc::new(Network::new(config))))
    }

    pub fn with_network(network: Arc<Network>) -> Self {
        Self {
            network,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Address from the configuration.
    pub fn listen_addr(&self) -> SocketAddr {
        let config = self.network.config();
        SocketAddr::new(config.bind_address, config.port)
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), ControllerError> {
        let addr = self.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ControllerError::Bind { addr, source })?;
        self.run_on(listener).await
    }

    /// Serve switches connecting to `listener` until shutdown.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), ControllerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ControllerError::AlreadyRunning);
        }
        let result = self.accept_loop(listener).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn accept_loop(&self, listener: TcpListener) -> Result<(), ControllerError> {
        let config = self.network.config();
        let shutdown = self.network.shutdown_token().clone();
        let permits = Arc::new(Semaphore::new(config.max_connections));

        info!("OpenFlow controller listening on {}", listener.local_addr()?);

        // Link expiry sweeper
        let network = self.network.clone();
        let sweep_interval = config.link_timeout() / 2;
        let shutdown_sweep = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(sweep_interval) => {
                        let expired = network.sweep_links().await;
                        if expired > 0 {
                            info!("Removed {} expired links", expired);
                        }
                    }
                    _ = shutdown_sweep.cancelled() => {
                        debug!("Link sweeper shutting down");
                        break;
                    }
                }
            }
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let Ok(permit) = permits.clone().try_acquire_owned() else {
                                warn!("Connection limit reached, rejecting {}", peer_addr);
                                continue;
                            };
                            if let Err(e) = stream.set_nodelay(config.tcp_nodelay) {
                                debug!("set_nodelay failed for {}: {}", peer_addr, e);
                            }
                            info!("New switch connection from {}", peer_addr);

                            let network = self.network.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                if let Err(e) = network.serve(stream, peer_addr.to_string()).await {
                                    warn!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Stop accepting and close every switch connection.
    pub fn shutdown(&self) {
        self.network.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rejects_invalid_config() {
        let config = ControllerConfig {
            link_timeout_secs: 1,
            discovery_interval_secs: 5,
            ..Default::default()
        };
        assert!(matches!(
            Controller::new(config),
            Err(ControllerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_stops_accept_loop() {
        let controller = Controller::new(ControllerConfig::default()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let runner = controller.clone();
        let task = tokio::spawn(async move { runner.run_on(listener).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(controller.is_running());

        controller.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_accepts_switch_over_tcp() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let controller = Controller::new(ControllerConfig::default()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let runner = controller.clone();
        let task = tokio::spawn(async move { runner.run_on(listener).await });

        let mut switch = tokio::net::TcpStream::connect(addr).await.unwrap();
        switch.write_all(&[0x04, 0, 0, 8, 0, 0, 0, 1]).await.unwrap();
        let mut header = [0u8; 8];
        tokio::time::timeout(Duration::from_secs(2), switch.read_exact(&mut header))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(header[0], 0x04);
        assert_eq!(header[1], 0); // HELLO

        controller.shutdown();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
