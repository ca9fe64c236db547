// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Controller configuration.
//!
//! Loaded from TOML; every field has a default so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Trellis controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Address to listen on for switch connections (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// OpenFlow listen port (default: 6653)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of concurrent switch connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Renewable read deadline in milliseconds
    #[serde(default = "default_read_deadline_ms")]
    pub read_deadline_ms: u64,

    /// Upper bound for a single frame write (seconds)
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Time allowed for the switch HELLO (seconds)
    #[serde(default = "default_hello_timeout")]
    pub hello_timeout_secs: u64,

    /// Keepalive echo interval (seconds)
    #[serde(default = "default_echo_interval")]
    pub echo_interval_secs: u64,

    /// Interval between discovery probes on each port (seconds)
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,

    /// Links not refreshed by a probe within this window are removed (seconds)
    #[serde(default = "default_link_timeout")]
    pub link_timeout_secs: u64,

    /// Settling window after a port comes up before hosts are learned on it (ms)
    #[serde(default = "default_port_settle_ms")]
    pub port_settle_ms: u64,

    /// Depth of the reader to dispatch queue
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Largest accepted frame in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Disable Nagle on switch sockets
    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,

    /// Log level or EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_address() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    6653
}

fn default_max_connections() -> usize {
    1024
}

fn default_read_deadline_ms() -> u64 {
    500
}

fn default_write_timeout() -> u64 {
    5
}

fn default_hello_timeout() -> u64 {
    10
}

fn default_echo_interval() -> u64 {
    30
}

fn default_discovery_interval() -> u64 {
    5
}

fn default_link_timeout() -> u64 {
    20
}

fn default_port_settle_ms() -> u64 {
    5000
}

fn default_queue_depth() -> usize {
    256
}

fn default_max_message_size() -> usize {
    u16::MAX as usize
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_connections: default_max_connections(),
            read_deadline_ms: default_read_deadline_ms(),
            write_timeout_secs: default_write_timeout(),
            hello_timeout_secs: default_hello_timeout(),
            echo_interval_secs: default_echo_interval(),
            discovery_interval_secs: default_discovery_interval(),
            link_timeout_secs: default_link_timeout(),
            port_settle_ms: default_port_settle_ms(),
            queue_depth: default_queue_depth(),
            max_message_size: default_max_message_size(),
            tcp_nodelay: true,
            log_level: default_log_level(),
        }
    }
}

impl ControllerConfig {
    /// Load and validate a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this configuration as TOML.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.read_deadline_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn hello_timeout(&self) -> Duration {
        Duration::from_secs(self.hello_timeout_secs)
    }

    pub fn echo_interval(&self) -> Duration {
        Duration::from_secs(self.echo_interval_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_secs(self.link_timeout_secs)
    }

    pub fn port_settle(&self) -> Duration {
        Duration::from_millis(self.port_settle_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port cannot be 0".into()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections cannot be 0".into()));
        }
        if self.read_deadline_ms == 0 {
            return Err(ConfigError::Invalid("read_deadline_ms cannot be 0".into()));
        }
        if self.write_timeout_secs == 0 || self.hello_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "write_timeout_secs and hello_timeout_secs must be positive".into(),
            ));
        }
        if self.echo_interval_secs == 0 {
            return Err(ConfigError::Invalid("echo_interval_secs cannot be 0".into()));
        }
        if self.discovery_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "discovery_interval_secs cannot be 0".into(),
            ));
        }
        if self.link_timeout_secs <= self.discovery_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "link_timeout_secs ({}) must exceed discovery_interval_secs ({})",
                self.link_timeout_secs, self.discovery_interval_secs
            )));
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid("queue_depth cannot be 0".into()));
        }
        if self.max_message_size < trellis_openflow::HEADER_LEN {
            return Err(ConfigError::Invalid(format!(
                "max_message_size must be at least {} bytes",
                trellis_openflow::HEADER_LEN
            )));
        }
        Ok(())
    }
}
