// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Trellis controller CLI
//!
//! # Usage
//!
//! ```bash
//! # Listen on all interfaces, port 6653
//! trellis
//!
//! # Custom address and verbose logging
//! trellis --bind 127.0.0.1 --port 6633 --log-level debug
//!
//! # Using a configuration file
//! trellis --config trellis.toml
//!
//! # Write the default configuration
//! trellis gen-config --output trellis.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trellis::{Controller, ControllerConfig, LogListener};

/// Trellis OpenFlow controller
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Trellis - OpenFlow controller with loop-free topology")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0", conflicts_with = "config")]
    bind: String,

    /// OpenFlow listen port
    #[arg(short, long, default_value = "6653", conflicts_with = "config")]
    port: u16,

    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a configuration file with the defaults
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "trellis.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = match args.config {
        Some(ref path) => ControllerConfig::from_file(path)?,
        None => ControllerConfig {
            bind_address: args.bind.parse()?,
            port: args.port,
            ..Default::default()
        },
    };

    // Initialize logging
    let directive = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.log_level.clone());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let controller = Controller::new(config)?;
    let addr = controller.listen_addr();
    let config = controller.network().config();

    info!("+----------------------------------------------------+");
    info!(
        "|       Trellis OpenFlow Controller v{}         |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Listen:    {:37} |", addr);
    info!("|  Versions:  {:37} |", "1.0, 1.3");
    info!(
        "|  Echo:      {:37} |",
        format!("{}s", config.echo_interval_secs)
    );
    info!(
        "|  Discovery: {:37} |",
        format!(
            "every {}s, expire after {}s",
            config.discovery_interval_secs, config.link_timeout_secs
        )
    );
    info!("+----------------------------------------------------+");

    controller
        .network()
        .register_listener(Arc::new(LogListener));

    let handle = controller.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping controller...");
        handle.shutdown();
    });

    controller.run().await?;

    info!("Controller stopped");
    Ok(())
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = ControllerConfig::default().to_toml()?;
    let content = format!(
        r#"# Trellis controller configuration
# Generated by trellis gen-config

{}
"#,
        toml_str
    );
    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match ControllerConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Listen:    {}:{}", config.bind_address, config.port);
            println!("Max conns: {}", config.max_connections);
            println!(
                "Discovery: every {}s, links expire after {}s",
                config.discovery_interval_secs, config.link_timeout_secs
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
