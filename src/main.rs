//! # dicechat
//!
//! Dice chat server binary: loads settings, initializes logging and serves
//! the room until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dicechat_server::{start, ChatRoom, RoomConfig, ServerConfig};
use dicechat_settings::{load_settings_from_path, settings_path, ChatSettings};
use dicechat_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

/// Multi-user chat room with dice rolling over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "dicechat", version)]
struct Cli {
    /// Settings file (defaults to `~/.dicechat/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn or error.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Layer command-line flags over the loaded settings.
    fn apply(&self, settings: &mut ChatSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings
        .validate()
        .context("Invalid command-line override")?;

    init_telemetry(&TelemetryConfig::from(&settings.logging))
        .context("Failed to initialize logging")?;
    info!(settings = %path.display(), "starting dicechat");

    let room = ChatRoom::new(RoomConfig::from(&settings));
    let handle = start(ServerConfig::from(&settings.server), room)
        .await
        .context("Failed to start server")?;
    info!(addr = %handle.addr(), "dicechat ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    handle.shutdown().await;
    Ok(())
}
