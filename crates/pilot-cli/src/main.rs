//! # figma-pilot-relay
//!
//! Relay binary: loads settings, starts logging, and runs the WebSocket relay
//! until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pilot_relay::{RelayConfig, RelayServer};
use pilot_settings::{LogFormat, RelaySettings};

/// Figma Pilot WebSocket relay.
#[derive(Parser, Debug)]
#[command(name = "figma-pilot-relay", about = "Figma Pilot WebSocket relay")]
struct Cli {
    /// Host to bind (overrides settings and `FIGMA_WS_HOST`).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings and `FIGMA_WS_PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Default command timeout in milliseconds.
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Channel the controller selects at startup.
    #[arg(long)]
    channel: Option<String>,

    /// Settings file (defaults to `~/.figma-pilot/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(ref host) = self.host {
            settings.ws_host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.ws_port = port;
        }
        if let Some(ms) = self.request_timeout {
            settings.request_timeout_ms = ms;
        }
        if let Some(ref level) = self.log_level {
            settings.log_level.clone_from(level);
        }
        if self.json {
            settings.log_format = LogFormat::Json;
        }
    }
}

fn init_logging(settings: &RelaySettings) {
    match settings.log_format {
        LogFormat::Compact => pilot_logging::init_subscriber(&settings.log_level),
        LogFormat::Json => pilot_logging::init_json_subscriber(&settings.log_level),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(pilot_settings::settings_path);
    // rejected FIGMA_* values warn before the configured subscriber exists
    let mut settings = pilot_logging::with_bootstrap_subscriber(|| {
        pilot_settings::load_settings_from_path(&settings_path)
    })
    .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    init_logging(&settings);

    let server = RelayServer::new(RelayConfig::from(&settings));
    if let Some(channel) = args.channel {
        server.controller().connect(channel);
    }

    let (addr, handle) = server.listen().await.context("Failed to start relay")?;
    tracing::info!(
        %addr,
        url = %server.controller().status().url,
        "Figma Pilot relay listening"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(Duration::from_secs(5)))
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}
