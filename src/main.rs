//! # volcon
//!
//! Volume-control relay binary. `serve` (the default) runs the HTTP and
//! device WebSocket server; `device` runs a simulated device against one.

#![deny(unsafe_code)]

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use volcon_core::DeviceId;
use volcon_server::{ServerConfig, ShutdownCoordinator};
use volcon_settings::VolconSettings;
use volcon_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "volcon", about = "Remote volume control relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the relay server.
    Serve {
        /// Host to bind (overrides settings).
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, 0 for auto-assign (overrides settings).
        #[arg(long)]
        port: Option<u16>,

        /// Per-request timeout in milliseconds, 0 disables it (overrides settings).
        #[arg(long)]
        request_timeout_ms: Option<u64>,
    },
    /// Run a simulated device that connects to a relay server.
    Device {
        /// WebSocket URL of the server.
        #[arg(long, default_value = "ws://127.0.0.1:3000/ws")]
        url: String,

        /// Device id to register as; a random one if omitted.
        #[arg(long)]
        device_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match volcon_settings::load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("volcon: ignoring unreadable settings file: {e}");
            VolconSettings::default()
        }
    };

    let telemetry = init_telemetry(TelemetryConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
    ));

    let coordinator = ShutdownCoordinator::new();
    let signal_token = coordinator.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
        request_timeout_ms: None,
    }) {
        Commands::Serve {
            host,
            port,
            request_timeout_ms,
        } => {
            let mut settings = settings;
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(ms) = request_timeout_ms {
                settings.requests.timeout_ms = ms;
            }
            let config = ServerConfig::from_settings(&settings);

            let handle = volcon_server::start(config, telemetry.metrics(), coordinator.token())
                .await
                .context("failed to start server")?;
            tracing::info!(port = handle.port, "volcon server ready");

            coordinator.token().cancelled().await;
            tracing::info!("shutting down");
            let clean = coordinator
                .graceful_shutdown(handle.into_tasks(), Some(Duration::from_secs(10)))
                .await;
            if !clean {
                tracing::warn!("some tasks did not finish before the shutdown deadline");
            }
        }
        Commands::Device { url, device_id } => {
            let device_id = device_id.map_or_else(DeviceId::new, DeviceId::from_raw);
            let state = volcon_device::run(&url, device_id, coordinator.token())
                .await
                .with_context(|| format!("device session against {url} failed"))?;
            tracing::info!(
                device_id = %state.device_id,
                volume = %state.volume,
                is_muted = state.is_muted,
                "device stopped"
            );
        }
    }

    Ok(())
}
