//! webcd - main entry point
//!
//! Serves the selected optical drive's track list, album metadata and per-track
//! MP3 streams over HTTP.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use webcd_common::config::{resolve_config_path, TomlConfig};
use webcd_server::disc::DeviceProber;
use webcd_server::{build_router, logging, AppState};

/// Command-line arguments for webcd
#[derive(Parser, Debug)]
#[command(name = "webcd")]
#[command(about = "Web CD player: disc metadata and MP3 streaming over HTTP")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "WEBCD_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long, env = "WEBCD_BIND")]
    bind: Option<String>,

    /// Drive to select at startup
    #[arg(short, long, env = "WEBCD_DEVICE")]
    device: Option<String>,

    /// Config file (also read from WEBCD_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing before the config so its warnings are kept
    let log_filter = logging::init();

    let args = Args::parse();

    info!(
        "Starting webcd {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("WEBCD_BUILD")
    );

    let config_path = resolve_config_path(args.config.as_deref());
    let config = TomlConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    logging::apply_config_level(&log_filter, &config.logging.level);

    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file, using built-in defaults"),
    }

    let prober = DeviceProber::new(&config.tools);
    let devices = prober.discover().await;
    info!("Found {} optical drive(s)", devices.len());

    let requested = args.device.or_else(|| config.device.clone());
    let device = match requested {
        Some(device) if Path::new(&device).exists() => Some(device),
        Some(device) => {
            warn!("Requested device {} does not exist", device);
            devices.first().map(|d| d.device.clone())
        }
        None => devices.first().map(|d| d.device.clone()),
    };
    match &device {
        Some(device) => info!("Selected device: {}", device),
        None => warn!("No CD device available; select one via /api/set-device"),
    }

    let state = AppState::from_config(&config, device).context("Failed to initialize service")?;
    state.devices.replace(devices).await;

    let app = build_router(state.clone());

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.playback.stop().await;
    state.sessions.cancel_all();

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
