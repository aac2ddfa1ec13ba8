//! Syncroom Server - standalone server for synchronized listening rooms.
//!
//! Serves the song library over HTTP and runs the room WebSocket protocol.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use syncroom_core::{bootstrap_services, start_server, AppState, LoggingEventEmitter};
use tokio::signal;

use crate::config::ServerConfig;

/// Syncroom Server - shared listening rooms with synchronized playback.
#[derive(Parser, Debug)]
#[command(name = "syncroom-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SYNCROOM_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Songs directory (overrides config file).
    #[arg(short = 's', long, value_name = "DIR")]
    songs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Syncroom Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(songs_dir) = args.songs_dir {
        config.songs_dir = songs_dir;
    }

    log::info!(
        "Configuration: bind_port={}, songs_dir={}, manifest={}",
        config.bind_port,
        config.songs_dir.display(),
        config.manifest_path.display()
    );

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    if args.log_level >= log::LevelFilter::Debug {
        services
            .event_bridge
            .set_external_emitter(Arc::new(LoggingEventEmitter));
    }

    log::info!("Services bootstrapped successfully");

    let app_state = AppState::new(&services, Arc::new(RwLock::new(core_config)));

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!("HTTP server started on port {}", config.bind_port);

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown
    services.shutdown();

    // The server stops on its own once the shutdown token fires
    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
