//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Tests use
//! [`bootstrap_services_with`] to substitute the clock and the download tool.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::WsConnectionManager;
use crate::error::{SyncroomError, SyncroomResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::runtime::TokioSpawner;
use crate::services::{CommandFetchTool, DownloadService, FetchTool, MediaLibrary, RoomService};
use crate::state::Config;
use crate::utils::{Clock, SystemClock};

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap.
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Song files and the cached playlist.
    pub library: Arc<MediaLibrary>,
    /// Room registry plus the events its operations produce.
    pub rooms: Arc<RoomService>,
    /// Background download jobs.
    pub downloads: Arc<DownloadService>,
    /// Event bridge for emitting events to WebSocket and optional external consumers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Server clock used for every timestamp.
    pub clock: Arc<dyn Clock>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Stops the HTTP server and disconnects every WebSocket client.
    ///
    /// Disconnected clients leave their rooms through the normal cleanup path.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();

        let connections_closed = self.ws_manager.close_all();
        log::info!(
            "[Bootstrap] Closed {} WebSocket connection(s)",
            connections_closed
        );

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all application services with the system clock and the
/// configured download command.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`SyncroomError::Configuration`] if the configuration is invalid.
pub fn bootstrap_services(config: &Config) -> SyncroomResult<BootstrappedServices> {
    let tool = Arc::new(CommandFetchTool::new(config.download.clone()));
    bootstrap_services_with(config, Arc::new(SystemClock), tool)
}

/// Bootstraps all application services with an explicit clock and fetch tool.
///
/// Services are created in dependency order:
///
/// 1. Shared infrastructure (event bridge, cancellation token, spawner)
/// 2. Media library (loads the manifest)
/// 3. Room service (depends on library, event bridge, clock)
/// 4. Download service (depends on fetch tool, room service, event bridge)
pub fn bootstrap_services_with(
    config: &Config,
    clock: Arc<dyn Clock>,
    tool: Arc<dyn FetchTool>,
) -> SyncroomResult<BootstrappedServices> {
    config.validate().map_err(SyncroomError::Configuration)?;

    let spawner = TokioSpawner::current();
    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    let cancel_token = CancellationToken::new();
    let ws_manager = Arc::new(WsConnectionManager::new());

    let library = Arc::new(MediaLibrary::open(
        config.songs_dir.clone(),
        config.manifest_path.clone(),
    ));

    let rooms = Arc::new(RoomService::new(
        Arc::clone(&library),
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        Arc::clone(&clock),
    ));

    let downloads = Arc::new(DownloadService::new(
        tool,
        Arc::clone(&rooms),
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        spawner.clone(),
    ));

    Ok(BootstrappedServices {
        library,
        rooms,
        downloads,
        event_bridge,
        ws_manager,
        clock,
        spawner,
        cancel_token,
    })
}
