//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to services.
//! It provides the router construction and server startup functionality.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::events::BroadcastEventBridge;
use crate::services::{DownloadService, MediaLibrary, RoomService};
use crate::state::Config;

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or serve on the TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomService>,
    pub library: Arc<MediaLibrary>,
    pub downloads: Arc<DownloadService>,
    /// Event bridge WebSocket handlers subscribe to.
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub ws_manager: Arc<WsConnectionManager>,
    pub config: Arc<RwLock<Config>>,
    /// Cancelled on shutdown; stops the HTTP server.
    shutdown: CancellationToken,
    /// Port actually bound (0 until the server listens).
    bound_port: Arc<AtomicU16>,
}

impl AppState {
    pub fn new(services: &BootstrappedServices, config: Arc<RwLock<Config>>) -> Self {
        Self {
            rooms: Arc::clone(&services.rooms),
            library: Arc::clone(&services.library),
            downloads: Arc::clone(&services.downloads),
            event_bridge: Arc::clone(&services.event_bridge),
            ws_manager: Arc::clone(&services.ws_manager),
            config,
            shutdown: services.cancel_token.clone(),
            bound_port: Arc::new(AtomicU16::new(0)),
        }
    }

    /// Port the server is listening on, once bound.
    pub fn port(&self) -> Option<u16> {
        match self.bound_port.load(Ordering::SeqCst) {
            0 => None,
            port => Some(port),
        }
    }
}

/// Binds the configured port (0 picks a free one) and serves until the
/// shutdown token is cancelled.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve(listener, state).await
}

/// Serves on an already bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> Result<(), ServerError> {
    let port = listener.local_addr()?.port();
    state.bound_port.store(port, Ordering::SeqCst);
    log::info!("[Server] Listening on http://0.0.0.0:{}", port);

    let shutdown = state.shutdown.clone();
    let app = http::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    log::info!("[Server] HTTP server stopped");
    Ok(())
}
