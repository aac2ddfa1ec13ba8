//! WebSocket connection tracking.
//!
//! - `WsConnectionManager`: assigns connection ids and force-closes sockets
//! - `ConnectionGuard`: RAII guard that unregisters the socket on drop
//! - `MembershipGuard`: RAII guard that removes the socket from its room on drop

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::services::RoomService;

/// Manages all active WebSocket connections.
///
/// Every connection token is a child of one global token, so `close_all`
/// reaches every handler with a single cancel.
pub struct WsConnectionManager {
    /// connection id -> time of registration
    connections: DashMap<String, Instant>,
    next_id: AtomicU64,
    /// Replaced after `close_all` so later connections are unaffected.
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a new connection (`ws-<n>`) and returns its guard.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let id = format!("ws-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel_token = self.global_cancel.read().child_token();

        self.connections.insert(id.clone(), Instant::now());
        log::info!(
            "[WS] Connection registered: {} (total: {})",
            id,
            self.connections.len()
        );

        ConnectionGuard {
            id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: &str) {
        if let Some((_, since)) = self.connections.remove(id) {
            log::info!(
                "[WS] Connection unregistered: {} after {:.1}s (remaining: {})",
                id,
                since.elapsed().as_secs_f64(),
                self.connections.len()
            );
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Signals every open connection to close. Returns how many were open.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        let mut guard = self.global_cancel.write();
        guard.cancel();
        *guard = CancellationToken::new();
        if count > 0 {
            log::info!("[WS] Force-closing {} connection(s)", count);
        }
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters a connection when dropped.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancelled when the server force-closes connections.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}

/// Leaves the connection's room when dropped.
///
/// Runs on every exit path of the handler, including panics. Leaving is
/// idempotent, so an explicit `room:leave` earlier is harmless.
pub(crate) struct MembershipGuard {
    connection_id: String,
    rooms: Arc<RoomService>,
}

impl MembershipGuard {
    pub(crate) fn new(connection_id: String, rooms: Arc<RoomService>) -> Self {
        Self {
            connection_id,
            rooms,
        }
    }
}

impl Drop for MembershipGuard {
    fn drop(&mut self) {
        if let Some(receipt) = self.rooms.leave_room(&self.connection_id) {
            log::info!(
                "[WS] {} disconnected from room {}",
                self.connection_id,
                receipt.room_id
            );
        }
    }
}
