//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative transport implementations.

use super::{DownloadEvent, RoomEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn announce(&self, room_id: RoomCode, count: usize) {
///         self.emitter.emit_room(RoomEvent::Presence { room_id, count });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a room-scoped event.
    fn emit_room(&self, event: RoomEvent);

    /// Emits a download job update.
    fn emit_download(&self, event: DownloadEvent);
}

/// No-op emitter for tests and embedders without a UI.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_room(&self, _event: RoomEvent) {}

    fn emit_download(&self, _event: DownloadEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_room(&self, event: RoomEvent) {
        tracing::debug!(room = %event.room_id(), ?event, "room_event");
    }

    fn emit_download(&self, event: DownloadEvent) {
        tracing::debug!(?event, "download_event");
    }
}
