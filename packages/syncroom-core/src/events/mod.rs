//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for WebSocket transport
//! - Event types for rooms and downloads
//!
//! Room events carry the room they belong to; the WebSocket layer only
//! forwards them to connections that are members of that room.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::playback::PlaybackState;
use crate::rooms::{ConnectionId, RoomCode};
use crate::services::download::DownloadRecord;

/// Events broadcast to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Room-scoped events (state, roster, host).
    Room(RoomEvent),

    /// Download job updates, delivered to every connection.
    Download(DownloadEvent),
}

/// Events scoped to a single room.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoomEvent {
    /// The playback state changed. Stamped with server time when sent.
    StateChanged {
        #[serde(rename = "roomId")]
        room_id: RoomCode,
        state: PlaybackState,
    },
    /// A member joined. Not delivered to the joining connection itself.
    MemberJoined {
        #[serde(rename = "roomId")]
        room_id: RoomCode,
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
        #[serde(rename = "displayName")]
        display_name: String,
    },
    /// A member left or disconnected.
    MemberLeft {
        #[serde(rename = "roomId")]
        room_id: RoomCode,
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
        #[serde(rename = "displayName")]
        display_name: String,
    },
    /// Member count after a roster change.
    Presence {
        #[serde(rename = "roomId")]
        room_id: RoomCode,
        count: usize,
    },
    /// The host left and another member was promoted.
    HostChanged {
        #[serde(rename = "roomId")]
        room_id: RoomCode,
        #[serde(rename = "hostConnection")]
        host_connection: ConnectionId,
        #[serde(rename = "hostName")]
        host_name: String,
    },
    /// The session on `connection_id` was resumed on a newer connection.
    SessionReplaced {
        #[serde(rename = "roomId")]
        room_id: RoomCode,
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
    },
}

impl RoomEvent {
    /// Room the event belongs to.
    pub fn room_id(&self) -> &RoomCode {
        match self {
            Self::StateChanged { room_id, .. }
            | Self::MemberJoined { room_id, .. }
            | Self::MemberLeft { room_id, .. }
            | Self::Presence { room_id, .. }
            | Self::HostChanged { room_id, .. }
            | Self::SessionReplaced { room_id, .. } => room_id,
        }
    }
}

/// Events related to download jobs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DownloadEvent {
    /// A job was created or changed status/progress.
    Updated { job: DownloadRecord },
}

impl From<RoomEvent> for BroadcastEvent {
    fn from(event: RoomEvent) -> Self {
        BroadcastEvent::Room(event)
    }
}

impl From<DownloadEvent> for BroadcastEvent {
    fn from(event: DownloadEvent) -> Self {
        BroadcastEvent::Download(event)
    }
}
