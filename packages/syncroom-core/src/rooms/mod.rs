//! Room registry and membership.
//!
//! - [`RoomCode`]: validated 6-character room identifiers
//! - [`Room`]: roster, host designation and the room's playback state
//! - [`RoomRegistry`]: the only owner of live rooms; create/join/rejoin/leave
//! - [`presence`]: member counts and admin summaries

mod code;
pub mod presence;
mod registry;
mod room;

pub use code::RoomCode;
pub use presence::RoomSummary;
pub use registry::{IntentReceipt, JoinReceipt, LeaveReceipt, RoomRegistry};
pub use room::{Member, Room};

use thiserror::Error;

use crate::playback::PlaybackError;

/// Identifier of one WebSocket connection (e.g. `ws-12`). Changes on every reconnect.
pub type ConnectionId = String;

/// Stable per-client identity, kept by the browser across reconnects.
pub type SessionToken = String;

/// Errors reported to the connection that issued the request. Never broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Room {0} already exists")]
    RoomAlreadyExists(String),

    #[error("Room {0} not found")]
    RoomNotFound(String),

    /// The room disappeared while the client was disconnected.
    #[error("Room {0} no longer exists")]
    RoomGone(String),

    #[error("Invalid room code: {0}")]
    InvalidRoomCode(String),

    /// The connection is not a member of the room it tries to control.
    #[error("Join a room before controlling playback")]
    Unauthorized,

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}
