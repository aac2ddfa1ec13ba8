//! Presence summaries for the admin listing.

use serde::Serialize;

use super::{Room, RoomCode};

/// Read-only view of one room, served by `GET /api/rooms`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomCode,
    pub host_name: String,
    pub member_count: usize,
    /// Display names in join order.
    pub members: Vec<String>,
    pub version: u64,
    pub is_playing: bool,
    /// Title of the current track, if the playlist is non-empty.
    pub current_track: Option<String>,
    pub created_at: u64,
}

pub(crate) fn summarize(room: &Room) -> RoomSummary {
    let state = room.state();
    RoomSummary {
        room_id: room.id().clone(),
        host_name: room.host_name().to_string(),
        member_count: room.member_count(),
        members: room
            .members()
            .iter()
            .map(|m| m.display_name.clone())
            .collect(),
        version: state.version,
        is_playing: state.is_playing,
        current_track: state.current_track().map(|t| t.title.clone()),
        created_at: room.created_at(),
    }
}
