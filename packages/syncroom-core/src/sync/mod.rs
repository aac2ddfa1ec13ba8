//! Snapshot format and client-side clock reconciliation.
//!
//! The server never streams positions. It sends a [`Snapshot`] (full state
//! plus the server clock at send time) and every replica derives the live
//! position from the anchor on its own.

mod reconcile;

pub use reconcile::{needs_seek, Correction, Reconciler, SnapshotPlan};

use serde::{Deserialize, Serialize};

use crate::playback::PlaybackState;

/// Full room state stamped with the server clock at emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub state: PlaybackState,
    pub server_time: u64,
}

impl Snapshot {
    pub fn new(state: PlaybackState, server_time: u64) -> Self {
        Self { state, server_time }
    }

    /// Position the room is at when the snapshot was stamped.
    #[must_use]
    pub fn target_position(&self) -> f64 {
        self.state.live_position(self.server_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::Track;

    #[test]
    fn target_position_uses_server_time() {
        let mut state = PlaybackState::new(vec![Track::new("A", "B", "a.mp3")]);
        state.is_playing = true;
        state.position_sec = 1.0;
        state.started_at = Some(10_000);
        let snapshot = Snapshot::new(state, 13_000);
        assert!((snapshot.target_position() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn wire_shape_matches_sync_state_payload() {
        let snapshot = Snapshot::new(PlaybackState::default(), 42);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["serverTime"], 42);
        assert!(json["state"]["playlist"].is_array());
    }
}
