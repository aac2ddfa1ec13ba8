//! Playback data model: tracks and the per-room authoritative state.

use serde::{Deserialize, Serialize};

/// A playable entry of the media library.
///
/// Identified by `filename` within a playlist. Manifests written by older
/// tooling carry `duration` and a numeric `id`; both are accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub filename: String,
    #[serde(default, alias = "duration")]
    pub duration_sec: Option<f64>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            filename: filename.into(),
            duration_sec: None,
        }
    }
}

/// Authoritative playback timeline of one room.
///
/// Position is stored as an anchor: while playing, the live position is
/// `position_sec` plus the time elapsed since `started_at`. Nothing needs to
/// be written while the track simply plays on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub playlist: Vec<Track>,
    pub current_index: usize,
    pub is_playing: bool,
    pub position_sec: f64,
    /// Server time (Unix ms) at which `position_sec` was valid. `None` when paused.
    pub started_at: Option<u64>,
    pub version: u64,
}

impl PlaybackState {
    /// Creates a paused state at the start of `playlist`.
    pub fn new(playlist: Vec<Track>) -> Self {
        Self {
            playlist,
            current_index: 0,
            is_playing: false,
            position_sec: 0.0,
            started_at: None,
            version: 0,
        }
    }

    /// Live playback position in seconds at server time `now_ms`.
    #[must_use]
    pub fn live_position(&self, now_ms: u64) -> f64 {
        match (self.is_playing, self.started_at) {
            (true, Some(started_at)) => {
                let elapsed_ms = now_ms.saturating_sub(started_at);
                self.position_sec + elapsed_ms as f64 / 1000.0
            }
            _ => self.position_sec,
        }
    }

    /// The track at `current_index`, if the playlist is non-empty.
    #[must_use]
    pub fn current_track(&self) -> Option<&Track> {
        self.playlist.get(self.current_index)
    }

    /// Checks the structural invariants of the state.
    ///
    /// - `current_index` is in bounds whenever the playlist is non-empty
    ///   (and 0 when it is empty)
    /// - a playing state always has an anchor
    /// - `position_sec` is finite and non-negative
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let index_ok = if self.playlist.is_empty() {
            self.current_index == 0
        } else {
            self.current_index < self.playlist.len()
        };
        let anchor_ok = !self.is_playing || self.started_at.is_some();
        let position_ok = self.position_sec.is_finite() && self.position_sec >= 0.0;
        index_ok && anchor_ok && position_ok
    }

    /// Starts the current track from the top at `now_ms`.
    pub(crate) fn start_from_top(&mut self, now_ms: u64) {
        self.position_sec = 0.0;
        self.is_playing = true;
        self.started_at = Some(now_ms);
    }

    /// Freezes the live position and stops the anchor.
    pub(crate) fn freeze(&mut self, now_ms: u64) {
        self.position_sec = self.live_position(now_ms);
        self.is_playing = false;
        self.started_at = None;
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
