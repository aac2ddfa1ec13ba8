//! Pure transition function of the playback state machine.
//!
//! `apply` takes the current state, an [`Intent`] and the server time, and
//! either mutates the state (bumping its version) or rejects the intent
//! without touching it. The transport layer turns an applied transition into
//! a snapshot broadcast.

use super::state::{PlaybackState, Track};
use super::PlaybackError;
use crate::protocol_constants::{PREV_RESTART_THRESHOLD_SECS, TRACK_ENDED_DEBOUNCE_SECS};

/// A request to mutate the shared playback timeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Play,
    Pause,
    Seek(f64),
    Next,
    Prev,
    SelectIndex(usize),
    /// A client's media element reported the end of the track. `index` is the
    /// track the client was playing, when it says so.
    TrackEnded { index: Option<usize> },
    RefreshPlaylist(Vec<Track>),
}

impl Intent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Seek(_) => "seek",
            Self::Next => "next",
            Self::Prev => "prev",
            Self::SelectIndex(_) => "playIndex",
            Self::TrackEnded { .. } => "ended",
            Self::RefreshPlaylist(_) => "refreshPlaylist",
        }
    }
}

/// Result of applying an intent that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The state changed and its version was bumped; broadcast a snapshot.
    Applied,
    /// Nothing to do (e.g. pausing a paused room); no version bump, no broadcast.
    Ignored,
}

/// Converts a wire number into a playlist index.
///
/// Clients send plain JSON numbers; anything that is not a non-negative
/// integer is an invalid index.
pub fn index_from_number(value: f64) -> Result<usize, PlaybackError> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > usize::MAX as f64 {
        return Err(PlaybackError::InvalidIndex(value.to_string()));
    }
    Ok(value as usize)
}

/// Applies `intent` to `state` at server time `now_ms`.
///
/// On `Err` the state is left untouched.
pub fn apply(
    state: &mut PlaybackState,
    intent: Intent,
    now_ms: u64,
) -> Result<Transition, PlaybackError> {
    let transition = match intent {
        Intent::Play => {
            require_tracks(state)?;
            if state.is_playing {
                Transition::Ignored
            } else {
                state.is_playing = true;
                state.started_at = Some(now_ms);
                Transition::Applied
            }
        }
        Intent::Pause => {
            if state.is_playing {
                state.freeze(now_ms);
                Transition::Applied
            } else {
                Transition::Ignored
            }
        }
        Intent::Seek(target) => {
            if !target.is_finite() {
                return Err(PlaybackError::InvalidPosition(target.to_string()));
            }
            state.position_sec = target.max(0.0);
            if state.is_playing {
                state.started_at = Some(now_ms);
            }
            Transition::Applied
        }
        Intent::Next => {
            require_tracks(state)?;
            advance(state, now_ms);
            Transition::Applied
        }
        Intent::Prev => {
            require_tracks(state)?;
            if state.live_position(now_ms) > PREV_RESTART_THRESHOLD_SECS {
                state.position_sec = 0.0;
                state.started_at = state.is_playing.then_some(now_ms);
            } else {
                let len = state.playlist.len();
                state.current_index = (state.current_index + len - 1) % len;
                state.start_from_top(now_ms);
            }
            Transition::Applied
        }
        Intent::SelectIndex(index) => {
            if index >= state.playlist.len() {
                return Err(PlaybackError::InvalidIndex(index.to_string()));
            }
            state.current_index = index;
            state.start_from_top(now_ms);
            Transition::Applied
        }
        Intent::TrackEnded { index } => {
            require_tracks(state)?;
            let stale_report = index.is_some_and(|i| i != state.current_index);
            let just_started = state.live_position(now_ms) < TRACK_ENDED_DEBOUNCE_SECS;
            if !state.is_playing || stale_report || just_started {
                Transition::Ignored
            } else {
                advance(state, now_ms);
                Transition::Applied
            }
        }
        Intent::RefreshPlaylist(playlist) => {
            replace_playlist(state, playlist, now_ms);
            Transition::Applied
        }
    };

    if transition == Transition::Applied {
        state.bump_version();
    }
    Ok(transition)
}

fn require_tracks(state: &PlaybackState) -> Result<(), PlaybackError> {
    if state.playlist.is_empty() {
        Err(PlaybackError::EmptyPlaylist)
    } else {
        Ok(())
    }
}

/// Moves to the next track circularly and starts it.
fn advance(state: &mut PlaybackState, now_ms: u64) {
    state.current_index = (state.current_index + 1) % state.playlist.len();
    state.start_from_top(now_ms);
}

/// Swaps the playlist, following the current track by filename.
///
/// If the current track disappeared the room is parked, paused, on the first
/// track; it never resumes onto a different track on its own.
fn replace_playlist(state: &mut PlaybackState, playlist: Vec<Track>, now_ms: u64) {
    let current_filename = state.current_track().map(|t| t.filename.clone());
    let remapped = current_filename
        .as_deref()
        .and_then(|name| playlist.iter().position(|t| t.filename == name));

    state.playlist = playlist;
    match remapped {
        Some(index) => state.current_index = index,
        None => {
            state.current_index = 0;
            state.position_sec = 0.0;
            state.is_playing = false;
            state.started_at = None;
        }
    }
    // Re-anchor so the frozen position does not carry stale elapsed time twice.
    if state.is_playing {
        state.position_sec = state.live_position(now_ms);
        state.started_at = Some(now_ms);
    }
}
