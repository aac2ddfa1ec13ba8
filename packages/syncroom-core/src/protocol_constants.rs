//! Fixed protocol constants that should NOT be changed.
//!
//! These values are shared with browser clients and changing them would
//! change the behavior every replica in a room relies on.

// ─────────────────────────────────────────────────────────────────────────────
// Playback Synchronization
// ─────────────────────────────────────────────────────────────────────────────

/// Drift tolerated between a client's local playback and the predicted server
/// position before the client performs a hard seek (seconds).
pub const SEEK_HYSTERESIS_SECS: f64 = 0.25;

/// Once playback is past this offset, `prev` restarts the current track
/// instead of moving to the previous one (seconds).
pub const PREV_RESTART_THRESHOLD_SECS: f64 = 3.0;

/// `player:ended` reports arriving while the current track is younger than
/// this are treated as duplicates of an end that was already applied (seconds).
pub const TRACK_ENDED_DEBOUNCE_SECS: f64 = 1.0;

// ─────────────────────────────────────────────────────────────────────────────
// Rooms
// ─────────────────────────────────────────────────────────────────────────────

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 6;

/// Maximum accepted display name length (characters). Longer names are truncated.
pub const MAX_DISPLAY_NAME_LEN: usize = 32;

/// Display name used when a client sends an empty one.
pub const DEFAULT_DISPLAY_NAME: &str = "Listener";

// ─────────────────────────────────────────────────────────────────────────────
// Media Library
// ─────────────────────────────────────────────────────────────────────────────

/// File extensions (lowercase, without dot) picked up by a library scan.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "opus", "ogg", "wav"];

/// Artist used when a filename carries no `Artist - Title` separator.
pub const UNKNOWN_ARTIST: &str = "Unknown";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "syncroom";

/// Prefix of download job identifiers.
pub const DOWNLOAD_ID_PREFIX: &str = "dl_";

/// Finished download jobs kept for `GET /api/downloads`; older ones are dropped.
pub const MAX_FINISHED_DOWNLOADS: usize = 50;

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the event broadcast channel for WebSocket clients.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// WebSocket heartbeat timeout (seconds).
pub const WS_HEARTBEAT_TIMEOUT_SECS: u64 = 45;

/// Interval between WebSocket heartbeat checks (seconds).
pub const WS_HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 1;
