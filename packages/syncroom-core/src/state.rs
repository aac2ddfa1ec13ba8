//! Core configuration types.
//!
//! [`Config`] is platform-independent; the server binary builds it from its
//! YAML/env/CLI layers and hands it to [`crate::bootstrap_services`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    EVENT_CHANNEL_CAPACITY, WS_HEARTBEAT_CHECK_INTERVAL_SECS, WS_HEARTBEAT_TIMEOUT_SECS,
};

/// External download tool invocation.
///
/// The query is appended as the last argument:
/// `command [args...] <query>`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
    /// Executable to run (e.g. a wrapper script around yt-dlp).
    pub command: String,

    /// Arguments placed before the query.
    pub args: Vec<String>,

    /// Working directory of the tool. Defaults to the process working directory.
    pub working_dir: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            command: "./download_song.sh".to_string(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

/// Configuration for the syncroom service.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Optional directory with the browser client, served at `/`.
    pub static_dir: Option<PathBuf>,

    // Library
    /// Directory holding the audio files, served at `/songs`.
    pub songs_dir: PathBuf,

    /// Playlist manifest (JSON array of tracks).
    pub manifest_path: PathBuf,

    // Downloads
    pub download: DownloadConfig,

    // WebSocket
    /// WebSocket heartbeat timeout (seconds).
    pub ws_heartbeat_timeout_secs: u64,

    /// Interval between WebSocket heartbeat checks (seconds).
    pub ws_heartbeat_check_interval_secs: u64,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.ws_heartbeat_check_interval_secs == 0 {
            return Err("ws_heartbeat_check_interval_secs must be >= 1".to_string());
        }
        if self.ws_heartbeat_timeout_secs < self.ws_heartbeat_check_interval_secs {
            return Err(
                "ws_heartbeat_timeout_secs must not be shorter than the check interval"
                    .to_string(),
            );
        }
        if self.download.command.trim().is_empty() {
            return Err("download.command must not be empty".to_string());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 3000,
            static_dir: None,
            songs_dir: PathBuf::from("public/songs"),
            manifest_path: PathBuf::from("songs.json"),
            download: DownloadConfig::default(),
            ws_heartbeat_timeout_secs: WS_HEARTBEAT_TIMEOUT_SECS,
            ws_heartbeat_check_interval_secs: WS_HEARTBEAT_CHECK_INTERVAL_SECS,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}
