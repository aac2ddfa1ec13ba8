//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use syncroom_core::{Config, DownloadConfig};

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `SYNCROOM_BIND_PORT`
    pub bind_port: u16,

    /// Directory holding the audio files.
    /// Override: `SYNCROOM_SONGS_DIR`
    pub songs_dir: PathBuf,

    /// Playlist manifest written by library scans.
    /// Override: `SYNCROOM_MANIFEST`
    pub manifest_path: PathBuf,

    /// Browser client served at `/`, if any.
    /// Override: `SYNCROOM_STATIC_DIR`
    pub static_dir: Option<PathBuf>,

    /// Program run for each download; the query is appended as the last argument.
    /// Override: `SYNCROOM_DOWNLOAD_COMMAND`
    pub download_command: String,

    /// Extra arguments placed before the query.
    pub download_args: Vec<String>,

    /// Seconds of silence before a WebSocket is dropped.
    /// Override: `SYNCROOM_WS_HEARTBEAT_TIMEOUT`
    pub ws_heartbeat_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = Config::default();
        Self {
            bind_port: core.preferred_port,
            songs_dir: core.songs_dir,
            manifest_path: core.manifest_path,
            static_dir: core.static_dir,
            download_command: core.download.command,
            download_args: core.download.args,
            ws_heartbeat_timeout_secs: core.ws_heartbeat_timeout_secs,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `SYNCROOM_*` overrides looked up through `var`.
    ///
    /// Values that fail to parse are ignored.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("SYNCROOM_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }

        if let Some(dir) = var("SYNCROOM_SONGS_DIR") {
            self.songs_dir = PathBuf::from(dir);
        }

        if let Some(path) = var("SYNCROOM_MANIFEST") {
            self.manifest_path = PathBuf::from(path);
        }

        if let Some(dir) = var("SYNCROOM_STATIC_DIR") {
            self.static_dir = Some(PathBuf::from(dir));
        }

        if let Some(command) = var("SYNCROOM_DOWNLOAD_COMMAND") {
            self.download_command = command;
        }

        if let Some(timeout) =
            var("SYNCROOM_WS_HEARTBEAT_TIMEOUT").and_then(|v| v.parse().ok())
        {
            self.ws_heartbeat_timeout_secs = timeout;
        }

        // Note: SYNCROOM_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to syncroom-core's Config type.
    pub fn to_core_config(&self) -> Config {
        Config {
            preferred_port: self.bind_port,
            static_dir: self.static_dir.clone(),
            songs_dir: self.songs_dir.clone(),
            manifest_path: self.manifest_path.clone(),
            download: DownloadConfig {
                command: self.download_command.clone(),
                args: self.download_args.clone(),
                ..Default::default()
            },
            ws_heartbeat_timeout_secs: self.ws_heartbeat_timeout_secs,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_core() {
        let config = ServerConfig::default().to_core_config();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn loads_partial_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("syncroom.yaml");
        std::fs::write(
            &path,
            "bind_port: 8080\nsongs_dir: /srv/music\ndownload_args: [\"--quiet\"]\n",
        )
        .unwrap();

        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.songs_dir, PathBuf::from("/srv/music"));
        assert_eq!(config.manifest_path, PathBuf::from("songs.json"));
        assert_eq!(config.to_core_config().download.args, vec!["--quiet"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(ServerConfig::load(Some(&tmp.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let vars: HashMap<&str, &str> = [
            ("SYNCROOM_BIND_PORT", "9000"),
            ("SYNCROOM_SONGS_DIR", "/data/songs"),
            ("SYNCROOM_WS_HEARTBEAT_TIMEOUT", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.bind_port, 9000);
        assert_eq!(config.songs_dir, PathBuf::from("/data/songs"));
        assert_eq!(
            config.ws_heartbeat_timeout_secs,
            ServerConfig::default().ws_heartbeat_timeout_secs
        );
    }
}
