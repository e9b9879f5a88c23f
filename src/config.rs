//! Session core configuration
//!
//! Loaded from a JSON file; every field falls back to its default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `recordings_dir`
pub const RECORDINGS_DIR_ENV: &str = "SCREENREC_RECORDINGS_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Parent directory for session directories
    pub recordings_dir: PathBuf,

    /// Seconds counted down before capture starts
    pub countdown_seconds: u32,

    /// How long the finished pipeline stays on screen before returning to idle
    pub complete_hold_ms: u64,

    /// Interval between external recording polls
    pub sentinel_interval_ms: u64,

    /// Capacity of the progress event queue
    pub event_queue_capacity: usize,

    /// Process names treated as screen capture tools
    pub capture_process_names: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recordings_dir: default_recordings_dir(),
            countdown_seconds: 3,
            complete_hold_ms: 1500,
            sentinel_interval_ms: 2000,
            event_queue_capacity: 64,
            capture_process_names: vec![
                "ffmpeg".to_string(),
                "obs".to_string(),
                "wf-recorder".to_string(),
                "gpu-screen-recorder".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config.with_env_overrides())
    }

    /// Load from a JSON file, falling back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default().with_env_overrides());
        }
        Self::load(path)
    }

    /// Persist to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var_os(RECORDINGS_DIR_ENV) {
            self.recordings_dir = PathBuf::from(dir);
        }
        self
    }

    /// Directory for a session that started at `started_at`
    pub fn session_dir(&self, started_at: DateTime<Utc>) -> PathBuf {
        self.recordings_dir
            .join(format!("recording-{}", started_at.format("%Y%m%d-%H%M%S")))
    }

    pub fn complete_hold(&self) -> Duration {
        Duration::from_millis(self.complete_hold_ms)
    }

    pub fn sentinel_interval(&self) -> Duration {
        Duration::from_millis(self.sentinel_interval_ms.max(1))
    }
}

fn default_recordings_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("screenrec")
}
