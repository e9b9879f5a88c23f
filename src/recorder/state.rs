//! Recording session state
//!
//! Defines the session state machine and the per-session bookkeeping.

use crate::capture::CaptureOptions;
use crate::project::SessionMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Current state of the recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session in progress
    #[default]
    Idle,
    /// Counting down before capture starts
    Countdown,
    /// Capture in progress
    Recording,
    /// Post-processing pipeline running (or failed)
    Processing,
}

/// Capture settings chosen by the user for a new recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfig {
    /// Monitor to capture (None = primary)
    #[serde(default)]
    pub monitor_id: Option<u32>,

    /// Whether to capture the screen
    pub capture_screen: bool,

    /// Whether to capture microphone audio
    pub capture_audio: bool,

    /// Whether to capture the webcam
    pub capture_webcam: bool,

    /// Whether to build a vertical variant after recording
    pub create_vertical: bool,

    /// Logo overlay to burn into the output
    #[serde(default)]
    pub logo: Option<String>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            monitor_id: None,
            capture_screen: true,
            capture_audio: true,
            capture_webcam: false,
            create_vertical: false,
            logo: None,
        }
    }
}

impl RecordingConfig {
    /// Resolve into supervisor options for a concrete session directory
    pub fn resolve(&self, output_dir: PathBuf, metadata_path: PathBuf) -> CaptureOptions {
        CaptureOptions {
            output_dir,
            monitor_id: self.monitor_id,
            capture_screen: self.capture_screen,
            capture_audio: self.capture_audio,
            capture_webcam: self.capture_webcam,
            create_vertical: self.create_vertical,
            logo: self.logo.clone(),
            metadata_path,
        }
    }
}

/// One recording, from countdown to the end of processing
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub state: SessionState,
    pub config: RecordingConfig,

    /// Seconds left while counting down
    pub countdown_remaining: u32,

    /// Options the capture was started with
    pub options: Option<CaptureOptions>,

    /// Descriptor persisted for this session
    pub metadata: Option<SessionMetadata>,

    pub recording_started_at: Option<DateTime<Utc>>,

    /// Set once the pipeline succeeded and the completion hold is running
    pub completing: bool,
}

impl Session {
    /// A fresh idle session
    pub fn idle() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            config: RecordingConfig::default(),
            countdown_remaining: 0,
            options: None,
            metadata: None,
            recording_started_at: None,
            completing: false,
        }
    }

    pub fn output_dir(&self) -> Option<&PathBuf> {
        self.options.as_ref().map(|o| &o.output_dir)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::idle()
    }
}
