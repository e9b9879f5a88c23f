//! Capture supervisor interface
//!
//! The supervisor owns the real recording and encoding work. The session
//! core only talks to it through this trait.

use crate::pipeline::ProgressSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a capture supervisor
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start capture: {0}")]
    Start(String),

    #[error("Failed to stop capture: {0}")]
    Stop(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("No capture in progress")]
    NotRecording,
}

/// Resolved options handed to the supervisor when capture starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOptions {
    /// Directory the session's files are written to
    pub output_dir: PathBuf,

    /// Monitor to capture (None = primary)
    pub monitor_id: Option<u32>,

    /// Whether the screen is captured
    pub capture_screen: bool,

    /// Whether microphone audio is captured
    pub capture_audio: bool,

    /// Whether the webcam is captured
    pub capture_webcam: bool,

    /// Whether a vertical variant is produced after recording
    pub create_vertical: bool,

    /// Logo overlay selection, if any
    pub logo: Option<String>,

    /// Session metadata file the supervisor updates as files are produced
    pub metadata_path: PathBuf,
}

/// Snapshot of the supervisor's capture state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    pub is_recording: bool,
    pub produced_files: Vec<PathBuf>,
}

/// External collaborator performing capture and post-processing
#[async_trait]
pub trait CaptureSupervisor: Send + Sync {
    /// Begin capturing with the given options
    async fn start(&self, options: &CaptureOptions) -> Result<(), CaptureError>;

    /// End the active capture
    async fn stop(&self) -> Result<(), CaptureError>;

    /// Current capture state
    async fn status(&self) -> CaptureStatus;

    /// Run the post-processing steps after `Stopping`, reporting each step
    /// to `sink`.
    ///
    /// Blocking; called from a dedicated worker thread.
    fn run_pipeline_with_progress(&self, sink: &ProgressSink) -> Result<(), CaptureError>;
}
