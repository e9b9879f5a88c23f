//! Session metadata schema
//!
//! The descriptor written into a session directory before capture starts
//! and updated as the session moves through processing.

use crate::recorder::state::RecordingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Format identifier stored in every descriptor
pub const METADATA_FORMAT: &str = "screenrec-session-v1";

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Recording,
    Processing,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub id: Uuid,
    pub version: String,
    pub format: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SessionStatus,

    /// Capture settings the session was started with
    pub config: RecordingConfig,

    /// Files produced so far, relative or absolute as reported by the supervisor
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Recording length, known once capture stops
    #[serde(default)]
    pub duration_ms: Option<i64>,

    #[serde(default)]
    pub error: Option<String>,
}

impl SessionMetadata {
    pub fn new(id: Uuid, config: RecordingConfig) -> Self {
        let now = Utc::now();
        Self {
            id,
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: METADATA_FORMAT.to_string(),
            created_at: now,
            updated_at: now,
            status: SessionStatus::Recording,
            config,
            files: Vec::new(),
            duration_ms: None,
            error: None,
        }
    }

    /// Move to a new status, stamping the update time
    pub fn mark(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Record produced files, keeping any already listed
    pub fn add_files(&mut self, files: impl IntoIterator<Item = PathBuf>) {
        for file in files {
            if !self.files.contains(&file) {
                self.files.push(file);
            }
        }
    }
}
