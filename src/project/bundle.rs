//! Session metadata read/write operations
//!
//! A session directory contains:
//! - session.json: the session descriptor
//! - the files produced by the capture supervisor

use super::schema::SessionMetadata;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the descriptor inside a session directory
pub const METADATA_FILE: &str = "session.json";

/// Metadata-related errors
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid session directory: {0}")]
    InvalidSession(String),

    #[error("Missing required file: {0}")]
    MissingFile(String),
}

/// Persists session descriptors
pub trait MetadataStore: Send + Sync {
    /// Write the initial descriptor; returns its path
    fn create(&self, session_dir: &Path, metadata: &SessionMetadata)
        -> Result<PathBuf, MetadataError>;

    /// Read the descriptor as currently stored
    fn load(&self, session_dir: &Path) -> Result<SessionMetadata, MetadataError>;

    /// Overwrite an existing descriptor
    fn update(&self, session_dir: &Path, metadata: &SessionMetadata)
        -> Result<(), MetadataError>;
}

/// Stores descriptors as pretty-printed JSON files
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMetadataStore;

impl MetadataStore for JsonMetadataStore {
    fn create(
        &self,
        session_dir: &Path,
        metadata: &SessionMetadata,
    ) -> Result<PathBuf, MetadataError> {
        if !session_dir.is_dir() {
            return Err(MetadataError::InvalidSession(format!(
                "{:?} is not a directory",
                session_dir
            )));
        }
        let path = metadata_path(session_dir);
        write_metadata(&path, metadata)?;
        tracing::debug!("Created session metadata {:?}", path);
        Ok(path)
    }

    fn load(&self, session_dir: &Path) -> Result<SessionMetadata, MetadataError> {
        read_metadata(session_dir)
    }

    fn update(&self, session_dir: &Path, metadata: &SessionMetadata) -> Result<(), MetadataError> {
        let path = metadata_path(session_dir);
        if !path.exists() {
            return Err(MetadataError::MissingFile(METADATA_FILE.to_string()));
        }
        write_metadata(&path, metadata)?;
        tracing::debug!("Updated session metadata {:?} ({:?})", path, metadata.status);
        Ok(())
    }
}

/// Path of the descriptor for a session directory
pub fn metadata_path(session_dir: &Path) -> PathBuf {
    session_dir.join(METADATA_FILE)
}

/// Read a descriptor from a session directory
pub fn read_metadata(session_dir: &Path) -> Result<SessionMetadata, MetadataError> {
    let path = metadata_path(session_dir);
    if !path.exists() {
        return Err(MetadataError::MissingFile(METADATA_FILE.to_string()));
    }
    let content = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_metadata(path: &Path, metadata: &SessionMetadata) -> Result<(), MetadataError> {
    let content = serde_json::to_string_pretty(metadata)?;
    // Write to a sibling file first so readers never see a partial descriptor
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
