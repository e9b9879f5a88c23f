//! Session metadata management
//!
//! This module handles the descriptor stored in each session directory.

pub mod bundle;
pub mod schema;

pub use bundle::{JsonMetadataStore, MetadataError, MetadataStore};
pub use schema::{SessionMetadata, SessionStatus};
