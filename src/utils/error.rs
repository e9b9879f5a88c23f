//! Error types and handling
//!
//! Common error types used across the session core.

use crate::capture::CaptureError;
use crate::pipeline::state::PipelineError;
use crate::project::MetadataError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Error shown by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Metadata(_) => "METADATA_ERROR",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Pipeline(_) => "PIPELINE_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response: ErrorResponse =
            AppError::Capture(CaptureError::Start("no display".to_string())).into();
        assert_eq!(response.code, "CAPTURE_ERROR");
        assert_eq!(
            response.message,
            "Capture error: Failed to start capture: no display"
        );

        let response: ErrorResponse = AppError::Pipeline(PipelineError {
            step: None,
            message: "worker died".to_string(),
        })
        .into();
        assert_eq!(response.code, "PIPELINE_ERROR");
        assert_eq!(response.message, "Pipeline error: worker died");
    }

    #[test]
    fn test_session_setup_error_codes() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let response: ErrorResponse = AppError::from(io).into();
        assert_eq!(response.code, "IO_ERROR");

        let missing = MetadataError::MissingFile("session.json".to_string());
        let response: ErrorResponse = AppError::from(missing).into();
        assert_eq!(response.code, "METADATA_ERROR");
        assert_eq!(
            response.message,
            "Metadata error: Missing required file: session.json"
        );
    }
}
