//! Capture collaborator
//!
//! Interface to the external supervisor that performs screen, audio and
//! webcam capture.

pub mod traits;

pub use traits::{CaptureError, CaptureOptions, CaptureStatus, CaptureSupervisor};
