// SPDX-License-Identifier: MPL-2.0

//! Error types for the compositor

use crate::backends::camera::types::BackendError;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Pipeline lifecycle errors
    Pipeline(PipelineError),
    /// Capture or virtual camera backend errors
    Backend(BackendError),
    /// Configuration errors
    Config(String),
    /// Filesystem / stdin errors
    Io(String),
    /// Generic error with message
    Other(String),
}

/// Errors surfaced by the reconfiguration controller
///
/// Per-frame failures never show up here; they are reported and the frame
/// continues (or is dropped) without stopping the pipeline.
#[derive(Debug, Clone)]
pub enum PipelineError {
    /// The capture device could not be acquired (denied or unavailable)
    Acquisition(BackendError),
    /// The stage chain could not be built
    Assembly(String),
}

/// Per-frame stage failures
///
/// These are transient: they are logged and the pipeline keeps running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Raw frame could not be converted to a raster buffer
    Decode(String),
    /// Sharpness scoring failed (frame passes through without a metric)
    Scoring(String),
    /// Segmentation failed (frame passes through unblended)
    Segmentation(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Pipeline(e) => write!(f, "Pipeline error: {}", e),
            AppError::Backend(e) => write!(f, "Backend error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Io(msg) => write!(f, "I/O error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Acquisition(e) => write!(f, "Failed to acquire capture source: {}", e),
            PipelineError::Assembly(msg) => write!(f, "Failed to assemble pipeline: {}", msg),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Decode(msg) => write!(f, "Decode failed: {}", msg),
            StageError::Scoring(msg) => write!(f, "Scoring failed: {}", msg),
            StageError::Segmentation(msg) => write!(f, "Segmentation failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for PipelineError {}
impl std::error::Error for StageError {}

// Conversions from sub-errors to AppError
impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Backend(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_error_display() {
        let err = PipelineError::Acquisition(BackendError::PermissionDenied("portal".into()));
        assert_eq!(
            err.to_string(),
            "Failed to acquire capture source: Permission denied: portal"
        );
    }

    #[test]
    fn test_app_error_from_pipeline_error() {
        let err: AppError = PipelineError::Assembly("no stages".into()).into();
        assert!(matches!(err, AppError::Pipeline(PipelineError::Assembly(_))));
    }
}
