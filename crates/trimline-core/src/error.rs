//! Error types for Trimline.

use thiserror::Error;

/// Notice shown to the user when an export fails for reasons other than cancellation.
pub const EXPORT_FAILED_NOTICE: &str = "Failed to export video";

/// Notice shown to the user when they cancel an export.
pub const EXPORT_CANCELLED_NOTICE: &str = "Export cancelled";

/// Main error type for Trimline operations.
#[derive(Error, Debug)]
pub enum TrimlineError {
    /// An operation was attempted while its preconditions were false.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The user asked for the running operation to stop.
    #[error("Cancellation requested")]
    CancellationRequested,

    #[error("Transcode engine failure: {0}")]
    EngineFailure(String),

    /// Releasing a handle failed. Logged, never fatal.
    #[error("Resource cleanup warning: {0}")]
    ResourceCleanup(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TrimlineError {
    /// Whether this error should ever reach the user.
    ///
    /// `InvalidState` is a local no-op and `ResourceCleanup` is diagnostic only.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::InvalidState(_) | Self::ResourceCleanup(_))
    }

    /// Whether this error is a user-initiated cancellation rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::CancellationRequested)
    }

    /// Text to show the user for this error.
    ///
    /// Engine failures map to a generic notice so internal detail stays in the logs.
    pub fn user_notice(&self) -> String {
        match self {
            Self::CancellationRequested => EXPORT_CANCELLED_NOTICE.to_string(),
            Self::EngineFailure(_) => EXPORT_FAILED_NOTICE.to_string(),
            Self::UnsupportedFormat(_) => {
                "Unsupported file type. Please choose an MP4, MOV or WEBM video".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for Trimline operations.
pub type Result<T> = std::result::Result<T, TrimlineError>;
