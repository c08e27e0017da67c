//! Transcode engine errors.

use thiserror::Error;
use trimline_core::TrimlineError;

/// Failure raised by a [`TranscodeEngine`](crate::TranscodeEngine).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine used before prepare()")]
    NotPrepared,

    /// The encoder binary is missing and could not be obtained.
    #[error("ffmpeg unavailable: {0}")]
    Unavailable(String),

    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),

    /// The encoder ran but reported an error or a non-zero exit.
    #[error("ffmpeg failed: {0}")]
    Process(String),

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoder produced no output")]
    MissingOutput,

    #[error("transcode cancelled")]
    Cancelled,
}

impl From<EngineError> for TrimlineError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Cancelled => TrimlineError::CancellationRequested,
            other => TrimlineError::EngineFailure(other.to_string()),
        }
    }
}
