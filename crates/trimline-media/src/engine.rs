//! The transcode engine seam.

use std::sync::Arc;
use trimline_core::{CancelToken, ContainerKind, SourceMedia, TrimRange};

use crate::encode::EncodeSettings;
use crate::error::EngineError;

/// Everything an engine needs to produce one trimmed clip.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub source: Arc<[u8]>,
    pub kind: ContainerKind,
    pub range: TrimRange,
    pub speed: f64,
    pub encode: EncodeSettings,
}

impl TranscodeRequest {
    pub fn new(media: &SourceMedia, range: TrimRange, speed: f64, encode: EncodeSettings) -> Self {
        Self {
            source: media.data(),
            kind: media.kind(),
            range,
            speed,
            encode,
        }
    }
}

/// Progress sink handed to [`TranscodeEngine::transcode`]. Receives 0 to 100.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// An encoder that turns a source buffer and a trim range into an output buffer.
///
/// Calls are blocking. Implementations report non-decreasing percentages and
/// should observe `cancel` between units of work, returning
/// [`EngineError::Cancelled`] when they stop early.
pub trait TranscodeEngine: Send + Sync {
    /// One-time initialization. Cheap when already prepared.
    fn prepare(&self) -> Result<(), EngineError>;

    fn transcode(
        &self,
        request: &TranscodeRequest,
        on_progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, EngineError>;

    /// Discard internal state. The next call must `prepare()` again.
    fn reset(&self);
}

/// Builds a fresh engine instance, used when an engine has to be discarded.
pub type EngineFactory = Box<dyn Fn() -> Arc<dyn TranscodeEngine> + Send + Sync>;
