//! Trimline Media - FFmpeg integration and export orchestration
//!
//! This crate handles:
//! - The transcode engine seam and its FFmpeg implementation
//! - Encoder presets and speed filters
//! - Media duration probing
//! - Sequencing cancellable exports against a trim session

pub mod encode;
pub mod engine;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod probe;

pub use encode::{AudioCodec, EncodeSettings, VideoCodec};
pub use engine::{EngineFactory, ProgressFn, TranscodeEngine, TranscodeRequest};
pub use error::EngineError;
pub use export::{
    output_name, ExportEvent, ExportOrchestrator, ExportOutcome, ExportSettings,
    DEFAULT_OUTPUT_PREFIX,
};
pub use ffmpeg::{is_ffmpeg_installed, FfmpegEngine};
pub use probe::probe_duration;
