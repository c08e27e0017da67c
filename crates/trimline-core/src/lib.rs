//! Trimline Core - Foundation types for the trimmer
//!
//! This crate provides the fundamental types used throughout Trimline:
//! - Error taxonomy shared by every subsystem
//! - Time helpers (trim range, minimum gap, timecode display)
//! - Track geometry for pointer-to-time mapping
//! - Cooperative cancellation tokens
//! - Source media acceptance

pub mod cancel;
pub mod error;
pub mod geometry;
pub mod media;
pub mod time;

pub use cancel::CancelToken;
pub use error::{Result, TrimlineError};
pub use geometry::{Rect, Vec2};
pub use media::{ContainerKind, SourceMedia};
pub use time::{format_time, TrimRange, MIN_TRIM_GAP};

/// Playback speeds offered by the default controls.
pub const SPEED_PRESETS: [f64; 4] = [0.5, 1.0, 1.5, 2.0];
