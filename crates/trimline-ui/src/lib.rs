//! Trimline UI - toolkit-agnostic interaction layer
//!
//! Provides the pieces a front end wires its input and video element into:
//! - Timeline interaction controller (two draggable trim handles)
//! - Playback surface abstraction and the bridge that mirrors it into the session
//! - A headless playback surface for command-line use and tests

pub mod playback;
pub mod trim;

pub use playback::{HeadlessSurface, PlaybackBridge, PlaybackNotification, PlaybackSurface};
pub use trim::{
    hit_test_trim_handle, DragState, PointerEvent, PressOutcome, Propagation, TimelineController,
    TouchPhase, TrimEdge,
};
