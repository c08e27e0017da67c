//! Time helpers for trim ranges.
//!
//! Media time is carried as `f64` seconds, the unit the playback surface
//! reports. The clamping rules for the two trim points live here so the
//! session model and the tests share a single definition.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum distance, in seconds, kept between the trim start and trim end.
pub const MIN_TRIM_GAP: f64 = 0.1;

/// The `[start, end]` sub-interval of the source selected for export.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrimRange {
    /// Start time in seconds (inclusive)
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

impl TrimRange {
    /// Both points at zero, used before the media duration is known.
    pub const EMPTY: Self = Self {
        start: 0.0,
        end: 0.0,
    };

    /// Create a new range without any clamping.
    #[inline]
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// The full `[0, duration]` range.
    #[inline]
    pub fn full(duration: f64) -> Self {
        Self {
            start: 0.0,
            end: duration.max(0.0),
        }
    }

    /// Length of the range, never negative.
    #[inline]
    pub fn duration(self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Check `0 <= start < end <= media_duration`.
    pub fn is_valid_for(self, media_duration: f64) -> bool {
        0.0 <= self.start && self.start < self.end && self.end <= media_duration
    }

    /// Move the start point to `t`.
    ///
    /// `t` is first clamped to `[0, media_duration]`, then kept at least
    /// [`MIN_TRIM_GAP`] before the current end.
    pub fn with_start(self, t: f64, media_duration: f64) -> Self {
        let t = t.clamp(0.0, media_duration);
        let start = t.min(self.end - MIN_TRIM_GAP).max(0.0);
        Self { start, ..self }
    }

    /// Move the end point to `t`.
    ///
    /// `t` is first clamped to `[0, media_duration]`, then kept at least
    /// [`MIN_TRIM_GAP`] after the current start.
    pub fn with_end(self, t: f64, media_duration: f64) -> Self {
        let t = t.clamp(0.0, media_duration);
        let end = t.max(self.start + MIN_TRIM_GAP).min(media_duration);
        Self { end, ..self }
    }
}

impl fmt::Display for TrimRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", format_time(self.start), format_time(self.end))
    }
}

/// Format seconds as `M:SS.t` for display.
///
/// Negative and non-finite values render as `0:00.0`.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00.0".to_string();
    }
    let tenths = (seconds * 10.0).floor() as u64;
    let minutes = tenths / 600;
    let secs = (tenths % 600) / 10;
    let frac = tenths % 10;
    format!("{minutes}:{secs:02}.{frac}")
}
