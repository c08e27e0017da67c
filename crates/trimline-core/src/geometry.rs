//! Geometric primitives for mapping pointer positions onto the timeline track.

use glam::Vec2 as GlamVec2;
use serde::{Deserialize, Serialize};

/// 2D vector.
pub type Vec2 = GlamVec2;

/// Axis-aligned rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle.
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn left(self) -> f32 {
        self.x
    }

    /// Whether the rectangle has a usable, finite, positive width.
    #[inline]
    pub fn is_measurable(self) -> bool {
        self.x.is_finite() && self.width.is_finite() && self.width > 0.0
    }

    /// Check if a point is inside the rectangle.
    #[inline]
    pub fn contains(self, point: Vec2) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }

    /// Horizontal position of `x` as a fraction of the width, clamped to `[0, 1]`.
    ///
    /// Returns `None` when the rectangle cannot be measured.
    pub fn fraction_x(self, x: f32) -> Option<f32> {
        if !self.is_measurable() || !x.is_finite() {
            return None;
        }
        Some(((x - self.x) / self.width).clamp(0.0, 1.0))
    }

    /// Screen x coordinate for a fraction of the width.
    #[inline]
    pub fn x_at_fraction(self, fraction: f32) -> f32 {
        self.x + self.width * fraction.clamp(0.0, 1.0)
    }
}
