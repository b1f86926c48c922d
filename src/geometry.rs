// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Planar joint geometry.

use serde::Serialize;

/// A 2D point in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    /// Horizontal position (0.0 = left edge, 1.0 = right edge).
    pub x: f32,
    /// Vertical position (0.0 = top edge, 1.0 = bottom edge).
    pub y: f32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Direction of the vector `self -> other`, in radians from the positive x-axis.
    ///
    /// Returns `None` for a zero-length or non-finite vector.
    fn heading_to(self, other: Self) -> Option<f32> {
        let (dx, dy) = (other.x - self.x, other.y - self.y);
        if !dx.is_finite() || !dy.is_finite() || (dx == 0.0 && dy == 0.0) {
            return None;
        }
        Some(dy.atan2(dx))
    }
}

impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

/// Unsigned angle in degrees at vertex `b`, between the arms `b -> a` and `b -> c`.
///
/// The result is in `[0, 180]`. A zero-length arm has no direction, so the
/// angle is `None` in that case.
///
/// # Example
///
/// ```
/// use posture_analyzer::geometry::{joint_angle, Point};
///
/// let angle = joint_angle(Point::new(0.0, 1.0), Point::new(0.0, 0.0), Point::new(1.0, 0.0));
/// assert!((angle.unwrap() - 90.0).abs() < 1e-4);
/// ```
#[must_use]
pub fn joint_angle(a: Point, b: Point, c: Point) -> Option<f32> {
    let to_c = b.heading_to(c)?;
    let to_a = b.heading_to(a)?;

    let angle = (to_c - to_a).to_degrees().abs();
    Some(if angle > 180.0 { 360.0 - angle } else { angle })
}
