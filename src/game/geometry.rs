//! Collision Geometry
//!
//! Rectangle and circle primitives for paddle/ball collision. Tests are
//! inclusive: a ball exactly tangent to an edge counts as a hit.

use serde::{Deserialize, Serialize};

use crate::core::vec2::Vec2;

/// Axis-aligned rectangle, top-left origin, y grows downward.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub w: f32,
    /// Height.
    pub h: f32,
}

impl Rect {
    /// Create a new rectangle.
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Right edge.
    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    /// Bottom edge.
    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    /// Rectangle translated by `(dx, dy)`.
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Whether this rectangle fits entirely inside `bounds` (edges may touch).
    pub fn within(&self, bounds: &Rect) -> bool {
        self.x >= bounds.x
            && self.y >= bounds.y
            && self.right() <= bounds.right()
            && self.bottom() <= bounds.bottom()
    }
}

/// Check if a circle overlaps a rectangle (inclusive of tangency).
#[inline]
pub fn circle_intersects_rect(center: Vec2, radius: f32, rect: &Rect) -> bool {
    let nearest_x = center.x.clamp(rect.x, rect.right());
    let nearest_y = center.y.clamp(rect.y, rect.bottom());
    center.distance_squared(Vec2::new(nearest_x, nearest_y)) <= radius * radius
}

/// Check if the circle's vertical span overlaps the rectangle's (inclusive).
#[inline]
pub fn vertical_overlap(center_y: f32, radius: f32, rect: &Rect) -> bool {
    center_y + radius >= rect.y && center_y - radius <= rect.bottom()
}

/// Check whether a moving edge crossed (or landed on) a face between two
/// sampled positions. Catches tunneling through thin paddles at high ball
/// speeds, where the end position alone would already be past the face.
#[inline]
pub fn crossed_face(prev_edge: f32, new_edge: f32, face: f32) -> bool {
    (prev_edge - face) * (new_edge - face) <= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_rect_overlap() {
        let rect = Rect::new(10.0, 10.0, 20.0, 100.0);

        // Clearly inside
        assert!(circle_intersects_rect(Vec2::new(20.0, 50.0), 5.0, &rect));
        // Clearly outside
        assert!(!circle_intersects_rect(Vec2::new(100.0, 50.0), 5.0, &rect));
    }

    #[test]
    fn test_tangent_counts_as_hit() {
        let rect = Rect::new(10.0, 10.0, 20.0, 100.0);

        // Ball center 5 units right of the right edge, radius exactly 5
        assert!(circle_intersects_rect(Vec2::new(35.0, 50.0), 5.0, &rect));
        // One unit farther misses
        assert!(!circle_intersects_rect(Vec2::new(36.0, 50.0), 5.0, &rect));
    }

    #[test]
    fn test_within_bounds() {
        let bounds = Rect::new(0.0, 0.0, 800.0, 600.0);
        let paddle = Rect::new(10.0, 0.0, 20.0, 100.0);

        assert!(paddle.within(&bounds));
        assert!(!paddle.translated(0.0, -1.0).within(&bounds));
        assert!(paddle.translated(0.0, 500.0).within(&bounds));
        assert!(!paddle.translated(0.0, 501.0).within(&bounds));
    }

    #[test]
    fn test_crossed_face() {
        // Moving left through the face at x=30
        assert!(crossed_face(32.0, 28.0, 30.0));
        // Landing exactly on it
        assert!(crossed_face(32.0, 30.0, 30.0));
        // Still on the approach side
        assert!(!crossed_face(40.0, 32.0, 30.0));
        // Already past before the step
        assert!(!crossed_face(28.0, 20.0, 30.0));
    }
}
