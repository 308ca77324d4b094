//! Math types.
//!
//! The world is a flat playfield measured in world units with the origin in
//! the top-left corner and `y` growing downwards.

use serde::{Deserialize, Serialize};

/// 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn len(self) -> f32 {
        self.len_sq().sqrt()
    }

    pub fn distance(self, to: Self) -> f32 {
        (to - self).len()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Scales the vector down to unit length if it is longer than one.
    ///
    /// Zero and sub-unit vectors are returned unchanged, so an analog stick
    /// at half tilt keeps its magnitude while a diagonal key press does not
    /// move faster than a single axis.
    pub fn clamp_unit(self) -> Self {
        let len_sq = self.len_sq();
        if len_sq > 1.0 {
            self * (1.0 / len_sq.sqrt())
        } else {
            self
        }
    }

    /// Linear interpolation with `t` clamped to `[0, 1]`.
    ///
    /// The endpoints are returned exactly at `t <= 0` and `t >= 1`.
    pub fn lerp(self, to: Self, t: f32) -> Self {
        if t <= 0.0 {
            return self;
        }
        if t >= 1.0 {
            return to;
        }
        Self::new(self.x + (to.x - self.x) * t, self.y + (to.y - self.y) * t)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned playfield bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Clamps the centre of a box with the given half extents so the whole
    /// box stays inside the playfield.
    pub fn clamp_center(&self, p: Vec2, half: Vec2) -> Vec2 {
        let max_x = (self.width - half.x).max(half.x);
        let max_y = (self.height - half.y).max(half.y);
        Vec2::new(p.x.clamp(half.x, max_x), p.y.clamp(half.y, max_y))
    }
}

/// Clamps to `[0, 1]`, mapping NaN to 0.
pub fn clamp01(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_lerp_midpoint() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(2.0, 4.0);
        assert_eq!(a.lerp(b, 0.5), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn vec2_lerp_endpoints_are_exact() {
        let a = Vec2::new(0.1, 0.7);
        let b = Vec2::new(0.3, 0.9);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 7.5), b);
        assert_eq!(a.lerp(b, -3.0), a);
    }

    #[test]
    fn diagonal_is_clamped_to_unit_length() {
        let d = Vec2::new(1.0, 1.0).clamp_unit();
        assert!((d.len() - 1.0).abs() < 1e-6);
        assert_eq!(Vec2::new(0.5, 0.0).clamp_unit(), Vec2::new(0.5, 0.0));
        assert_eq!(Vec2::ZERO.clamp_unit(), Vec2::ZERO);
    }

    #[test]
    fn bounds_keep_box_inside_playfield() {
        let b = Bounds::new(800.0, 600.0);
        let half = Vec2::new(10.0, 10.0);
        assert_eq!(b.clamp_center(Vec2::new(-5.0, 700.0), half), Vec2::new(10.0, 590.0));
        assert_eq!(b.clamp_center(Vec2::new(400.0, 300.0), half), Vec2::new(400.0, 300.0));
    }

    #[test]
    fn clamp01_handles_nan_and_range() {
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(clamp01(-2.0), 0.0);
        assert_eq!(clamp01(5.0), 1.0);
        assert_eq!(clamp01(0.25), 0.25);
    }
}
