//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics.

use serde::{Deserialize, Serialize};

/// 2D point/vector used for positions, input targets, and movement deltas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
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

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(self.x + (to.x - self.x) * t, self.y + (to.y - self.y) * t)
    }

    /// Normalized direction toward `self`, or `Point::ZERO` if the vector is degenerate.
    pub fn normalized(self) -> Self {
        let len = self.len();
        if len <= f32::EPSILON {
            Self::ZERO
        } else {
            Self::new(self.x / len, self.y / len)
        }
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Point {
    type Output = Point;
    fn mul(self, rhs: f32) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// Cardinal view direction attached to an entity's facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewDir {
    North,
    East,
    South,
    West,
}

impl ViewDir {
    /// Picks the closest cardinal direction for a movement vector.
    /// Returns `None` for a degenerate (zero-length) vector.
    pub fn from_delta(delta: Point) -> Option<Self> {
        if delta.len_sq() <= f32::EPSILON {
            return None;
        }
        if delta.x.abs() >= delta.y.abs() {
            Some(if delta.x >= 0.0 {
                ViewDir::East
            } else {
                ViewDir::West
            })
        } else {
            Some(if delta.y >= 0.0 {
                ViewDir::North
            } else {
                ViewDir::South
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_lerp_midpoint() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(2.0, 4.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Point::new(1.0, 2.0));
    }

    #[test]
    fn view_dir_prefers_dominant_axis() {
        assert_eq!(ViewDir::from_delta(Point::new(1.0, 0.2)), Some(ViewDir::East));
        assert_eq!(ViewDir::from_delta(Point::new(-1.0, 0.2)), Some(ViewDir::West));
        assert_eq!(ViewDir::from_delta(Point::new(0.2, 1.0)), Some(ViewDir::North));
        assert_eq!(ViewDir::from_delta(Point::new(0.0, 0.0)), None);
    }
}
