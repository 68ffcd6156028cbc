//! Position / rotation / scale transform

use glam::{Mat3, Vec2};
use serde::{Deserialize, Serialize};

/// Affine 2D transform.
///
/// The matrix is `T(position) · R(rotation) · S(scale)`: a local point is
/// scaled first, then rotated (radians, counter-clockwise), then translated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform2D {
    pub position: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
}

impl Transform2D {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        position: Vec2::ZERO,
        rotation: 0.0,
        scale: Vec2::ONE,
    };

    /// Create a transform from a position
    #[must_use]
    pub fn from_position(position: Vec2) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Affine matrix `T · R · S`
    #[must_use]
    pub fn matrix(&self) -> Mat3 {
        Mat3::from_scale_angle_translation(self.scale, self.rotation, self.position)
    }

    /// Transform a point
    #[must_use]
    pub fn apply(&self, point: Vec2) -> Vec2 {
        self.matrix().transform_point2(point)
    }

    /// Transform every point in `local` into `out`, reusing its allocation
    pub fn apply_all(&self, local: &[Vec2], out: &mut Vec<Vec2>) {
        let matrix = self.matrix();
        out.clear();
        out.extend(local.iter().map(|&p| matrix.transform_point2(p)));
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn test_identity() {
        let t = Transform2D::default();
        assert!(approx(t.apply(Vec2::new(3.0, -2.0)), Vec2::new(3.0, -2.0)));
    }

    #[test]
    fn test_scale_then_rotate_then_translate() {
        let t = Transform2D {
            position: Vec2::new(10.0, 0.0),
            rotation: FRAC_PI_2,
            scale: Vec2::new(2.0, 1.0),
        };

        // (1,0) -> scale (2,0) -> rotate 90° (0,2) -> translate (10,2)
        assert!(approx(t.apply(Vec2::X), Vec2::new(10.0, 2.0)));
        // (0,1) -> scale (0,1) -> rotate 90° (-1,0) -> translate (9,0)
        assert!(approx(t.apply(Vec2::Y), Vec2::new(9.0, 0.0)));
    }

    #[test]
    fn test_apply_all_reuses_buffer() {
        let t = Transform2D::from_position(Vec2::new(1.0, 1.0));
        let mut out = vec![Vec2::ZERO; 8];
        t.apply_all(&[Vec2::ZERO, Vec2::ONE], &mut out);
        assert_eq!(out, vec![Vec2::ONE, Vec2::splat(2.0)]);
    }
}
