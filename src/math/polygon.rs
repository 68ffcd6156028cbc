//! Polygon predicates: cross products, convexity, winding

use glam::Vec2;

/// Rotational order of a triangle or polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winding {
    CounterClockwise,
    Clockwise,
    /// Zero area
    Degenerate,
}

/// Z component of the 2D cross product `a × b`
#[inline]
#[must_use]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Signed area of a polygon (shoelace). Positive for counter-clockwise order.
#[must_use]
pub fn signed_area(points: &[Vec2]) -> f32 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f32 = (0..n).map(|i| cross(points[i], points[(i + 1) % n])).sum();
    twice * 0.5
}

/// Winding of triangle ABC from `(B − A) × (C − B)`
#[must_use]
pub fn triangle_winding(a: Vec2, b: Vec2, c: Vec2) -> Winding {
    let z = cross(b - a, c - b);
    if z > 0.0 {
        Winding::CounterClockwise
    } else if z < 0.0 {
        Winding::Clockwise
    } else {
        Winding::Degenerate
    }
}

/// True if every pair of consecutive edges turns the same way.
///
/// Collinear edges (zero cross product) don't count against convexity.
/// Fewer than three points is never convex.
#[must_use]
pub fn is_convex(points: &[Vec2]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }

    let mut sign = 0.0_f32;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let c = points[(i + 2) % n];
        let z = cross(b - a, c - b);
        if z == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = z.signum();
        } else if z.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use super::*;

    fn hexagon() -> Vec<Vec2> {
        (0..6)
            .map(|i| {
                let angle = TAU * i as f32 / 6.0;
                Vec2::new(angle.cos(), angle.sin())
            })
            .collect()
    }

    #[test]
    fn test_regular_hexagon_is_convex() {
        let hex = hexagon();
        assert!(is_convex(&hex));

        let reversed: Vec<Vec2> = hex.iter().rev().copied().collect();
        assert!(is_convex(&reversed));
    }

    #[test]
    fn test_mixed_turns_are_not_convex() {
        // Arrow head: the notch at (1, 1) turns the other way.
        let concave = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 2.0),
        ];
        assert!(!is_convex(&concave));
    }

    #[test]
    fn test_degenerate_inputs_are_not_convex() {
        assert!(!is_convex(&[Vec2::ZERO, Vec2::X]));
        assert!(!is_convex(&[Vec2::ZERO, Vec2::X, Vec2::new(2.0, 0.0)]));
    }

    #[test]
    fn test_triangle_winding() {
        let (a, b, c) = (Vec2::ZERO, Vec2::X, Vec2::Y);
        assert_eq!(triangle_winding(a, b, c), Winding::CounterClockwise);
        assert_eq!(triangle_winding(a, c, b), Winding::Clockwise);
        assert_eq!(triangle_winding(a, a, b), Winding::Degenerate);
    }

    #[test]
    fn test_signed_area() {
        let square = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y];
        assert!((signed_area(&square) - 1.0).abs() < 1e-6);

        let reversed: Vec<Vec2> = square.iter().rev().copied().collect();
        assert!((signed_area(&reversed) + 1.0).abs() < 1e-6);
    }
}
