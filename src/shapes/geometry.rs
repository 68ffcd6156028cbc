//! Local-space vertex generation for each shape kind

use std::f32::consts::TAU;

use glam::Vec2;

/// Two triangles over four corners
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// Counter-clockwise triangle
pub const TRIANGLE_INDICES: [u32; 3] = [0, 1, 2];

/// Same triangle with first and last index swapped
pub const TRIANGLE_INDICES_FLIPPED: [u32; 3] = [2, 1, 0];

/// Fewest segments a circle is generated with
pub const MIN_CIRCLE_SEGMENTS: u32 = 3;

/// Rectangle corners with the origin at the bottom-left corner
#[must_use]
pub fn rectangle(width: f32, height: f32) -> [Vec2; 4] {
    [
        Vec2::new(0.0, 0.0),
        Vec2::new(width, 0.0),
        Vec2::new(width, height),
        Vec2::new(0.0, height),
    ]
}

/// Number of vertices a circle fan with `segments` segments needs
#[must_use]
pub const fn circle_vertex_count(segments: u32) -> usize {
    segments as usize + 2
}

/// New circle fan: center, then `segments + 1` rim points closing the loop
#[must_use]
pub fn circle(radius: f32, segments: u32) -> Vec<Vec2> {
    let mut points = vec![Vec2::ZERO; circle_vertex_count(segments)];
    fill_circle(radius, segments, &mut points);
    points
}

/// Rewrite an existing circle fan in place.
///
/// `out` must hold exactly `segments + 2` points.
pub fn fill_circle(radius: f32, segments: u32, out: &mut [Vec2]) {
    debug_assert_eq!(out.len(), circle_vertex_count(segments));
    let Some((center, rim)) = out.split_first_mut() else {
        return;
    };
    *center = Vec2::ZERO;
    for (i, point) in rim.iter_mut().enumerate() {
        let angle = TAU * i as f32 / segments as f32;
        *point = Vec2::new(angle.cos(), angle.sin()) * radius;
    }
}

/// Corners of a line segment widened to `thickness`: `A+n, A−n, B−n, B+n`.
///
/// Coincident endpoints yield a zero-area quad.
#[must_use]
pub fn thick_line(start: Vec2, end: Vec2, thickness: f32) -> [Vec2; 4] {
    let direction = (end - start).normalize_or_zero();
    let normal = Vec2::new(-direction.y, direction.x) * (thickness * 0.5);
    [start + normal, start - normal, end - normal, end + normal]
}

/// Axis-aligned bounds as (min, max)
#[must_use]
pub fn bounds(points: &[Vec2]) -> (Vec2, Vec2) {
    points.iter().fold(
        (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
        |(min, max), &p| (min.min(p), max.max(p)),
    )
}
