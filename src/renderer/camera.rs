//! Orthographic 2D camera

use glam::{Mat4, Vec2, Vec3};

/// Orthographic camera looking at the XY plane.
///
/// World space is Y-up. The camera's position is the world point shown at
/// the center of the viewport, and `zoom` scales how many world units fit on
/// screen: at zoom 1 one world unit covers one pixel.
#[derive(Debug, Clone)]
pub struct Camera2D {
    /// Viewport size in pixels
    size: Vec2,
    /// Zoom factor (always > 0)
    zoom: f32,
    /// World position at the center of the view
    position: Vec2,
    projection: Mat4,
    view: Mat4,
    view_projection: Mat4,
}

impl Camera2D {
    /// Create a camera for a viewport of the given pixel size. An invalid
    /// size is logged and replaced by a 1x1 viewport.
    pub fn new(width: f32, height: f32) -> Self {
        let mut camera = Self {
            size: Vec2::ONE,
            zoom: 1.0,
            position: Vec2::ZERO,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
        };
        camera.set_size(width, height);
        camera.update_projection();
        camera.update_view();
        camera
    }

    /// Set the viewport size in pixels
    pub fn set_size(&mut self, width: f32, height: f32) {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            log::warn!("Ignoring invalid camera size {width}x{height}");
            return;
        }
        self.size = Vec2::new(width, height);
        self.update_projection();
    }

    /// Set the zoom factor. Values that are not finite and positive are ignored.
    pub fn set_zoom(&mut self, zoom: f32) {
        if !(zoom.is_finite() && zoom > 0.0) {
            log::warn!("Ignoring invalid camera zoom {zoom}");
            return;
        }
        self.zoom = zoom;
        self.update_projection();
    }

    /// Center the view on a world position
    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.update_view();
    }

    /// Pan the view by a world-space offset
    pub fn move_by(&mut self, delta: Vec2) {
        self.set_position(self.position + delta);
    }

    /// Zoom by `factor` while keeping the world point under `screen_point` fixed
    pub fn zoom_at(&mut self, screen_point: Vec2, factor: f32) {
        let anchor = self.screen_to_world(screen_point);
        self.set_zoom(self.zoom * factor);
        let drift = self.screen_to_world(screen_point) - anchor;
        self.move_by(-drift);
    }

    /// Viewport size in pixels
    pub fn size(&self) -> Vec2 {
        self.size
    }

    /// Current zoom factor
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// World position at the center of the view
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Half of the visible world extent on each axis
    pub fn half_extents(&self) -> Vec2 {
        self.size * 0.5 / self.zoom
    }

    /// Visible world-space rectangle as (min, max)
    pub fn visible_bounds(&self) -> (Vec2, Vec2) {
        let half = self.half_extents();
        (self.position - half, self.position + half)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    /// Get combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.view_projection
    }

    /// Convert a pixel position (top-left origin, Y down) to world space
    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        let ndc = Vec2::new(
            2.0 * screen.x / self.size.x - 1.0,
            1.0 - 2.0 * screen.y / self.size.y,
        );
        ndc * self.half_extents() + self.position
    }

    /// Convert a world position to pixels. Inverse of [`Self::screen_to_world`].
    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        let ndc = (world - self.position) / self.half_extents();
        Vec2::new(
            (ndc.x + 1.0) * 0.5 * self.size.x,
            (1.0 - ndc.y) * 0.5 * self.size.y,
        )
    }

    fn update_projection(&mut self) {
        let half = self.half_extents();
        self.projection = Mat4::orthographic_rh(-half.x, half.x, -half.y, half.y, -1.0, 1.0);
        self.view_projection = self.projection * self.view;
    }

    fn update_view(&mut self) {
        self.view = Mat4::from_translation(Vec3::new(-self.position.x, -self.position.y, 0.0));
        self.view_projection = self.projection * self.view;
    }
}

impl Default for Camera2D {
    fn default() -> Self {
        Self::new(1280.0, 720.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec2, b: Vec2, eps: f32) -> bool {
        (a - b).abs().max_element() < eps
    }

    #[test]
    fn test_center_maps_to_origin() {
        let mut camera = Camera2D::new(800.0, 600.0);
        camera.set_size(100.0, 100.0);
        camera.set_zoom(2.0);
        camera.set_position(Vec2::ZERO);

        let world = camera.screen_to_world(Vec2::new(50.0, 50.0));
        assert!(approx(world, Vec2::ZERO, 1e-5));
    }

    #[test]
    fn test_screen_world_round_trip() {
        let mut camera = Camera2D::new(1024.0, 768.0);
        camera.set_zoom(1.7);
        camera.set_position(Vec2::new(-12.5, 40.0));

        for &(x, y) in &[(0.0, 0.0), (1024.0, 768.0), (13.0, 700.0), (512.0, 1.5)] {
            let p = Vec2::new(x, y);
            let back = camera.world_to_screen(camera.screen_to_world(p));
            assert!(approx(back, p, 1e-3), "{p} -> {back}");
        }
    }

    #[test]
    fn test_screen_y_points_down() {
        let camera = Camera2D::new(200.0, 100.0);
        let top_left = camera.screen_to_world(Vec2::ZERO);
        assert!(approx(top_left, Vec2::new(-100.0, 50.0), 1e-5));
    }

    #[test]
    fn test_view_projection_matches_screen_mapping() {
        let mut camera = Camera2D::new(400.0, 300.0);
        camera.set_zoom(0.5);
        camera.set_position(Vec2::new(10.0, -20.0));

        // The top-right corner of the screen must land on NDC (1, 1).
        let world = camera.screen_to_world(Vec2::new(400.0, 0.0));
        let clip = camera.view_projection_matrix() * world.extend(0.0).extend(1.0);
        assert!((clip.x - 1.0).abs() < 1e-4);
        assert!((clip.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_zoom_is_ignored() {
        let mut camera = Camera2D::default();
        camera.set_zoom(3.0);
        camera.set_zoom(0.0);
        camera.set_zoom(-1.0);
        camera.set_zoom(f32::NAN);
        assert!((camera.zoom() - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_size_is_rejected() {
        let camera = Camera2D::new(0.0, 600.0);
        assert_eq!(camera.size(), Vec2::ONE);
        let screen = camera.world_to_screen(Vec2::new(0.25, -0.25));
        assert!(screen.is_finite());
        assert!((camera.screen_to_world(screen) - Vec2::new(0.25, -0.25)).abs().max_element() < 1e-5);

        let mut camera = Camera2D::new(800.0, 600.0);
        camera.set_size(f32::INFINITY, 600.0);
        camera.set_size(800.0, -1.0);
        assert_eq!(camera.size(), Vec2::new(800.0, 600.0));
    }

    #[test]
    fn test_zoom_at_keeps_anchor_fixed() {
        let mut camera = Camera2D::new(640.0, 480.0);
        camera.set_position(Vec2::new(5.0, 5.0));
        let cursor = Vec2::new(100.0, 400.0);
        let before = camera.screen_to_world(cursor);

        camera.zoom_at(cursor, 2.5);

        assert!((camera.zoom() - 2.5).abs() < 1e-6);
        assert!(approx(camera.screen_to_world(cursor), before, 1e-3));
    }

    #[test]
    fn test_visible_bounds() {
        let mut camera = Camera2D::new(100.0, 50.0);
        camera.set_zoom(2.0);
        camera.move_by(Vec2::new(1.0, 1.0));

        let (min, max) = camera.visible_bounds();
        assert!(approx(min, Vec2::new(-24.0, -11.5), 1e-5));
        assert!(approx(max, Vec2::new(26.0, 13.5), 1e-5));
    }
}
