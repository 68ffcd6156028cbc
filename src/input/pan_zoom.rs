//! Mouse and keyboard camera control
//!
//! Dragging with the pan button moves the view with the cursor, scrolling
//! zooms around the cursor, and the arrow keys / WASD pan at a fixed screen
//! speed.

use glam::Vec2;
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use super::Input;
use crate::renderer::Camera2D;

/// Routes drag, scroll and key input to a [`Camera2D`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanZoomController {
    /// Button that drags the view
    pub pan_button: MouseButton,
    /// Zoom multiplier per scroll line
    pub zoom_step: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Keyboard pan speed in pixels per second
    pub key_pan_speed: f32,
}

impl PanZoomController {
    pub fn new() -> Self {
        Self {
            pan_button: MouseButton::Right,
            zoom_step: 1.1,
            min_zoom: 0.05,
            max_zoom: 50.0,
            key_pan_speed: 600.0,
        }
    }

    /// Drag with a different mouse button
    #[must_use]
    pub fn with_pan_button(mut self, button: MouseButton) -> Self {
        self.pan_button = button;
        self
    }

    /// Clamp zoom to `[min, max]`
    #[must_use]
    pub fn with_zoom_limits(mut self, min: f32, max: f32) -> Self {
        self.min_zoom = min;
        self.max_zoom = max;
        self
    }

    /// Apply this frame's input to `camera`
    pub fn update(&self, input: &Input, camera: &mut Camera2D, dt: f32) {
        if input.is_mouse_button_pressed(self.pan_button) {
            let drag = input.mouse_delta();
            if drag != Vec2::ZERO {
                // Screen Y points down, world Y up
                camera.move_by(Vec2::new(-drag.x, drag.y) / camera.zoom());
            }
        }

        let keys = input.axis(KeyCode::KeyA, KeyCode::KeyD, KeyCode::KeyS, KeyCode::KeyW)
            + input.axis(
                KeyCode::ArrowLeft,
                KeyCode::ArrowRight,
                KeyCode::ArrowDown,
                KeyCode::ArrowUp,
            );
        if keys != Vec2::ZERO {
            camera.move_by(keys.clamp(Vec2::NEG_ONE, Vec2::ONE) * self.key_pan_speed * dt / camera.zoom());
        }

        let scroll = input.scroll_delta().y;
        if scroll != 0.0 {
            let target = (camera.zoom() * self.zoom_step.powf(scroll)).clamp(self.min_zoom, self.max_zoom);
            let factor = target / camera.zoom();
            if factor != 1.0 {
                camera.zoom_at(input.mouse_position(), factor);
            }
        }
    }
}

impl Default for PanZoomController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use winit::event::ElementState;

    use super::*;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < 1e-3
    }

    #[test]
    fn test_scroll_keeps_world_point_under_cursor() {
        let controller = PanZoomController::new();
        let mut camera = Camera2D::new(800.0, 600.0);
        let mut input = Input::new();
        let cursor = Vec2::new(600.0, 150.0);
        input.process_mouse_motion(cursor);
        let anchor = camera.screen_to_world(cursor);

        input.process_scroll(Vec2::new(0.0, 3.0));
        controller.update(&input, &mut camera, 0.016);

        assert!((camera.zoom() - 1.1_f32.powi(3)).abs() < 1e-4);
        assert!(approx(camera.screen_to_world(cursor), anchor));
    }

    #[test]
    fn test_zoom_is_clamped() {
        let controller = PanZoomController::new().with_zoom_limits(0.5, 2.0);
        let mut camera = Camera2D::new(800.0, 600.0);
        let mut input = Input::new();

        input.process_scroll(Vec2::new(0.0, 100.0));
        controller.update(&input, &mut camera, 0.016);
        assert!((camera.zoom() - 2.0).abs() < 1e-4);

        input.update();
        input.process_scroll(Vec2::new(0.0, -100.0));
        controller.update(&input, &mut camera, 0.016);
        assert!((camera.zoom() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_drag_moves_world_with_cursor() {
        let controller = PanZoomController::new();
        let mut camera = Camera2D::new(800.0, 600.0);
        camera.set_zoom(2.0);
        let mut input = Input::new();
        input.process_mouse_motion(Vec2::new(100.0, 100.0));
        let grabbed = camera.screen_to_world(Vec2::new(100.0, 100.0));
        input.update();

        input.process_mouse_button(MouseButton::Right, ElementState::Pressed);
        input.process_mouse_motion(Vec2::new(140.0, 80.0));
        controller.update(&input, &mut camera, 0.016);

        assert!(approx(camera.screen_to_world(Vec2::new(140.0, 80.0)), grabbed));
    }

    #[test]
    fn test_keys_pan_at_screen_speed() {
        let controller = PanZoomController::new();
        let mut camera = Camera2D::new(800.0, 600.0);
        let mut input = Input::new();
        input.process_keyboard(KeyCode::KeyD, ElementState::Pressed);

        controller.update(&input, &mut camera, 0.5);
        assert!(approx(camera.position(), Vec2::new(300.0, 0.0)));
    }
}
