//! Input state tracking

use std::hash::Hash;

use glam::Vec2;
use rustc_hash::FxHashSet;
use winit::event::{ElementState, MouseButton};
use winit::keyboard::KeyCode;

/// Held / pressed-this-frame / released-this-frame sets for one kind of button
#[derive(Debug, Clone)]
struct ButtonSet<T> {
    held: FxHashSet<T>,
    pressed: FxHashSet<T>,
    released: FxHashSet<T>,
}

impl<T: Copy + Eq + Hash> ButtonSet<T> {
    fn new() -> Self {
        Self {
            held: FxHashSet::default(),
            pressed: FxHashSet::default(),
            released: FxHashSet::default(),
        }
    }

    fn process(&mut self, button: T, state: ElementState) {
        match state {
            ElementState::Pressed => {
                // Key repeat arrives as more presses; only the first counts
                if self.held.insert(button) {
                    self.pressed.insert(button);
                }
            }
            ElementState::Released => {
                if self.held.remove(&button) {
                    self.released.insert(button);
                }
            }
        }
    }

    fn end_frame(&mut self) {
        self.pressed.clear();
        self.released.clear();
    }
}

/// Keyboard, mouse and scroll state for the current frame
#[derive(Debug, Clone)]
pub struct Input {
    keys: ButtonSet<KeyCode>,
    mouse_buttons: ButtonSet<MouseButton>,
    /// Cursor position in pixels, top-left origin
    mouse_position: Vec2,
    /// Cursor movement this frame
    mouse_delta: Vec2,
    /// Scroll this frame, in lines
    scroll_delta: Vec2,
}

impl Input {
    pub fn new() -> Self {
        Self {
            keys: ButtonSet::new(),
            mouse_buttons: ButtonSet::new(),
            mouse_position: Vec2::ZERO,
            mouse_delta: Vec2::ZERO,
            scroll_delta: Vec2::ZERO,
        }
    }

    /// Clear per-frame state. Called by the engine after the game has rendered.
    pub fn update(&mut self) {
        self.keys.end_frame();
        self.mouse_buttons.end_frame();
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = Vec2::ZERO;
    }

    pub fn process_keyboard(&mut self, key_code: KeyCode, state: ElementState) {
        self.keys.process(key_code, state);
    }

    pub fn process_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        self.mouse_buttons.process(button, state);
    }

    /// Record a new cursor position
    pub fn process_mouse_motion(&mut self, position: Vec2) {
        self.mouse_delta += position - self.mouse_position;
        self.mouse_position = position;
    }

    /// Accumulate scroll, in lines
    pub fn process_scroll(&mut self, delta: Vec2) {
        self.scroll_delta += delta;
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys.held.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.keys.pressed.contains(&key)
    }

    pub fn is_key_just_released(&self, key: KeyCode) -> bool {
        self.keys.released.contains(&key)
    }

    pub fn is_mouse_button_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons.held.contains(&button)
    }

    pub fn is_mouse_button_just_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons.pressed.contains(&button)
    }

    pub fn is_mouse_button_just_released(&self, button: MouseButton) -> bool {
        self.mouse_buttons.released.contains(&button)
    }

    /// Direction from held keys: x from `left`/`right`, y from `down`/`up`
    pub fn axis(&self, left: KeyCode, right: KeyCode, down: KeyCode, up: KeyCode) -> Vec2 {
        let value = |negative, positive| {
            f32::from(u8::from(self.is_key_pressed(positive)))
                - f32::from(u8::from(self.is_key_pressed(negative)))
        };
        Vec2::new(value(left, right), value(down, up))
    }

    pub fn mouse_position(&self) -> Vec2 {
        self.mouse_position
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    pub fn scroll_delta(&self) -> Vec2 {
        self.scroll_delta
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_edges_last_one_frame() {
        let mut input = Input::new();
        input.process_keyboard(KeyCode::Space, ElementState::Pressed);
        assert!(input.is_key_pressed(KeyCode::Space));
        assert!(input.is_key_just_pressed(KeyCode::Space));

        input.update();
        input.process_keyboard(KeyCode::Space, ElementState::Pressed);
        assert!(input.is_key_pressed(KeyCode::Space));
        assert!(!input.is_key_just_pressed(KeyCode::Space));

        input.process_keyboard(KeyCode::Space, ElementState::Released);
        assert!(!input.is_key_pressed(KeyCode::Space));
        assert!(input.is_key_just_released(KeyCode::Space));
    }

    #[test]
    fn test_mouse_delta_accumulates_until_update() {
        let mut input = Input::new();
        input.process_mouse_motion(Vec2::new(10.0, 10.0));
        input.process_mouse_motion(Vec2::new(15.0, 12.0));
        assert_eq!(input.mouse_delta(), Vec2::new(15.0, 12.0));
        assert_eq!(input.mouse_position(), Vec2::new(15.0, 12.0));

        input.process_scroll(Vec2::new(0.0, 1.0));
        input.process_scroll(Vec2::new(0.0, 2.0));
        assert_eq!(input.scroll_delta(), Vec2::new(0.0, 3.0));

        input.update();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
        assert_eq!(input.scroll_delta(), Vec2::ZERO);
        assert_eq!(input.mouse_position(), Vec2::new(15.0, 12.0));
    }

    #[test]
    fn test_axis() {
        let mut input = Input::new();
        input.process_keyboard(KeyCode::KeyD, ElementState::Pressed);
        input.process_keyboard(KeyCode::KeyS, ElementState::Pressed);
        let axis = input.axis(KeyCode::KeyA, KeyCode::KeyD, KeyCode::KeyS, KeyCode::KeyW);
        assert_eq!(axis, Vec2::new(1.0, -1.0));
    }

    #[test]
    fn test_mouse_buttons() {
        let mut input = Input::new();
        input.process_mouse_button(MouseButton::Left, ElementState::Pressed);
        assert!(input.is_mouse_button_just_pressed(MouseButton::Left));
        input.update();
        assert!(input.is_mouse_button_pressed(MouseButton::Left));
        assert!(!input.is_mouse_button_just_pressed(MouseButton::Left));
    }
}
