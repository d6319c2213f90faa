//! Keyboard and raw mouse motion tracking.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Tracks the current state of keyboard and mouse input.
#[derive(Debug, Default)]
pub struct InputState {
    /// Currently pressed keys
    pressed_keys: HashSet<KeyCode>,
    /// Keys that were just pressed this frame
    just_pressed_keys: HashSet<KeyCode>,
    /// Raw mouse motion accumulated since the last frame
    mouse_delta: (f32, f32),
}

impl InputState {
    /// Create a new input state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the end of each frame to clear per-frame state.
    pub fn end_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.mouse_delta = (0.0, 0.0);
    }

    /// Handle a key press event. Auto-repeat presses are ignored.
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    /// Handle a key release event.
    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    /// Handle raw (unaccelerated, unclamped) mouse motion.
    pub fn on_mouse_motion(&mut self, dx: f64, dy: f64) {
        self.mouse_delta.0 += dx as f32;
        self.mouse_delta.1 += dy as f32;
    }

    /// Forget held keys, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.pressed_keys.clear();
    }

    /// Check if a key is currently pressed.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Check if a key was just pressed this frame.
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    /// -1, 0 or +1 depending on which of two opposing keys is held.
    pub fn axis(&self, negative: KeyCode, positive: KeyCode) -> f32 {
        let mut value = 0.0;
        if self.is_key_pressed(negative) {
            value -= 1.0;
        }
        if self.is_key_pressed(positive) {
            value += 1.0;
        }
        value
    }

    /// Get the mouse movement accumulated this frame.
    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_just_pressed_lasts_one_frame() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(input.is_key_just_pressed(KeyCode::KeyW));

        input.end_frame();
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(!input.is_key_just_pressed(KeyCode::KeyW));
    }

    #[test]
    fn test_repeat_press_is_not_just_pressed() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Escape);
        input.end_frame();
        input.on_key_pressed(KeyCode::Escape);
        assert!(!input.is_key_just_pressed(KeyCode::Escape));

        input.on_key_released(KeyCode::Escape);
        input.on_key_pressed(KeyCode::Escape);
        assert!(input.is_key_just_pressed(KeyCode::Escape));
    }

    #[test]
    fn test_axis_cancels_opposing_keys() {
        let mut input = InputState::new();
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), 0.0);

        input.on_key_pressed(KeyCode::KeyW);
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), 1.0);

        input.on_key_pressed(KeyCode::KeyS);
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), 0.0);

        input.on_key_released(KeyCode::KeyW);
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), -1.0);
    }

    #[test]
    fn test_mouse_motion_accumulates_until_frame_end() {
        let mut input = InputState::new();
        input.on_mouse_motion(3.0, -1.0);
        input.on_mouse_motion(2.0, -4.0);
        assert_eq!(input.mouse_delta(), (5.0, -5.0));

        input.end_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_release_all() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyA);
        input.on_key_pressed(KeyCode::KeyD);
        input.release_all();
        assert!(!input.is_key_pressed(KeyCode::KeyA));
        assert!(!input.is_key_pressed(KeyCode::KeyD));
    }
}
