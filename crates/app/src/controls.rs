//! Keyboard and mouse bindings.

use glam::Vec3;
use tracing::debug;

use skyscatter_platform::{InputState, KeyCode};
use skyscatter_scene::{MotionInput, RenderSettings};

/// What one frame of input asks the rest of the app to do.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameControls {
    pub motion: MotionInput,
    /// Raw mouse delta to apply to the camera, if mouse look is active.
    pub look: Option<(f32, f32)>,
    /// New cursor capture state when config mode was toggled.
    pub cursor_captured: Option<bool>,
}

/// Mode toggles driven by the keyboard.
#[derive(Clone, Copy, Debug)]
pub struct Controls {
    config_mode: bool,
    hud_visible: bool,
    ui_has_keyboard: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            config_mode: false,
            hud_visible: true,
            ui_has_keyboard: false,
        }
    }
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config mode releases the cursor and routes keys to the settings.
    #[inline]
    pub fn config_mode(&self) -> bool {
        self.config_mode
    }

    #[inline]
    pub fn hud_visible(&self) -> bool {
        self.hud_visible
    }

    /// While a HUD field holds the keyboard, typed keys go to it and not to
    /// the settings shortcuts.
    pub fn set_ui_has_keyboard(&mut self, captured: bool) {
        self.ui_has_keyboard = captured;
    }

    /// Reads this frame's input, updating `settings` in place.
    pub fn apply(&mut self, input: &InputState, settings: &mut RenderSettings) -> FrameControls {
        let mut frame = FrameControls::default();

        if input.is_key_just_pressed(KeyCode::Escape) {
            self.config_mode = !self.config_mode;
            frame.cursor_captured = Some(!self.config_mode);
            debug!("Config mode {}", if self.config_mode { "on" } else { "off" });
        }
        if input.is_key_just_pressed(KeyCode::F1) {
            self.hud_visible = !self.hud_visible;
        }

        if self.config_mode {
            if !self.ui_has_keyboard {
                apply_settings_keys(input, settings);
            }
        } else {
            frame.look = Some(input.mouse_delta());
        }

        frame.motion = MotionInput {
            movement: Vec3::new(
                input.axis(KeyCode::KeyA, KeyCode::KeyD),
                input.axis(KeyCode::KeyE, KeyCode::KeyQ),
                input.axis(KeyCode::KeyS, KeyCode::KeyW),
            ),
            sun: input.axis(KeyCode::NumpadSubtract, KeyCode::NumpadAdd),
        };
        frame
    }
}

fn apply_settings_keys(input: &InputState, settings: &mut RenderSettings) {
    let before = *settings;

    if input.is_key_just_pressed(KeyCode::KeyR) {
        settings.rayleigh = !settings.rayleigh;
    }
    if input.is_key_just_pressed(KeyCode::KeyM) {
        settings.mie = !settings.mie;
    }
    if input.is_key_just_pressed(KeyCode::ArrowUp) {
        settings.scale_camera_speed(1);
    }
    if input.is_key_just_pressed(KeyCode::ArrowDown) {
        settings.scale_camera_speed(-1);
    }
    if input.is_key_just_pressed(KeyCode::PageUp) {
        settings.adjust_samples_in(1);
    }
    if input.is_key_just_pressed(KeyCode::PageDown) {
        settings.adjust_samples_in(-1);
    }
    if input.is_key_just_pressed(KeyCode::Home) {
        settings.adjust_samples_out(1);
    }
    if input.is_key_just_pressed(KeyCode::End) {
        settings.adjust_samples_out(-1);
    }

    if *settings != before {
        debug!("Render settings changed: {:?}", settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(input: &mut InputState, key: KeyCode) {
        input.on_key_pressed(key);
    }

    fn tap(input: &mut InputState, key: KeyCode) {
        input.on_key_pressed(key);
        input.on_key_released(key);
    }

    #[test]
    fn test_escape_toggles_config_mode_and_cursor() {
        let mut controls = Controls::new();
        let mut settings = RenderSettings::default();
        let mut input = InputState::new();

        tap(&mut input, KeyCode::Escape);
        let frame = controls.apply(&input, &mut settings);
        assert!(controls.config_mode());
        assert_eq!(frame.cursor_captured, Some(false));

        input.end_frame();
        let frame = controls.apply(&input, &mut settings);
        assert!(controls.config_mode());
        assert_eq!(frame.cursor_captured, None);

        tap(&mut input, KeyCode::Escape);
        let frame = controls.apply(&input, &mut settings);
        assert!(!controls.config_mode());
        assert_eq!(frame.cursor_captured, Some(true));
    }

    #[test]
    fn test_f1_toggles_hud() {
        let mut controls = Controls::new();
        let mut settings = RenderSettings::default();
        let mut input = InputState::new();
        assert!(controls.hud_visible());

        tap(&mut input, KeyCode::F1);
        controls.apply(&input, &mut settings);
        assert!(!controls.hud_visible());
    }

    #[test]
    fn test_settings_keys_ignored_outside_config_mode() {
        let mut controls = Controls::new();
        let mut settings = RenderSettings::default();
        let mut input = InputState::new();

        tap(&mut input, KeyCode::KeyR);
        tap(&mut input, KeyCode::PageUp);
        controls.apply(&input, &mut settings);
        assert_eq!(settings, RenderSettings::default());
    }

    #[test]
    fn test_settings_keys_in_config_mode() {
        let mut controls = Controls::new();
        let mut settings = RenderSettings::default();
        let mut input = InputState::new();

        tap(&mut input, KeyCode::Escape);
        controls.apply(&input, &mut settings);
        input.end_frame();

        for key in [
            KeyCode::KeyR,
            KeyCode::KeyM,
            KeyCode::ArrowUp,
            KeyCode::PageUp,
            KeyCode::End,
        ] {
            tap(&mut input, key);
        }
        controls.apply(&input, &mut settings);

        assert!(!settings.rayleigh);
        assert!(!settings.mie);
        assert_eq!(settings.camera_speed, 1.25);
        assert_eq!(settings.samples_in, 11);
        assert_eq!(settings.samples_out, 9);
    }

    #[test]
    fn test_settings_keys_ignored_while_ui_has_keyboard() {
        let mut controls = Controls::new();
        let mut settings = RenderSettings::default();
        let mut input = InputState::new();

        tap(&mut input, KeyCode::Escape);
        controls.apply(&input, &mut settings);
        input.end_frame();

        controls.set_ui_has_keyboard(true);
        tap(&mut input, KeyCode::KeyR);
        tap(&mut input, KeyCode::PageUp);
        controls.apply(&input, &mut settings);
        assert_eq!(settings, RenderSettings::default());

        input.end_frame();
        controls.set_ui_has_keyboard(false);
        tap(&mut input, KeyCode::KeyR);
        controls.apply(&input, &mut settings);
        assert!(!settings.rayleigh);
    }

    #[test]
    fn test_mouse_look_only_outside_config_mode() {
        let mut controls = Controls::new();
        let mut settings = RenderSettings::default();
        let mut input = InputState::new();

        input.on_mouse_motion(4.0, -2.0);
        let frame = controls.apply(&input, &mut settings);
        assert_eq!(frame.look, Some((4.0, -2.0)));

        tap(&mut input, KeyCode::Escape);
        let frame = controls.apply(&input, &mut settings);
        assert_eq!(frame.look, None);
    }

    #[test]
    fn test_motion_axes() {
        let mut controls = Controls::new();
        let mut settings = RenderSettings::default();
        let mut input = InputState::new();

        press(&mut input, KeyCode::KeyW);
        press(&mut input, KeyCode::KeyA);
        press(&mut input, KeyCode::KeyQ);
        press(&mut input, KeyCode::NumpadSubtract);
        let frame = controls.apply(&input, &mut settings);

        assert_eq!(frame.motion.movement, Vec3::new(-1.0, 1.0, 1.0));
        assert_eq!(frame.motion.sun, -1.0);
    }

    #[test]
    fn test_motion_continues_in_config_mode() {
        let mut controls = Controls::new();
        let mut settings = RenderSettings::default();
        let mut input = InputState::new();

        tap(&mut input, KeyCode::Escape);
        press(&mut input, KeyCode::KeyS);
        let frame = controls.apply(&input, &mut settings);
        assert!(controls.config_mode());
        assert_eq!(frame.motion.movement.z, -1.0);
    }
}
