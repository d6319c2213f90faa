//! Heads-up display built with Dear ImGui.
//!
//! ```text
//! normal mode                      config mode
//! ┌──────────────────────────┐     ┌ Parameters ───────────────┐
//! │ Press ESC to change ...  │     │ Simulation                │
//! └──────────────────────────┘     │ Planet                    │
//!                                  │ Atmosphere                │
//!                                  │ Sun                       │
//!                                  │ Light                     │
//!                                  └───────────────────────────┘
//!                                  ┌ Help ─────────────────────┐
//!                                  └───────────────────────────┘
//! ```
//!
//! The panel edits the [`Simulation`] in place; the next payloads pick the
//! new values up.

use std::time::Duration;

use glam::Vec4;
use imgui::{Condition, ConfigFlags, FontConfig, FontSource, SliderFlags, WindowFlags};
use imgui_winit_support::{HiDpiMode, WinitPlatform};
use tracing::warn;
use winit::event::{Event, WindowEvent};
use winit::window::WindowId;

use skyscatter_platform::Window;
use skyscatter_renderer::OverlayDrawData;
use skyscatter_scene::Simulation;
use skyscatter_scene::simulation::{MAX_CAMERA_SPEED, MIN_CAMERA_SPEED};

use crate::controls::Controls;

pub const HINT_TEXT: &str = "Press ESC to change parameters, or F1 to hide/show this text";

pub const HELP_LINES: [&str; 6] = [
    "Usage:",
    "Mouse - turn the camera",
    "WASD, Q/E - move the camera",
    "Numpad +/- - move the sun",
    "F1 - hide the HUD outside this mode",
    "ESC - enter/leave this configuration mode",
];

const HELP_MARGIN: f32 = 5.0;

/// Standard atmosphere pressure in pascals; the pressure slider spans
/// 1/16 to 4 times this.
const REFERENCE_PRESSURE: f32 = 101_325.0;
const SUN_DISTANCE_RANGE: (f32, f32) = (1.496e7, 1.496e13);
const SUN_RADIUS_RANGE: (f32, f32) = (1.3914e6, 1.3914e11);
const WAVELENGTH_RANGE: (f32, f32) = (10.0, 2000.0);

/// Owns the imgui context and its winit glue, and turns each frame's UI
/// into [`OverlayDrawData`].
pub struct Hud {
    context: imgui::Context,
    platform: WinitPlatform,
    draw_data: OverlayDrawData,
}

impl Hud {
    pub fn new(font_size: f32) -> Self {
        let mut context = imgui::Context::create();
        context.set_ini_filename(None);
        // Cursor visibility belongs to mouse look.
        context.io_mut().config_flags |= ConfigFlags::NO_MOUSE_CURSOR_CHANGE;
        context.fonts().add_font(&[FontSource::DefaultFontData {
            config: Some(FontConfig {
                size_pixels: font_size,
                ..FontConfig::default()
            }),
        }]);

        let platform = WinitPlatform::new(&mut context);
        Self {
            context,
            platform,
            draw_data: OverlayDrawData::new(),
        }
    }

    /// Binds the display size and scale factor to `window`.
    pub fn attach(&mut self, window: &Window) {
        self.platform
            .attach_window(self.context.io_mut(), window.inner(), HiDpiMode::Rounded);
    }

    /// Font atlas for the renderer to rasterize and upload.
    pub fn fonts(&mut self) -> &mut imgui::FontAtlas {
        self.context.fonts()
    }

    pub fn handle_event(&mut self, window: &Window, window_id: WindowId, event: &WindowEvent) {
        let event: Event<()> = Event::WindowEvent {
            window_id,
            event: event.clone(),
        };
        self.platform
            .handle_event(self.context.io_mut(), window.inner(), &event);
    }

    /// True while a text field or slider holds keyboard focus.
    pub fn wants_keyboard(&self) -> bool {
        self.context.io().want_capture_keyboard
    }

    /// Builds this frame's UI and captures its draw data.
    pub fn frame(
        &mut self,
        window: &Window,
        dt: Duration,
        controls: &Controls,
        simulation: &mut Simulation,
    ) -> &OverlayDrawData {
        if let Err(e) = self
            .platform
            .prepare_frame(self.context.io_mut(), window.inner())
        {
            warn!("Failed to prepare HUD frame: {}", e);
        }
        self.context.io_mut().update_delta_time(dt);

        let ui = self.context.new_frame();
        show_hud(ui, controls, simulation);
        self.platform.prepare_render(ui, window.inner());

        self.draw_data.capture(self.context.render());
        &self.draw_data
    }
}

/// Emits the windows for the current mode.
pub fn show_hud(ui: &imgui::Ui, controls: &Controls, simulation: &mut Simulation) {
    if controls.config_mode() {
        show_parameters(ui, simulation);
        show_help(ui);
    } else if controls.hud_visible() {
        show_hint(ui);
    }
}

fn show_hint(ui: &imgui::Ui) {
    ui.window("Hint")
        .position([0.0, 0.0], Condition::Always)
        .flags(
            WindowFlags::NO_BACKGROUND
                | WindowFlags::ALWAYS_AUTO_RESIZE
                | WindowFlags::NO_DECORATION
                | WindowFlags::NO_MOVE
                | WindowFlags::NO_INPUTS,
        )
        .build(|| ui.text_colored([1.0, 1.0, 1.0, 1.0], HINT_TEXT));
}

fn show_help(ui: &imgui::Ui) {
    let height = ui.io().display_size[1];
    ui.window("Help")
        .position([HELP_MARGIN, height - HELP_MARGIN], Condition::Always)
        .position_pivot([0.0, 1.0])
        .flags(
            WindowFlags::ALWAYS_AUTO_RESIZE
                | WindowFlags::NO_COLLAPSE
                | WindowFlags::NO_DECORATION
                | WindowFlags::NO_MOVE,
        )
        .build(|| {
            for line in HELP_LINES {
                ui.text(line);
            }
        });
}

fn show_parameters(ui: &imgui::Ui, simulation: &mut Simulation) {
    ui.window("Parameters")
        .flags(WindowFlags::ALWAYS_AUTO_RESIZE)
        .build(|| {
            let settings = &mut simulation.settings;
            section(ui, "Simulation");
            ui.slider_config("Camera speed", MIN_CAMERA_SPEED, MAX_CAMERA_SPEED)
                .display_format("%.3f")
                .flags(SliderFlags::LOGARITHMIC)
                .build(&mut settings.camera_speed);
            sample_count(ui, "View ray samples", &mut settings.samples_in);
            sample_count(ui, "Light ray samples", &mut settings.samples_out);
            ui.checkbox("Rayleigh scattering", &mut settings.rayleigh);
            ui.checkbox("Aerosol Mie scattering", &mut settings.mie);

            let planet = &mut simulation.planet;
            section(ui, "Planet");
            ui.input_float("Planet radius (m)", &mut planet.radius)
                .step(1_000.0)
                .step_fast(100_000.0)
                .display_format("%.0f")
                .build();
            planet.radius = planet.radius.max(1.0);

            let atmosphere = &mut planet.atmosphere;
            section(ui, "Atmosphere");
            ui.slider_config(
                "Surface pressure (Pa)",
                REFERENCE_PRESSURE / 16.0,
                REFERENCE_PRESSURE * 4.0,
            )
            .display_format("%.0f")
            .flags(SliderFlags::LOGARITHMIC)
            .build(&mut atmosphere.surface_pressure);
            ui.slider_config("Air density height (m)", 100.0, 20_000.0)
                .display_format("%.0f")
                .build(&mut atmosphere.density_height);
            ui.slider_config("Aerosol density height (m)", 100.0, 20_000.0)
                .display_format("%.0f")
                .build(&mut atmosphere.aerosol_density_height);
            ui.slider_config("Relative aerosol amount", 0.0, 20.0)
                .display_format("%.3f")
                .flags(SliderFlags::LOGARITHMIC)
                .build(&mut atmosphere.aerosol_density);
            ui.slider_config("Mie asymmetry", -0.99, 0.99)
                .display_format("%.3f")
                .build(&mut atmosphere.mie_asymmetry);
            ui.slider_config("Atmosphere upper limit (m)", 100_000.0, 1_000_000.0)
                .display_format("%.0f")
                .build(&mut atmosphere.upper_limit);

            let sun = &mut simulation.sun;
            section(ui, "Sun");
            ui.slider_config("Distance (m)", SUN_DISTANCE_RANGE.0, SUN_DISTANCE_RANGE.1)
                .display_format("%.0f")
                .flags(SliderFlags::LOGARITHMIC)
                .build(&mut sun.distance);
            ui.slider_config("Radius (m)", SUN_RADIUS_RANGE.0, SUN_RADIUS_RANGE.1)
                .display_format("%.0f")
                .flags(SliderFlags::LOGARITHMIC)
                .build(&mut sun.radius);
            if ui
                .slider_config("Angle", 0.0, 360.0)
                .display_format("%.0f")
                .build(&mut sun.angle)
            {
                sun.rotate(0.0);
            }

            section(ui, "Light");
            ui.slider_config("Light intensity", 0.0, 200.0)
                .display_format("%.2f")
                .build(&mut sun.light_intensity);
            let mut color = light_rgb(sun.light_color);
            if ui
                .slider_config("Light color", 0.0, 1.0)
                .display_format("%.2f")
                .build_array(&mut color)
            {
                sun.light_color = with_rgb(sun.light_color, color);
            }
            let (min, max) = WAVELENGTH_RANGE;
            for (label, wavelength) in [
                "Red wavelength (nm)",
                "Green wavelength (nm)",
                "Blue wavelength (nm)",
            ]
            .into_iter()
            .zip(sun.wavelengths.iter_mut())
            {
                ui.slider_config(label, min, max)
                    .display_format("%.2f")
                    .build(wavelength);
            }
        });
}

fn section(ui: &imgui::Ui, title: &str) {
    ui.separator();
    ui.text_disabled(title);
}

/// An integer field over a sample count that stays at least 1.
fn sample_count(ui: &imgui::Ui, label: &str, samples: &mut u32) {
    let mut value = i32::try_from(*samples).unwrap_or(i32::MAX);
    if ui.input_int(label, &mut value).step(1).step_fast(10).build() {
        *samples = clamp_samples(value);
    }
}

pub fn clamp_samples(value: i32) -> u32 {
    value.max(1) as u32
}

fn light_rgb(color: Vec4) -> [f32; 3] {
    [color.x, color.y, color.z]
}

/// Replaces the color channels of `color`, keeping its alpha.
fn with_rgb(color: Vec4, rgb: [f32; 3]) -> Vec4 {
    Vec4::new(rgb[0], rgb[1], rgb[2], color.w)
}

/// imgui allows one live context per process; tests that create one
/// hold this for the context's lifetime.
#[cfg(test)]
pub(crate) fn lock_imgui() -> std::sync::MutexGuard<'static, ()> {
    static IMGUI: std::sync::Mutex<()> = std::sync::Mutex::new(());
    IMGUI.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyscatter_platform::{InputState, KeyCode};
    use skyscatter_scene::RenderSettings;

    fn context() -> imgui::Context {
        let mut ctx = imgui::Context::create();
        ctx.set_ini_filename(None);
        ctx.io_mut().display_size = [1280.0, 720.0];
        ctx.fonts().build_rgba32_texture();
        ctx
    }

    fn draw(ctx: &mut imgui::Context, controls: &Controls, simulation: &mut Simulation) -> OverlayDrawData {
        ctx.io_mut().update_delta_time(Duration::from_millis(16));
        let ui = ctx.new_frame();
        show_hud(ui, controls, simulation);
        let mut data = OverlayDrawData::new();
        data.capture(ctx.render());
        data
    }

    fn toggle(controls: &mut Controls, key: KeyCode) {
        let mut input = InputState::new();
        input.on_key_pressed(key);
        let mut settings = RenderSettings::default();
        controls.apply(&input, &mut settings);
    }

    #[test]
    fn test_hidden_hud_draws_nothing() {
        let _imgui = lock_imgui();
        let mut controls = Controls::new();
        toggle(&mut controls, KeyCode::F1);
        let mut simulation = Simulation::new(RenderSettings::default());

        let data = draw(&mut context(), &controls, &mut simulation);
        assert!(data.is_empty());
    }

    #[test]
    fn test_normal_mode_draws_hint() {
        let _imgui = lock_imgui();
        let controls = Controls::new();
        let mut simulation = Simulation::new(RenderSettings::default());

        let data = draw(&mut context(), &controls, &mut simulation);
        assert!(!data.is_empty());
    }

    #[test]
    fn test_config_mode_draws_panel_and_help() {
        let _imgui = lock_imgui();
        let mut ctx = context();
        let mut simulation = Simulation::new(RenderSettings::default());
        let hint = draw(&mut ctx, &Controls::new(), &mut simulation);

        let mut controls = Controls::new();
        toggle(&mut controls, KeyCode::Escape);
        let panel = draw(&mut ctx, &controls, &mut simulation);

        assert!(panel.vertices().len() > hint.vertices().len());
        assert!(panel.draw_command_count() >= 2);
    }

    #[test]
    fn test_config_mode_ignores_f1() {
        let _imgui = lock_imgui();
        let mut controls = Controls::new();
        toggle(&mut controls, KeyCode::Escape);
        toggle(&mut controls, KeyCode::F1);
        let mut simulation = Simulation::new(RenderSettings::default());

        let data = draw(&mut context(), &controls, &mut simulation);
        assert!(!data.is_empty());
    }

    #[test]
    fn test_panel_without_input_changes_nothing() {
        let _imgui = lock_imgui();
        let mut controls = Controls::new();
        toggle(&mut controls, KeyCode::Escape);
        let mut simulation = Simulation::new(RenderSettings::default());
        let before = (simulation.settings, simulation.sun, simulation.planet);

        let mut ctx = context();
        for _ in 0..3 {
            draw(&mut ctx, &controls, &mut simulation);
        }
        assert_eq!((simulation.settings, simulation.sun, simulation.planet), before);
    }

    #[test]
    fn test_sample_counts_stay_positive() {
        assert_eq!(clamp_samples(-4), 1);
        assert_eq!(clamp_samples(0), 1);
        assert_eq!(clamp_samples(24), 24);
    }

    #[test]
    fn test_light_color_keeps_alpha() {
        let color = Vec4::new(1.0, 0.5, 0.25, 0.75);
        assert_eq!(light_rgb(color), [1.0, 0.5, 0.25]);
        assert_eq!(with_rgb(color, [0.1, 0.2, 0.3]), Vec4::new(0.1, 0.2, 0.3, 0.75));
    }
}
