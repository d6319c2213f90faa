//! Per-frame simulation state and payload generation.

use glam::{Vec3, Vec4};

use crate::atmosphere::{Planet, ScatteringCache, Sun};
use crate::camera::Camera;
use crate::payload::{AtmosphereUniform, CameraUniform, MODE_MIE, MODE_RAYLEIGH};

/// Simulation steps are expressed per tick of this length.
pub const REFERENCE_TICK: f32 = 1.0 / 60.0;

/// Metres travelled per reference tick at camera speed 1.
pub const BASE_CAMERA_SPEED: f32 = 750.0;

/// Degrees the sun moves per reference tick.
pub const SUN_STEP_DEGREES: f32 = 0.75;

pub const MIN_CAMERA_SPEED: f32 = 0.025;
pub const MAX_CAMERA_SPEED: f32 = 100.0;

/// Factor applied by one camera speed step.
pub const CAMERA_SPEED_STEP: f32 = 1.25;

/// User-adjustable rendering settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    pub rayleigh: bool,
    pub mie: bool,
    pub samples_in: u32,
    pub samples_out: u32,
    pub camera_speed: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            rayleigh: true,
            mie: true,
            samples_in: 10,
            samples_out: 10,
            camera_speed: 1.0,
        }
    }
}

impl RenderSettings {
    /// Mode word for [`CameraUniform::mode`].
    pub fn mode(&self) -> u32 {
        let mut mode = 0;
        if self.rayleigh {
            mode |= MODE_RAYLEIGH;
        }
        if self.mie {
            mode |= MODE_MIE;
        }
        mode
    }

    /// Multiplies (`steps > 0`) or divides the camera speed by
    /// [`CAMERA_SPEED_STEP`] per step, clamped to the allowed range.
    pub fn scale_camera_speed(&mut self, steps: i32) {
        self.camera_speed = (self.camera_speed * CAMERA_SPEED_STEP.powi(steps))
            .clamp(MIN_CAMERA_SPEED, MAX_CAMERA_SPEED);
    }

    /// Adjusts the view-ray sample count, never going below 1.
    pub fn adjust_samples_in(&mut self, delta: i32) {
        self.samples_in = self.samples_in.saturating_add_signed(delta).max(1);
    }

    /// Adjusts the light-ray sample count, never going below 1.
    pub fn adjust_samples_out(&mut self, delta: i32) {
        self.samples_out = self.samples_out.saturating_add_signed(delta).max(1);
    }
}

/// Continuous motion requested for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotionInput {
    /// Camera-space direction, each axis in [-1, 1] (x: right, y: up, z: forward).
    pub movement: Vec3,
    /// Sun rotation direction: +1, -1 or 0.
    pub sun: f32,
}

/// Everything the compute shader needs, advanced once per frame.
#[derive(Clone, Debug)]
pub struct Simulation {
    pub sun: Sun,
    pub planet: Planet,
    pub camera: Camera,
    pub settings: RenderSettings,
    scattering: ScatteringCache,
}

impl Simulation {
    /// Creates the default scene with the camera 10 m above the surface.
    pub fn new(settings: RenderSettings) -> Self {
        let planet = Planet::default();
        Self {
            sun: Sun::default(),
            camera: Camera::new(Vec3::new(0.0, planet.radius + 10.0, 0.0)),
            planet,
            settings,
            scattering: ScatteringCache::new(),
        }
    }

    /// Advances by `dt` seconds.
    pub fn step(&mut self, dt: f32, input: &MotionInput) {
        let ticks = dt / REFERENCE_TICK;

        let distance = self.settings.camera_speed * BASE_CAMERA_SPEED * ticks;
        self.camera.translate(input.movement, distance);

        if input.sun != 0.0 {
            self.sun.rotate(input.sun * SUN_STEP_DEGREES * ticks);
        }
    }

    /// Camera payload for this frame.
    pub fn camera_uniform(&self) -> CameraUniform {
        CameraUniform {
            look_dir: self.camera.look_matrix(),
            origin: self.camera.position.extend(0.0),
            base_direction: Vec4::new(0.0, 0.0, -0.51, 0.0),
            x_pos_multiplier: 0.0,
            y_pos_multiplier: 0.0,
            x_dir_multiplier: 1.0 / 1000.0,
            y_dir_multiplier: 1.0 / 1000.0,
            samples_in: clamp_to_i32(self.settings.samples_in),
            samples_out: clamp_to_i32(self.settings.samples_out),
            mode: self.settings.mode(),
            _padding: 0,
        }
    }

    /// Atmosphere payload for this frame. Recomputes the scattering
    /// constant if its inputs changed.
    pub fn atmosphere_uniform(&mut self) -> AtmosphereUniform {
        let atmosphere = &self.planet.atmosphere;
        let [r, g, b] = self.sun.wavelengths;

        AtmosphereUniform {
            sun_distance: self.sun.distance,
            sun_radius: self.sun.radius,
            sun_angle: self.sun.angle,
            planet_radius: self.planet.radius,
            surface_pressure: atmosphere.surface_pressure,
            density_height: atmosphere.density_height,
            aerosol_density_height: atmosphere.aerosol_density_height,
            mie_asymmetry: atmosphere.mie_asymmetry,
            upper_limit: atmosphere.upper_limit,
            temperature: atmosphere.temperature,
            refractivity: atmosphere.refractivity,
            scattering_k: self.scattering.get(atmosphere),
            aerosol_density: atmosphere.aerosol_density,
            light_intensity: self.sun.light_intensity,
            _padding: [0.0; 2],
            wavelengths: Vec4::new(r, g, b, 0.0),
            light_color: self.sun.light_color,
        }
    }

    /// Number of times the scattering constant has been computed.
    pub fn scattering_recomputations(&self) -> u64 {
        self.scattering.recomputations()
    }
}

fn clamp_to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_starts_above_surface() {
        let sim = Simulation::new(RenderSettings::default());
        assert_eq!(sim.camera.position, Vec3::new(0.0, 6_371_010.0, 0.0));
        assert_eq!(sim.camera.yaw, 0.0);
        assert_eq!(sim.camera.pitch, 0.0);
    }

    #[test]
    fn test_step_scales_with_delta_time() {
        let mut sim = Simulation::new(RenderSettings::default());
        let start = sim.camera.position;
        let input = MotionInput {
            movement: Vec3::new(0.0, 0.0, 1.0),
            sun: 0.0,
        };

        sim.step(REFERENCE_TICK * 2.0, &input);
        let travelled = start.distance(sim.camera.position);
        assert!((travelled - 1500.0).abs() < 1.0, "travelled {travelled}");
    }

    #[test]
    fn test_step_moves_sun() {
        let mut sim = Simulation::new(RenderSettings::default());
        let input = MotionInput {
            movement: Vec3::ZERO,
            sun: -1.0,
        };
        sim.step(REFERENCE_TICK, &input);
        assert!((sim.sun.angle - 49.25).abs() < 1e-4);
    }

    #[test]
    fn test_camera_uniform_fields() {
        let settings = RenderSettings {
            rayleigh: true,
            mie: false,
            samples_in: 16,
            samples_out: 8,
            camera_speed: 1.0,
        };
        let sim = Simulation::new(settings);
        let uniform = sim.camera_uniform();

        assert_eq!(uniform.origin, Vec4::new(0.0, 6_371_010.0, 0.0, 0.0));
        assert_eq!(uniform.base_direction, Vec4::new(0.0, 0.0, -0.51, 0.0));
        assert_eq!(uniform.x_pos_multiplier, 0.0);
        assert_eq!(uniform.x_dir_multiplier, 0.001);
        assert_eq!(uniform.samples_in, 16);
        assert_eq!(uniform.samples_out, 8);
        assert_eq!(uniform.mode, MODE_RAYLEIGH);
    }

    #[test]
    fn test_atmosphere_uniform_reuses_scattering_constant() {
        let mut sim = Simulation::new(RenderSettings::default());
        let first = sim.atmosphere_uniform();
        let second = sim.atmosphere_uniform();
        assert_eq!(first, second);
        assert_eq!(sim.scattering_recomputations(), 1);
        assert_eq!(first.wavelengths, Vec4::new(630.0, 525.0, 440.0, 0.0));

        sim.planet.atmosphere.refractivity = 1.0003;
        sim.atmosphere_uniform();
        assert_eq!(sim.scattering_recomputations(), 2);
    }

    #[test]
    fn test_camera_speed_is_clamped() {
        let mut settings = RenderSettings::default();
        settings.scale_camera_speed(1);
        assert!((settings.camera_speed - 1.25).abs() < 1e-6);

        settings.scale_camera_speed(-100);
        assert_eq!(settings.camera_speed, MIN_CAMERA_SPEED);

        settings.scale_camera_speed(100);
        assert_eq!(settings.camera_speed, MAX_CAMERA_SPEED);
    }

    #[test]
    fn test_sample_counts_stay_positive() {
        let mut settings = RenderSettings {
            samples_in: 2,
            samples_out: 1,
            ..RenderSettings::default()
        };
        settings.adjust_samples_in(-1);
        settings.adjust_samples_in(-1);
        settings.adjust_samples_out(-1);
        assert_eq!(settings.samples_in, 1);
        assert_eq!(settings.samples_out, 1);

        settings.adjust_samples_out(3);
        assert_eq!(settings.samples_out, 4);
    }

    #[test]
    fn test_mode_word() {
        let mut settings = RenderSettings::default();
        assert_eq!(settings.mode(), MODE_RAYLEIGH | MODE_MIE);
        settings.rayleigh = false;
        assert_eq!(settings.mode(), MODE_MIE);
        settings.mie = false;
        assert_eq!(settings.mode(), 0);
    }
}
