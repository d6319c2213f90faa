//! Uniform payloads consumed by the scattering compute shader.
//!
//! These structures must match the `Camera` and `Scene` uniform blocks in
//! `shaders/atmosphere.comp` exactly. All structures use `#[repr(C)]` with
//! std140-compatible field order and implement `Pod` and `Zeroable` for
//! safe byte casting.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Bit of [`CameraUniform::mode`] that enables Rayleigh scattering.
pub const MODE_RAYLEIGH: u32 = 1 << 0;
/// Bit of [`CameraUniform::mode`] that enables Mie scattering.
pub const MODE_MIE: u32 = 1 << 1;

/// Camera uniform buffer data (binding 0).
///
/// # Memory Layout
///
/// - Offset 0: look direction matrix (64 bytes)
/// - Offset 64: origin (16 bytes)
/// - Offset 80: base direction (16 bytes)
/// - Offset 96: position and direction multipliers (16 bytes)
/// - Offset 112: sample counts, mode, padding (16 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    /// Camera basis with columns right, up, front and w.
    pub look_dir: Mat4,
    /// Camera position, w = 0.
    pub origin: Vec4,
    /// Ray direction of the centre pixel before rotation.
    pub base_direction: Vec4,
    pub x_pos_multiplier: f32,
    pub y_pos_multiplier: f32,
    /// Ray direction offset per pixel from the centre.
    pub x_dir_multiplier: f32,
    pub y_dir_multiplier: f32,
    /// Samples along each view ray.
    pub samples_in: i32,
    /// Samples along each light ray.
    pub samples_out: i32,
    /// Combination of [`MODE_RAYLEIGH`] and [`MODE_MIE`].
    pub mode: u32,
    pub _padding: u32,
}

impl CameraUniform {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Atmosphere uniform buffer data (binding 1).
///
/// # Memory Layout
///
/// - Offset 0: sun distance, sun radius, sun angle, planet radius
/// - Offset 16: surface pressure, density height, aerosol density height, Mie asymmetry
/// - Offset 32: upper limit, temperature, refractivity, scattering constant
/// - Offset 48: aerosol density, light intensity, padding
/// - Offset 64: wavelengths (vec4, w unused)
/// - Offset 80: light color (vec4)
/// - Total size: 96 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AtmosphereUniform {
    pub sun_distance: f32,
    pub sun_radius: f32,
    pub sun_angle: f32,
    pub planet_radius: f32,

    pub surface_pressure: f32,
    pub density_height: f32,
    pub aerosol_density_height: f32,
    pub mie_asymmetry: f32,

    pub upper_limit: f32,
    pub temperature: f32,
    pub refractivity: f32,
    pub scattering_k: f32,

    pub aerosol_density: f32,
    pub light_intensity: f32,
    pub _padding: [f32; 2],

    pub wavelengths: Vec4,
    pub light_color: Vec4,
}

impl AtmosphereUniform {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}
