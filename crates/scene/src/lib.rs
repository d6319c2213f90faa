//! Scene state for the scattering renderer.
//!
//! This crate provides:
//! - Physical parameters of the sun, planet and atmosphere
//! - The free-flying observer camera
//! - The uniform payloads written to the GPU each frame

pub mod atmosphere;
pub mod camera;
pub mod payload;
pub mod simulation;

pub use atmosphere::{Atmosphere, Planet, ScatteringCache, Sun};
pub use camera::Camera;
pub use payload::{AtmosphereUniform, CameraUniform, MODE_MIE, MODE_RAYLEIGH};
pub use simulation::{MotionInput, RenderSettings, Simulation};
