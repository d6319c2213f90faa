//! Core utilities for the atmospheric scattering visualizer.
//!
//! This crate provides foundational types and utilities used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Configuration loading
//! - Frame timing
//! - Cooperative shutdown

mod config;
mod error;
mod logging;
mod quit;
mod timer;

pub use config::{
    AppConfig, CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE, GpuConfig, OverlayConfig, ShaderPaths,
    SimulationConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging};
pub use quit::QuitFlag;
pub use timer::{FrameRateCounter, Timer};
