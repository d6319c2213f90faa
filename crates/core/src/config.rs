//! Application configuration.
//!
//! Values come from a TOML file when one is present and fall back to the
//! defaults below field by field, so a file only needs the keys it changes:
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [overlay]
//! enabled = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::{Error, Result};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "SKYSCATTER_CONFIG";

/// File picked up from the working directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "skyscatter.toml";

/// Smallest accepted uniform budget; both payloads must fit in half of it.
const MIN_UNIFORM_MEMORY: u64 = 512;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub gpu: GpuConfig,
    pub overlay: OverlayConfig,
    pub shaders: ShaderPaths,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 900,
            title: "Atmospheric Scattering".to_string(),
        }
    }
}

/// Device and frame-loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    /// Enable the Khronos validation layer and debug messenger.
    pub validation: bool,
    /// Upper bound on a single swapchain image acquire.
    pub acquire_timeout_ms: u64,
    /// Upper bound on the per-frame fence wait.
    pub fence_timeout_ms: u64,
    /// Total uniform memory per frame, split evenly between the two payload buffers.
    pub max_uniform_memory: u64,
    /// FIFO presentation when true, otherwise the lowest-latency mode available.
    pub vsync: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            acquire_timeout_ms: 1000,
            fence_timeout_ms: 1000,
            max_uniform_memory: 1 << 16,
            vsync: true,
        }
    }
}

impl GpuConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    /// Size of each per-frame payload buffer in bytes.
    pub fn payload_buffer_size(&self) -> u64 {
        self.max_uniform_memory / 2
    }
}

/// Settings for the UI compositing stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// When false the graphics submission is skipped and presentation waits
    /// directly on the compute stage.
    pub enabled: bool,
    /// Capacity of the per-frame overlay vertex buffer.
    pub max_vertices: u32,
    /// Capacity of the per-frame overlay index buffer.
    pub max_indices: u32,
    /// Pixel height of the UI font.
    pub font_size: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_vertices: 1 << 16,
            max_indices: 1 << 17,
            font_size: 13.0,
        }
    }
}

/// Locations of the precompiled SPIR-V modules.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShaderPaths {
    pub compute: PathBuf,
    pub overlay_vertex: PathBuf,
    pub overlay_fragment: PathBuf,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            compute: PathBuf::from("shaders/spirv/atmosphere.comp.spv"),
            overlay_vertex: PathBuf::from("shaders/spirv/overlay.vert.spv"),
            overlay_fragment: PathBuf::from("shaders/spirv/overlay.frag.spv"),
        }
    }
}

/// Initial simulation controls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub samples_in: i32,
    pub samples_out: i32,
    pub camera_speed: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            samples_in: 10,
            samples_out: 10,
            camera_speed: 1.0,
        }
    }
}

impl AppConfig {
    /// Load the configuration.
    ///
    /// Resolution order: the file named by [`CONFIG_ENV_VAR`], then
    /// [`DEFAULT_CONFIG_FILE`] in the working directory, then defaults.
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Self::from_file(local);
        }

        debug!("No configuration file found, using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the frame loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.gpu.acquire_timeout_ms == 0 || self.gpu.fence_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }
        if self.gpu.max_uniform_memory < MIN_UNIFORM_MEMORY {
            return Err(Error::Config(format!(
                "max_uniform_memory must be at least {} bytes, got {}",
                MIN_UNIFORM_MEMORY, self.gpu.max_uniform_memory
            )));
        }
        if self.overlay.enabled {
            let overlay = &self.overlay;
            if overlay.max_vertices == 0 || overlay.max_indices == 0 {
                return Err(Error::Config(
                    "overlay buffer capacities must be non-zero when the overlay is enabled"
                        .to_string(),
                ));
            }
            if !(overlay.font_size.is_finite() && overlay.font_size > 0.0) {
                return Err(Error::Config(format!(
                    "overlay.font_size must be positive, got {}",
                    overlay.font_size
                )));
            }
        }
        if self.simulation.samples_in < 1 || self.simulation.samples_out < 1 {
            return Err(Error::Config("sample counts must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bootstrap_values() {
        let config = AppConfig::default();
        assert_eq!(config.window.width, 1600);
        assert_eq!(config.window.height, 900);
        assert_eq!(config.gpu.max_uniform_memory, 65536);
        assert_eq!(config.gpu.payload_buffer_size(), 32768);
        assert_eq!(config.gpu.acquire_timeout(), Duration::from_secs(1));
        assert!(config.overlay.enabled);
        assert_eq!(config.overlay.max_vertices, 65536);
        assert_eq!(config.simulation.samples_in, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [window]
            width = 800

            [overlay]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 900);
        assert!(!config.overlay.enabled);
        assert_eq!(config.gpu.fence_timeout_ms, 1000);
        assert_eq!(
            config.shaders.compute,
            PathBuf::from("shaders/spirv/atmosphere.comp.spv")
        );
    }

    #[test]
    fn test_rejects_zero_window() {
        let result = AppConfig::from_toml_str("[window]\nheight = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_small_uniform_budget() {
        let result = AppConfig::from_toml_str("[gpu]\nmax_uniform_memory = 64\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_overlay_capacity_checked_only_when_enabled() {
        let result = AppConfig::from_toml_str("[overlay]\nmax_indices = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));

        let config =
            AppConfig::from_toml_str("[overlay]\nenabled = false\nmax_vertices = 0\n").unwrap();
        assert_eq!(config.overlay.max_vertices, 0);
    }

    #[test]
    fn test_rejects_non_positive_font_size() {
        let result = AppConfig::from_toml_str("[overlay]\nfont_size = 0.0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let result = AppConfig::from_toml_str("[window\nwidth = 3");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
