//! Physical description of the sun, the planet and its atmosphere.
//!
//! All lengths are in metres, pressures in pascals, temperatures in kelvin.

use glam::Vec4;
use tracing::debug;

/// Universal gas constant, J/(mol·K).
pub const GAS_CONSTANT: f64 = 8.314_462_1;

/// Avogadro constant, 1/mol.
pub const AVOGADRO: f64 = 6.022_140_76e23;

/// The light source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sun {
    pub distance: f32,
    pub radius: f32,
    /// Elevation angle in degrees, kept in [0, 360).
    pub angle: f32,
    /// Red, green and blue wavelengths in nanometres.
    pub wavelengths: [f32; 3],
    pub light_intensity: f32,
    pub light_color: Vec4,
}

impl Default for Sun {
    fn default() -> Self {
        Self {
            distance: 1.496e11,
            radius: 1.3914e9,
            angle: 50.0,
            wavelengths: [630.0, 525.0, 440.0],
            light_intensity: 50.0,
            light_color: Vec4::ONE,
        }
    }
}

impl Sun {
    /// Rotates the sun by `degrees`, wrapping the angle into [0, 360).
    pub fn rotate(&mut self, degrees: f32) {
        self.angle = (self.angle + degrees).rem_euclid(360.0);
        // rem_euclid can round up to exactly 360 for tiny negative inputs
        if self.angle >= 360.0 {
            self.angle = 0.0;
        }
    }
}

/// Gas envelope of a planet, modelled with constant temperature and
/// exponential density falloff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Atmosphere {
    pub surface_pressure: f32,
    /// Height at which the air reaches its average density.
    pub density_height: f32,
    /// Height at which aerosols reach their average density.
    pub aerosol_density_height: f32,
    /// Relative amount of aerosols.
    pub aerosol_density: f32,
    /// Henyey-Greenstein asymmetry factor for Mie scattering.
    pub mie_asymmetry: f32,
    pub upper_limit: f32,
    pub temperature: f32,
    /// Molar mass of air, kg/mol.
    pub molar_mass: f32,
    /// Refractive index of air at the surface.
    pub refractivity: f32,
}

impl Default for Atmosphere {
    fn default() -> Self {
        Self {
            surface_pressure: 101_325.0,
            density_height: 8_700.0,
            aerosol_density_height: 1_200.0,
            aerosol_density: 0.1,
            mie_asymmetry: 0.90,
            upper_limit: 100_000.0,
            temperature: 270.0,
            molar_mass: 0.028_964_4,
            refractivity: 1.000_279_3,
        }
    }
}

impl Atmosphere {
    /// Number of molecules per cubic metre at the surface.
    pub fn surface_molecule_density(&self) -> f64 {
        let pressure = f64::from(self.surface_pressure);
        let temperature = f64::from(self.temperature);
        pressure / (GAS_CONSTANT * temperature) * AVOGADRO
    }

    /// Rayleigh scattering constant `K = 2π²(n²−1)² / (3·N_s)`.
    pub fn scattering_constant(&self) -> f64 {
        let n = f64::from(self.refractivity);
        let polarizability = n * n - 1.0;
        2.0 * std::f64::consts::PI.powi(2) * polarizability.powi(2)
            / (3.0 * self.surface_molecule_density())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Planet {
    pub radius: f32,
    pub atmosphere: Atmosphere,
}

impl Default for Planet {
    fn default() -> Self {
        Self {
            radius: 6_371_000.0,
            atmosphere: Atmosphere::default(),
        }
    }
}

/// Inputs of the scattering constant.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ScatteringInputs {
    surface_pressure: f32,
    temperature: f32,
    molar_mass: f32,
    refractivity: f32,
}

impl From<&Atmosphere> for ScatteringInputs {
    fn from(atmosphere: &Atmosphere) -> Self {
        Self {
            surface_pressure: atmosphere.surface_pressure,
            temperature: atmosphere.temperature,
            molar_mass: atmosphere.molar_mass,
            refractivity: atmosphere.refractivity,
        }
    }
}

/// Scattering constant that is recomputed only when its inputs change.
#[derive(Clone, Debug, Default)]
pub struct ScatteringCache {
    inputs: Option<ScatteringInputs>,
    value: f32,
    recomputations: u64,
}

impl ScatteringCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns K for `atmosphere`, recomputing it if the surface pressure,
    /// temperature, molar mass or refractivity differ from the last call.
    pub fn get(&mut self, atmosphere: &Atmosphere) -> f32 {
        let inputs = ScatteringInputs::from(atmosphere);
        if self.inputs != Some(inputs) {
            self.value = atmosphere.scattering_constant() as f32;
            self.inputs = Some(inputs);
            self.recomputations += 1;
            debug!("Recomputed scattering constant: {:e}", self.value);
        }
        self.value
    }

    /// Number of times K has been computed.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scattering_constant() {
        let k = Atmosphere::default().scattering_constant();
        assert!(k > 7.4e-32 && k < 7.7e-32, "K = {k:e}");
    }

    #[test]
    fn test_molecule_density_at_sea_level() {
        let n = Atmosphere::default().surface_molecule_density();
        assert!((n / 2.718e25 - 1.0).abs() < 1e-3, "N_s = {n:e}");
    }

    #[test]
    fn test_denser_air_scatters_less_per_molecule() {
        let thin = Atmosphere::default();
        let dense = Atmosphere {
            surface_pressure: thin.surface_pressure * 2.0,
            ..thin
        };
        let ratio = thin.scattering_constant() / dense.scattering_constant();
        assert!((ratio - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cache_recomputes_only_on_input_change() {
        let mut cache = ScatteringCache::new();
        let mut atmosphere = Atmosphere::default();

        let first = cache.get(&atmosphere);
        cache.get(&atmosphere);
        assert_eq!(cache.recomputations(), 1);

        // Not an input of K.
        atmosphere.aerosol_density = 0.5;
        assert_eq!(cache.get(&atmosphere), first);
        assert_eq!(cache.recomputations(), 1);

        atmosphere.temperature = 300.0;
        let warmer = cache.get(&atmosphere);
        assert_eq!(cache.recomputations(), 2);
        assert!(warmer > first);

        atmosphere.molar_mass = 0.03;
        cache.get(&atmosphere);
        assert_eq!(cache.recomputations(), 3);
    }

    #[test]
    fn test_sun_rotation_wraps() {
        let mut sun = Sun {
            angle: 359.5,
            ..Sun::default()
        };
        sun.rotate(0.75);
        assert!((sun.angle - 0.25).abs() < 1e-4);

        sun.rotate(-0.5);
        assert!((sun.angle - 359.75).abs() < 1e-3);

        sun.angle = 0.0;
        sun.rotate(-720.0);
        assert!(sun.angle >= 0.0 && sun.angle < 360.0);
    }

    #[test]
    fn test_defaults() {
        let planet = Planet::default();
        assert_eq!(planet.radius, 6_371_000.0);
        assert_eq!(planet.atmosphere.surface_pressure, 101_325.0);
        assert_eq!(Sun::default().wavelengths, [630.0, 525.0, 440.0]);
    }
}
