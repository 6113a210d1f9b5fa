//! A single spin configuration with its derived quantities.

use nalgebra::Vector3;
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use super::vectormath::{self, VectorField};

#[derive(Debug, Error, PartialEq)]
pub enum SystemError {
    #[error("Spin at site {site} has (near-)zero norm: division by zero in renormalization")]
    DegenerateSpin { site: usize },

    #[error("Empty spin configuration")]
    Empty,

    #[error("Pinning mask has {mask} entries but the configuration has {nos} sites")]
    MaskSizeMismatch { mask: usize, nos: usize },

    #[error("Chain needs at least two images, got {0}")]
    ChainTooShort(usize),

    #[error("Chain image has {found} sites, expected {expected}")]
    ImageSizeMismatch { found: usize, expected: usize },
}

/// Per-image method parameters for precessional dynamics.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlgParameters {
    /// Temperature [K]. Carried with the image; does not enter the
    /// deterministic force path.
    pub temperature: f64,
    /// Gilbert damping.
    pub damping: f64,
    /// Time step per iteration [ps].
    pub dt: f64,
    /// Spin-transfer-torque magnitude (proportional to injected current).
    pub stt_magnitude: f64,
    /// Spin-current polarisation normal.
    pub stt_polarisation_normal: Vector3<f64>,
    /// Convergence threshold on the maximum absolute tangential force
    /// component. Method constructors overwrite this with the configured
    /// loop threshold, so it always matches the running method.
    pub force_convergence: f64,
    /// Sites where all forces are zeroed after every force term has been
    /// applied. `true` = pinned.
    #[serde(skip)]
    pub pinned: Option<Vec<bool>>,
    /// Best-effort recovery for zero-norm spins: substitute a random unit
    /// vector instead of failing. Off by default.
    pub recover_degenerate_spins: bool,
}

impl Default for LlgParameters {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            damping: 0.3,
            dt: 1e-3,
            stt_magnitude: 0.0,
            stt_polarisation_normal: Vector3::new(0.0, 0.0, 1.0),
            force_convergence: 1e-7,
            pinned: None,
            recover_degenerate_spins: false,
        }
    }
}

/// One image: a spin configuration plus its scalar energy, effective field,
/// and method parameters.
#[derive(Debug, Clone)]
pub struct SpinImage {
    pub spins: VectorField,
    pub effective_field: VectorField,
    pub energy: f64,
    pub parameters: LlgParameters,
}

impl SpinImage {
    /// Builds an image from raw spin directions. The directions are
    /// normalized on entry so the unit-norm invariant holds from the start.
    pub fn new(spins: VectorField, parameters: LlgParameters) -> Result<Self, SystemError> {
        if spins.is_empty() {
            return Err(SystemError::Empty);
        }
        if let Some(mask) = &parameters.pinned {
            if mask.len() != spins.len() {
                return Err(SystemError::MaskSizeMismatch {
                    mask: mask.len(),
                    nos: spins.len(),
                });
            }
        }
        let nos = spins.len();
        let mut image = Self {
            spins,
            effective_field: vectormath::zeros(nos),
            energy: 0.0,
            parameters,
        };
        image.normalize_spins()?;
        Ok(image)
    }

    /// Number of lattice sites.
    pub fn nos(&self) -> usize {
        self.spins.len()
    }

    /// Renormalizes every spin to unit length.
    ///
    /// A zero-norm spin is a division by zero on the constraint surface.
    /// With `recover_degenerate_spins` set, the documented best-effort
    /// recovery substitutes a uniformly random unit vector and continues;
    /// otherwise the degeneracy is an error.
    pub fn normalize_spins(&mut self) -> Result<(), SystemError> {
        for (site, spin) in self.spins.iter_mut().enumerate() {
            match vectormath::try_normalize(*spin) {
                Some(unit) => *spin = unit,
                None if self.parameters.recover_degenerate_spins => {
                    warn!(site, "zero-norm spin detected, substituting a random unit vector");
                    *spin = random_unit_vector(&mut rand::thread_rng());
                }
                None => return Err(SystemError::DegenerateSpin { site }),
            }
        }
        Ok(())
    }
}

/// Uniformly distributed point on the unit sphere, from two uniforms.
pub fn random_unit_vector<R: Rng>(rng: &mut R) -> Vector3<f64> {
    let z: f64 = rng.sample(rand::distributions::Uniform::new_inclusive(-1.0, 1.0));
    let phi: f64 = rng.sample(rand::distributions::Uniform::new(
        0.0,
        2.0 * std::f64::consts::PI,
    ));
    let r = (1.0 - z * z).sqrt();
    Vector3::new(r * phi.cos(), r * phi.sin(), z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_normalizes_spins() {
        let image = SpinImage::new(
            vec![Vector3::new(0.0, 0.0, 2.0), Vector3::new(3.0, 0.0, 0.0)],
            LlgParameters::default(),
        )
        .unwrap();
        for spin in &image.spins {
            assert!((spin.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_norm_spin_is_an_error_by_default() {
        let result = SpinImage::new(
            vec![Vector3::zeros()],
            LlgParameters::default(),
        );
        assert_eq!(result.unwrap_err(), SystemError::DegenerateSpin { site: 0 });
    }

    #[test]
    fn zero_norm_spin_recovers_when_policy_enabled() {
        let parameters = LlgParameters {
            recover_degenerate_spins: true,
            ..LlgParameters::default()
        };
        let image = SpinImage::new(vec![Vector3::zeros()], parameters).unwrap();
        assert!((image.spins[0].norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_pinning_mask_is_rejected() {
        let parameters = LlgParameters {
            pinned: Some(vec![true]),
            ..LlgParameters::default()
        };
        let result = SpinImage::new(
            vec![Vector3::new(0.0, 0.0, 1.0), Vector3::new(0.0, 0.0, 1.0)],
            parameters,
        );
        assert_eq!(
            result.unwrap_err(),
            SystemError::MaskSizeMismatch { mask: 1, nos: 2 }
        );
    }

    #[test]
    fn random_unit_vectors_are_unit() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let v = random_unit_vector(&mut rng);
            assert!((v.norm() - 1.0).abs() < 1e-12);
        }
    }
}
