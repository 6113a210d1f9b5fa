//! The injected energy capability.
//!
//! The solver core never models the physical energy functional itself. A
//! `Hamiltonian` hands back the energy and gradient of a configuration and
//! must be deterministic for identical input. Non-finite values are passed
//! through unmodified; the core performs no retry or repair.

use nalgebra::Vector3;

/// Energy and energy-gradient provider for a spin configuration.
///
/// `Sync` is required so independent images may be evaluated in parallel.
pub trait Hamiltonian: Sync {
    /// Total energy of the configuration [meV].
    fn energy(&self, spins: &[Vector3<f64>]) -> f64;

    /// Energy gradient dE/ds per site, written into `gradient`.
    fn gradient(&self, spins: &[Vector3<f64>], gradient: &mut [Vector3<f64>]);
}

impl<H: Hamiltonian + ?Sized> Hamiltonian for &H {
    fn energy(&self, spins: &[Vector3<f64>]) -> f64 {
        (**self).energy(spins)
    }

    fn gradient(&self, spins: &[Vector3<f64>], gradient: &mut [Vector3<f64>]) {
        (**self).gradient(spins, gradient)
    }
}

/// Uniform external field: `E = -sum_i mu_s * s_i . B`.
#[derive(Debug, Clone)]
pub struct ZeemanHamiltonian {
    pub field: Vector3<f64>,
}

impl Hamiltonian for ZeemanHamiltonian {
    fn energy(&self, spins: &[Vector3<f64>]) -> f64 {
        -spins.iter().map(|s| s.dot(&self.field)).sum::<f64>()
    }

    fn gradient(&self, spins: &[Vector3<f64>], gradient: &mut [Vector3<f64>]) {
        debug_assert_eq!(spins.len(), gradient.len());
        for g in gradient.iter_mut() {
            *g = -self.field;
        }
    }
}

/// Uniaxial anisotropy: `E = -k sum_i (s_i . a)^2` with unit axis `a`.
///
/// Two degenerate minima at +-a and a saddle ring on the equator make this
/// the smallest useful landscape for path and saddle-search tests.
#[derive(Debug, Clone)]
pub struct UniaxialAnisotropyHamiltonian {
    pub axis: Vector3<f64>,
    pub strength: f64,
}

impl Hamiltonian for UniaxialAnisotropyHamiltonian {
    fn energy(&self, spins: &[Vector3<f64>]) -> f64 {
        -self.strength
            * spins
                .iter()
                .map(|s| s.dot(&self.axis).powi(2))
                .sum::<f64>()
    }

    fn gradient(&self, spins: &[Vector3<f64>], gradient: &mut [Vector3<f64>]) {
        debug_assert_eq!(spins.len(), gradient.len());
        for (s, g) in spins.iter().zip(gradient.iter_mut()) {
            *g = -2.0 * self.strength * s.dot(&self.axis) * self.axis;
        }
    }
}
