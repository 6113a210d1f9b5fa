//! Semi-implicit midpoint solver (SIB).
//!
//! The implicit midpoint update `s' = s + a x (s + s')` with `a = f_v / 2`
//! has the closed-form Cayley solution used here; it is a rotation, so the
//! unit norm is preserved exactly without post-hoc renormalization.

use nalgebra::Vector3;

use crate::core::vectormath::{self, VectorField};
use crate::engine::error::EngineError;
use crate::engine::method::Method;

/// `(I - [a]x)^-1 (I + [a]x) s` — the Cayley rotation of `s` by axis `a`.
pub(super) fn cayley(s: Vector3<f64>, a: Vector3<f64>) -> Vector3<f64> {
    let u = s + a.cross(&s);
    (u + a.cross(&u) + a.dot(&u) * a) / (1.0 + a.norm_squared())
}

pub(super) struct Buffers {
    midpoint: Vec<VectorField>,
    forces_midpoint: Vec<VectorField>,
    forces_virtual_midpoint: Vec<VectorField>,
}

impl Buffers {
    pub(super) fn new(noi: usize, nos: usize) -> Self {
        Self {
            midpoint: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            forces_midpoint: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            forces_virtual_midpoint: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
        }
    }

    pub(super) fn step<M: Method>(
        &mut self,
        method: &mut M,
        configurations: &[VectorField],
        forces_virtual: &[VectorField],
    ) -> Result<(), EngineError> {
        // Predictor: full Cayley step, then average with the start to get
        // the midpoint configuration the force is re-evaluated at.
        for (img, conf) in configurations.iter().enumerate() {
            for i in 0..conf.len() {
                let a = 0.5 * forces_virtual[img][i];
                let predicted = cayley(conf[i], a);
                self.midpoint[img][i] = 0.5 * (conf[i] + predicted);
            }
        }

        method.calculate_force(&self.midpoint, &mut self.forces_midpoint);
        method.calculate_force_virtual(
            &self.midpoint,
            &self.forces_midpoint,
            &mut self.forces_virtual_midpoint,
        );

        // True step: Cayley rotation from the start with the midpoint force.
        for (img, image) in method.images_mut().iter_mut().enumerate() {
            for i in 0..image.spins.len() {
                let a = 0.5 * self.forces_virtual_midpoint[img][i];
                image.spins[i] = cayley(configurations[img][i], a);
            }
        }
        Ok(())
    }
}
