//! Heun solver: explicit predictor-corrector with the linearized rotation
//! `ds = f_v x s`, averaged between the start and predicted configurations,
//! renormalized after the corrector.

use crate::core::vectormath::{self, VectorField};
use crate::engine::error::EngineError;
use crate::engine::method::Method;

pub(super) struct Buffers {
    predicted: Vec<VectorField>,
    forces_predicted: Vec<VectorField>,
    forces_virtual_predicted: Vec<VectorField>,
}

impl Buffers {
    pub(super) fn new(noi: usize, nos: usize) -> Self {
        Self {
            predicted: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            forces_predicted: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            forces_virtual_predicted: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
        }
    }

    pub(super) fn step<M: Method>(
        &mut self,
        method: &mut M,
        configurations: &[VectorField],
        forces_virtual: &[VectorField],
    ) -> Result<(), EngineError> {
        // Predictor. The Euler offset f_v x s is perpendicular to s, so the
        // predictor norm is >= 1 and plain division is safe.
        for (img, conf) in configurations.iter().enumerate() {
            for i in 0..conf.len() {
                let p = conf[i] + forces_virtual[img][i].cross(&conf[i]);
                self.predicted[img][i] = p / p.norm();
            }
        }

        method.calculate_force(&self.predicted, &mut self.forces_predicted);
        method.calculate_force_virtual(
            &self.predicted,
            &self.forces_predicted,
            &mut self.forces_virtual_predicted,
        );

        // Corrector: average the start and predicted rotations.
        for (img, image) in method.images_mut().iter_mut().enumerate() {
            for i in 0..image.spins.len() {
                let start = configurations[img][i];
                let delta_start = forces_virtual[img][i].cross(&start);
                let delta_predicted =
                    self.forces_virtual_predicted[img][i].cross(&self.predicted[img][i]);
                image.spins[i] = start + 0.5 * (delta_start + delta_predicted);
            }
            image.normalize_spins()?;
        }
        Ok(())
    }
}
