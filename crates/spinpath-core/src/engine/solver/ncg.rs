//! Nonlinear conjugate-gradient solver (Polak-Ribiere+).
//!
//! Search directions are built from the tangentially projected force. A
//! trial step is only accepted when it does not increase the per-image
//! convergence metric (maximum absolute tangential force component); a
//! rejected trial halves that image's step size and restarts the direction
//! from the plain force.

use crate::core::vectormath::{self, VectorField};
use crate::engine::error::EngineError;
use crate::engine::method::Method;

const STEP_GROW: f64 = 1.1;
const STEP_SHRINK: f64 = 0.5;

pub(super) struct Buffers {
    forces_previous: Vec<VectorField>,
    directions: Vec<VectorField>,
    projected: Vec<VectorField>,
    candidates: Vec<VectorField>,
    trial_forces: Vec<VectorField>,
    trial_projected: Vec<VectorField>,
    metrics: Vec<f64>,
    trial_metrics: Vec<f64>,
    step_sizes: Vec<f64>,
    initialized: Vec<bool>,
}

impl Buffers {
    pub(super) fn new(noi: usize, nos: usize) -> Self {
        let fields = |_: usize| vectormath::zeros(nos);
        Self {
            forces_previous: (0..noi).map(fields).collect(),
            directions: (0..noi).map(fields).collect(),
            projected: (0..noi).map(fields).collect(),
            candidates: (0..noi).map(fields).collect(),
            trial_forces: (0..noi).map(fields).collect(),
            trial_projected: (0..noi).map(fields).collect(),
            metrics: vec![0.0; noi],
            trial_metrics: vec![0.0; noi],
            step_sizes: vec![0.0; noi],
            initialized: vec![false; noi],
        }
    }

    pub(super) fn step<M: Method>(
        &mut self,
        method: &mut M,
        configurations: &[VectorField],
        forces: &[VectorField],
    ) -> Result<(), EngineError> {
        super::project_forces(forces, configurations, &mut self.projected, &mut self.metrics);

        // Build candidate configurations for all images first; the trial
        // force evaluation needs them as one batch.
        for (img, image) in method.images().iter().enumerate() {
            let force = &self.projected[img];
            if !self.initialized[img] {
                self.step_sizes[img] = image.parameters.dt;
                self.directions[img].copy_from_slice(force);
                self.initialized[img] = true;
            } else {
                let previous = &self.forces_previous[img];
                let denominator = vectormath::dot(previous, previous);
                let beta = if denominator > 0.0 {
                    let mut numerator = 0.0;
                    for (f, p) in force.iter().zip(previous.iter()) {
                        numerator += f.dot(&(f - p));
                    }
                    (numerator / denominator).max(0.0)
                } else {
                    0.0
                };
                for (d, f) in self.directions[img].iter_mut().zip(force.iter()) {
                    *d = f + beta * *d;
                }
            }

            let step = self.step_sizes[img];
            for i in 0..force.len() {
                let trial = configurations[img][i] + step * self.directions[img][i];
                self.candidates[img][i] =
                    vectormath::try_normalize(trial).unwrap_or(configurations[img][i]);
            }
        }

        method.calculate_force(&self.candidates, &mut self.trial_forces);
        super::project_forces(
            &self.trial_forces,
            &self.candidates,
            &mut self.trial_projected,
            &mut self.trial_metrics,
        );

        for (img, image) in method.images_mut().iter_mut().enumerate() {
            if self.trial_metrics[img] <= self.metrics[img] {
                image.spins.copy_from_slice(&self.candidates[img]);
                self.step_sizes[img] *= STEP_GROW;
            } else {
                // Rejected: keep the configuration, shrink, restart the
                // direction from the plain force.
                self.step_sizes[img] *= STEP_SHRINK;
                self.directions[img].copy_from_slice(&self.projected[img]);
            }
            self.forces_previous[img].copy_from_slice(&self.projected[img]);
        }
        Ok(())
    }
}
