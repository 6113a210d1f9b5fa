//! Limited-memory BFGS solver.
//!
//! Quasi-Newton directions come from the standard two-loop recursion over a
//! short history of flattened displacement / gradient-change pairs, per
//! image. Acceptance follows the same non-increase rule as NCG: a trial
//! step that raises the per-image convergence metric is rejected, halving
//! the step size and clearing that image's history.

use std::collections::VecDeque;

use nalgebra::DVector;

use crate::core::vectormath::{self, VectorField};
use crate::engine::error::EngineError;
use crate::engine::method::Method;

const HISTORY: usize = 5;
const STEP_GROW: f64 = 1.1;
const STEP_SHRINK: f64 = 0.5;
/// Curvature products below this are skipped instead of poisoning the
/// inverse-Hessian estimate.
const CURVATURE_EPSILON: f64 = 1e-14;

struct Pair {
    /// Displacement `x_new - x_old`, flattened.
    s: DVector<f64>,
    /// Gradient change `g_new - g_old = f_old - f_new`, flattened.
    y: DVector<f64>,
    /// `1 / (y . s)`.
    rho: f64,
}

fn flatten(field: &[nalgebra::Vector3<f64>]) -> DVector<f64> {
    let mut out = DVector::zeros(3 * field.len());
    for (i, v) in field.iter().enumerate() {
        out[3 * i] = v.x;
        out[3 * i + 1] = v.y;
        out[3 * i + 2] = v.z;
    }
    out
}

/// Two-loop recursion: applies the inverse-Hessian estimate to the force.
fn direction(history: &VecDeque<Pair>, force: &DVector<f64>) -> DVector<f64> {
    let mut q = force.clone();
    let mut alphas = Vec::with_capacity(history.len());
    for pair in history.iter().rev() {
        let alpha = pair.rho * pair.s.dot(&q);
        q.axpy(-alpha, &pair.y, 1.0);
        alphas.push(alpha);
    }
    if let Some(last) = history.back() {
        let scale = last.s.dot(&last.y) / last.y.dot(&last.y);
        q *= scale;
    }
    for (pair, alpha) in history.iter().zip(alphas.into_iter().rev()) {
        let beta = pair.rho * pair.y.dot(&q);
        q.axpy(alpha - beta, &pair.s, 1.0);
    }
    q
}

pub(super) struct Buffers {
    histories: Vec<VecDeque<Pair>>,
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
            histories: (0..noi).map(|_| VecDeque::with_capacity(HISTORY)).collect(),
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

        for (img, image) in method.images().iter().enumerate() {
            if !self.initialized[img] {
                self.step_sizes[img] = image.parameters.dt;
                self.initialized[img] = true;
            }
            let force_flat = flatten(&self.projected[img]);
            let d = direction(&self.histories[img], &force_flat);
            let step = self.step_sizes[img];
            for i in 0..self.candidates[img].len() {
                let delta =
                    nalgebra::Vector3::new(d[3 * i], d[3 * i + 1], d[3 * i + 2]);
                let trial = configurations[img][i] + step * delta;
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
                let s = flatten(&self.candidates[img]) - flatten(&configurations[img]);
                let y = flatten(&self.projected[img]) - flatten(&self.trial_projected[img]);
                let curvature = y.dot(&s);
                if curvature > CURVATURE_EPSILON {
                    if self.histories[img].len() == HISTORY {
                        self.histories[img].pop_front();
                    }
                    self.histories[img].push_back(Pair {
                        s,
                        y,
                        rho: 1.0 / curvature,
                    });
                }
                image.spins.copy_from_slice(&self.candidates[img]);
                self.step_sizes[img] *= STEP_GROW;
            } else {
                self.step_sizes[img] *= STEP_SHRINK;
                self.histories[img].clear();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_yields_steepest_descent() {
        let history = VecDeque::new();
        let force = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let d = direction(&history, &force);
        assert!((&d - &force).norm() < 1e-15);
    }

    #[test]
    fn two_loop_recursion_scales_with_curvature() {
        // One exact pair from a quadratic with Hessian 2*I: the recursion
        // must return H^-1 f = f / 2.
        let s = DVector::from_vec(vec![1.0, 0.0]);
        let y = DVector::from_vec(vec![2.0, 0.0]);
        let rho = 1.0 / y.dot(&s);
        let mut history = VecDeque::new();
        history.push_back(Pair { s, y, rho });
        let force = DVector::from_vec(vec![4.0, 0.0]);
        let d = direction(&history, &force);
        assert!((d[0] - 2.0).abs() < 1e-12);
    }
}
