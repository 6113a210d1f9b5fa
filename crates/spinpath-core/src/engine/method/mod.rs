//! The iteration-driving method abstraction.
//!
//! A [`Method`] owns (borrows) one or more images, knows how to compute the
//! physical force on a batch of configurations, and keeps the convergence
//! bookkeeping. [`iterate`] drives any method with any [`Solver`] until one
//! of the termination predicates fires.

pub mod gneb;
pub mod llg;
pub mod mmf;

use std::time::{Duration, Instant};

use nalgebra::Vector3;
use tracing::info;

use crate::core::constants;
use crate::core::system::{LlgParameters, SpinImage};
use crate::core::vectormath::{self, VectorField};
use crate::engine::config::MethodConfig;
use crate::engine::error::EngineError;
use crate::engine::output::TrajectoryWriter;
use crate::engine::signal::StopToken;
use crate::engine::solver::Solver;

/// Zeroes the force on pinned sites. Must run after all force terms have
/// been accumulated, never before.
pub(crate) fn apply_pinning_mask(parameters: &LlgParameters, force: &mut [Vector3<f64>]) {
    if let Some(mask) = &parameters.pinned {
        for (f, &pinned) in force.iter_mut().zip(mask.iter()) {
            if pinned {
                *f = Vector3::zeros();
            }
        }
    }
}

pub trait Method {
    fn name(&self) -> &'static str;

    /// Common loop parameters.
    fn common(&self) -> &MethodConfig;

    /// The images this method iterates, in order.
    fn images(&self) -> &[SpinImage];
    fn images_mut(&mut self) -> &mut [SpinImage];

    /// Physical force on every configuration of the batch.
    ///
    /// `configurations` is the solver's frozen snapshot; implementations
    /// must read it, never the live image spins, so all images see one
    /// consistent pre-iteration state.
    fn calculate_force(&mut self, configurations: &[VectorField], forces: &mut [VectorField]);

    /// Effective rotation-axis force used by the dynamics solvers, built on
    /// top of the physical force.
    ///
    /// The default is direct minimization: `f_v = (dtg / 2) s x f`, which
    /// rotates each spin toward its tangential force. The pinning mask is
    /// applied after all force terms.
    fn calculate_force_virtual(
        &mut self,
        configurations: &[VectorField],
        forces: &[VectorField],
        forces_virtual: &mut [VectorField],
    ) {
        let images = self.images();
        for (img, conf) in configurations.iter().enumerate() {
            let parameters = &images[img].parameters;
            let dtg = parameters.dt * constants::GAMMA / constants::MU_B;
            vectormath::set_c_cross(0.5 * dtg, conf, &forces[img], &mut forces_virtual[img]);
            apply_pinning_mask(parameters, &mut forces_virtual[img]);
        }
    }

    fn hook_pre_iteration(&mut self) {}
    fn hook_post_iteration(&mut self) {}

    /// True iff every owned image has converged (its maximum absolute
    /// tangential force component is at or below its threshold).
    fn force_converged(&self) -> bool;

    /// Maximum absolute tangential force component over all owned images.
    fn max_force_component(&self) -> f64;

    /// Method-specific veto; checked last in the termination order.
    fn iterations_allowed(&self) -> bool {
        true
    }

    fn finalize(&mut self) {}

    /// Writes the current state through the injected writer. Failures are
    /// logged by implementations and never abort the loop.
    fn save_current(
        &mut self,
        _writer: &mut dyn TrajectoryWriter,
        _iteration: u64,
        _initial: bool,
        _last: bool,
    ) {
    }
}

/// Why an iteration loop ended. The first true predicate wins, in this
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The external stop token was raised.
    StopRequested,
    /// All forces converged below threshold.
    Converged,
    /// The advisory wall-clock budget ran out.
    WalltimeReached,
    /// The iteration budget ran out.
    MaxIterations,
    /// The method vetoed further iteration.
    IterationsDisallowed,
}

impl StopReason {
    pub fn describe(&self) -> &'static str {
        match self {
            StopReason::StopRequested => "an external stop was requested",
            StopReason::Converged => "the force converged",
            StopReason::WalltimeReached => "the maximum walltime was reached",
            StopReason::MaxIterations => "the maximum number of iterations was reached",
            StopReason::IterationsDisallowed => "the method disallowed further iteration",
        }
    }
}

/// Summary of one finished iteration loop.
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub reason: StopReason,
    pub iterations: u64,
    pub steps: u64,
    pub max_force: f64,
    pub duration: Duration,
}

fn termination<M: Method>(
    method: &M,
    config: &MethodConfig,
    stop: &StopToken,
    elapsed: Duration,
    iteration: u64,
) -> Option<StopReason> {
    if stop.is_requested() {
        return Some(StopReason::StopRequested);
    }
    if method.force_converged() {
        return Some(StopReason::Converged);
    }
    if let Some(budget) = config.max_walltime() {
        if elapsed >= budget {
            return Some(StopReason::WalltimeReached);
        }
    }
    if iteration >= config.n_iterations {
        return Some(StopReason::MaxIterations);
    }
    if !method.iterations_allowed() {
        return Some(StopReason::IterationsDisallowed);
    }
    None
}

/// Drives `method` with `solver` until a termination predicate fires.
///
/// One outer step is `n_iterations_log` inner iterations; step boundaries
/// log progress and write snapshots. Termination predicates are polled at
/// every iteration boundary in the priority order of [`StopReason`].
pub fn iterate<M: Method>(
    method: &mut M,
    solver: &mut Solver,
    writer: &mut dyn TrajectoryWriter,
    stop: &StopToken,
) -> Result<IterationReport, EngineError> {
    let config = method.common().clone();
    let t_start = Instant::now();
    let mut t_last = t_start;

    info!(
        method = method.name(),
        solver = solver.kind().full_name(),
        n_iterations = config.n_iterations,
        n_iterations_log = config.n_iterations_log,
        force_convergence = config.force_convergence,
        max_force = method.max_force_component(),
        "started calculation"
    );

    if config.output.save_initial {
        method.save_current(writer, 0, true, false);
    }

    let mut iteration: u64 = 0;
    let mut step: u64 = 0;
    let reason = loop {
        if let Some(reason) = termination(method, &config, stop, t_start.elapsed(), iteration) {
            break reason;
        }

        method.hook_pre_iteration();
        solver.iteration(method)?;
        method.hook_post_iteration();
        iteration += 1;

        if iteration % config.n_iterations_log == 0 {
            step += 1;
            let now = Instant::now();
            let seconds = (now - t_last).as_secs_f64().max(1e-9);
            info!(
                method = method.name(),
                step,
                iteration,
                max_force = method.max_force_component(),
                iterations_per_second = config.n_iterations_log as f64 / seconds,
                "step finished"
            );
            t_last = now;
            method.save_current(writer, iteration, false, false);
        }
    };

    method.finalize();
    if config.output.save_final {
        method.save_current(writer, iteration, false, true);
    }

    let duration = t_start.elapsed();
    info!(
        method = method.name(),
        solver = solver.kind().name(),
        reason = reason.describe(),
        iterations = iteration,
        steps = step,
        max_force = method.max_force_component(),
        duration_secs = duration.as_secs_f64(),
        "terminated calculation"
    );

    Ok(IterationReport {
        reason,
        iterations: iteration,
        steps: step,
        max_force: method.max_force_component(),
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hamiltonian::ZeemanHamiltonian;
    use crate::core::system::{LlgParameters, SpinImage};
    use crate::engine::output::NullWriter;
    use crate::engine::solver::SolverKind;
    use super::llg::LlgMethod;
    use nalgebra::Vector3;

    fn relaxed_image() -> SpinImage {
        // Aligned with the field below: force is zero from the start.
        SpinImage::new(
            vec![Vector3::new(0.0, 0.0, 1.0)],
            LlgParameters::default(),
        )
        .unwrap()
    }

    fn config(n_iterations: u64) -> MethodConfig {
        MethodConfig::builder()
            .force_convergence(1e-7)
            .n_iterations(n_iterations)
            .n_iterations_log(1)
            .build()
            .unwrap()
    }

    #[test]
    fn stop_request_outranks_convergence() {
        let hamiltonian = ZeemanHamiltonian {
            field: Vector3::new(0.0, 0.0, 1.0),
        };
        let mut image = relaxed_image();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, config(1));
        let mut solver = Solver::new(SolverKind::Depondt, 1, 1);
        let stop = StopToken::new();
        stop.request_stop();

        let report = iterate(&mut method, &mut solver, &mut NullWriter, &stop).unwrap();
        assert_eq!(report.reason, StopReason::StopRequested);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn convergence_outranks_the_iteration_cap() {
        let hamiltonian = ZeemanHamiltonian {
            field: Vector3::new(0.0, 0.0, 1.0),
        };
        let mut image = relaxed_image();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, config(100));
        let mut solver = Solver::new(SolverKind::Depondt, 1, 1);

        let report = iterate(&mut method, &mut solver, &mut NullWriter, &StopToken::new()).unwrap();
        // The convergence flag is computed in the post-iteration hook, so
        // exactly one iteration runs before the predicate can fire.
        assert_eq!(report.reason, StopReason::Converged);
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn walltime_outranks_the_iteration_cap() {
        let hamiltonian = ZeemanHamiltonian {
            field: Vector3::new(1.0, 0.0, 0.0),
        };
        let mut image = relaxed_image();
        // A zero-second budget expires before the first iteration.
        let config = MethodConfig::builder()
            .force_convergence(1e-7)
            .n_iterations(100)
            .n_iterations_log(1)
            .max_walltime_secs(0)
            .build()
            .unwrap();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, config);
        let mut solver = Solver::new(SolverKind::Heun, 1, 1);

        let report = iterate(&mut method, &mut solver, &mut NullWriter, &StopToken::new()).unwrap();
        assert_eq!(report.reason, StopReason::WalltimeReached);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn iteration_cap_terminates_unconverged_runs() {
        let hamiltonian = ZeemanHamiltonian {
            field: Vector3::new(1.0, 0.0, 0.0),
        };
        let mut image = relaxed_image();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, config(3));
        let mut solver = Solver::new(SolverKind::Heun, 1, 1);

        let report = iterate(&mut method, &mut solver, &mut NullWriter, &StopToken::new()).unwrap();
        assert_eq!(report.reason, StopReason::MaxIterations);
        assert_eq!(report.iterations, 3);
    }

    #[test]
    fn pinning_mask_zeroes_pinned_sites_only() {
        let parameters = LlgParameters {
            pinned: Some(vec![true, false]),
            ..LlgParameters::default()
        };
        let mut force = vec![Vector3::new(1.0, 2.0, 3.0), Vector3::new(1.0, 2.0, 3.0)];
        apply_pinning_mask(&parameters, &mut force);
        assert!(force[0].norm() < 1e-15);
        assert!((force[1] - Vector3::new(1.0, 2.0, 3.0)).norm() < 1e-15);
    }
}
