use tracing::{info, instrument};

use crate::core::hamiltonian::Hamiltonian;
use crate::core::system::SpinImage;
use crate::engine::config::MethodConfig;
use crate::engine::error::EngineError;
use crate::engine::method::llg::LlgMethod;
use crate::engine::method::{self, IterationReport};
use crate::engine::output::TrajectoryWriter;
use crate::engine::signal::StopToken;
use crate::engine::solver::{Solver, SolverKind};

/// Runs LLG dynamics (or, with a minimization solver, energy descent) on a
/// single image until convergence, budget exhaustion, or a stop request.
#[instrument(skip_all, name = "dynamics_workflow")]
pub fn run<H: Hamiltonian>(
    system: &mut SpinImage,
    hamiltonian: H,
    config: &MethodConfig,
    solver_kind: SolverKind,
    writer: &mut dyn TrajectoryWriter,
    stop: &StopToken,
) -> Result<IterationReport, EngineError> {
    config.validate()?;
    let nos = system.nos();
    info!(nos, solver = solver_kind.full_name(), "starting spin dynamics");

    let mut method = LlgMethod::new(system, hamiltonian, config.clone());
    let mut solver = Solver::new(solver_kind, 1, nos);
    let report = method::iterate(&mut method, &mut solver, writer, stop)?;
    solver.finalize();
    Ok(report)
}
