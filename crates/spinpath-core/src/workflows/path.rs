use tracing::{info, instrument};

use crate::core::chain::Chain;
use crate::core::hamiltonian::Hamiltonian;
use crate::engine::config::GnebConfig;
use crate::engine::error::EngineError;
use crate::engine::method::gneb::GnebMethod;
use crate::engine::method::{self, IterationReport};
use crate::engine::output::TrajectoryWriter;
use crate::engine::signal::StopToken;
use crate::engine::solver::{Solver, SolverKind};

/// Outcome of a chain relaxation: the loop report plus the energy profile
/// along the relaxed path.
#[derive(Debug, Clone)]
pub struct PathResult {
    pub report: IterationReport,
    /// Cumulative geodesic distance of every image from image 0.
    pub reaction_coordinates: Vec<f64>,
    /// Energy of every image.
    pub energies: Vec<f64>,
    /// Cubic Hermite interpolation of the energy along the path.
    pub interpolated_energies: Vec<(f64, f64)>,
}

/// Relaxes a chain toward the minimum-energy path between its endpoints.
#[instrument(skip_all, name = "path_workflow")]
pub fn run<H: Hamiltonian>(
    chain: &mut Chain,
    hamiltonian: H,
    config: &GnebConfig,
    solver_kind: SolverKind,
    writer: &mut dyn TrajectoryWriter,
    stop: &StopToken,
) -> Result<PathResult, EngineError> {
    config.validate()?;
    let (noi, nos) = (chain.noi(), chain.nos());
    info!(
        noi,
        nos,
        spring_constant = config.spring_constant,
        solver = solver_kind.full_name(),
        "starting path relaxation"
    );

    let mut method = GnebMethod::new(chain, hamiltonian, config.clone());
    let mut solver = Solver::new(solver_kind, noi, nos);
    let report = method::iterate(&mut method, &mut solver, writer, stop)?;
    solver.finalize();

    let energies = method.energies().to_vec();
    let interpolated_energies = method.interpolated_energy_curve();
    drop(method);
    let reaction_coordinates = chain.reaction_coordinates().to_vec();
    Ok(PathResult {
        report,
        reaction_coordinates,
        energies,
        interpolated_energies,
    })
}
