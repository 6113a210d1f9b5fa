use tracing::{info, instrument};

use crate::core::chain::{ChainCollection, ImageKind};
use crate::core::hamiltonian::Hamiltonian;
use crate::engine::config::MmfConfig;
use crate::engine::error::EngineError;
use crate::engine::method::mmf::MmfMethod;
use crate::engine::method::{self, IterationReport};
use crate::engine::output::TrajectoryWriter;
use crate::engine::signal::StopToken;
use crate::engine::solver::{Solver, SolverKind};

/// Per-chain loop reports, in collection order. Chains skipped because the
/// shared halt flag was already raised carry no report.
#[derive(Debug, Clone)]
pub struct SaddleResult {
    pub reports: Vec<Option<IterationReport>>,
}

/// Runs the minimum-mode saddle search over every chain of a collection,
/// sequentially. The first finished search raises the collection's halt
/// flag; remaining chains are skipped.
#[instrument(skip_all, name = "saddle_workflow")]
pub fn run<H: Hamiltonian>(
    collection: &mut ChainCollection,
    hamiltonian: &H,
    config: &MmfConfig,
    solver_kind: SolverKind,
    writer: &mut dyn TrajectoryWriter,
    stop: &StopToken,
) -> Result<SaddleResult, EngineError> {
    config.validate()?;
    if collection.chains.is_empty() {
        return Err(EngineError::Initialization(
            "chain collection has no chains".into(),
        ));
    }
    let halt = collection.halt_flag();
    info!(
        chains = collection.chains.len(),
        solver = solver_kind.full_name(),
        "starting saddle search"
    );

    let mut reports = Vec::with_capacity(collection.chains.len());
    for (index, chain) in collection.chains.iter_mut().enumerate() {
        if halt.is_raised() {
            info!(chain = index, "collection halted, skipping chain");
            reports.push(None);
            continue;
        }
        // Every image is an independent walker; lift the default endpoint
        // anchoring.
        for idx in 0..chain.noi() {
            chain.set_kind(idx, ImageKind::Normal);
        }

        let (noi, nos) = (chain.noi(), chain.nos());
        let mut m = MmfMethod::new(chain, halt.clone(), hamiltonian, config.clone());
        let mut solver = Solver::new(solver_kind, noi, nos);
        let report = method::iterate(&mut m, &mut solver, writer, stop)?;
        solver.finalize();
        reports.push(Some(report));
    }
    Ok(SaddleResult { reports })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chain::Chain;
    use crate::core::hamiltonian::UniaxialAnisotropyHamiltonian;
    use crate::core::system::{LlgParameters, SpinImage};
    use crate::engine::config::MethodConfig;
    use crate::engine::output::NullWriter;
    use nalgebra::Vector3;

    fn chain(directions: &[Vector3<f64>]) -> Chain {
        let images = directions
            .iter()
            .map(|&d| SpinImage::new(vec![d], LlgParameters::default()).unwrap())
            .collect();
        Chain::new(images).unwrap()
    }

    #[test]
    fn first_finished_search_halts_the_remaining_chains() {
        let hamiltonian = UniaxialAnisotropyHamiltonian {
            axis: Vector3::new(0.0, 0.0, 1.0),
            strength: 1.0,
        };
        let theta: f64 = 0.3;
        let walkers = [
            Vector3::new(theta.sin(), 0.0, theta.cos()),
            Vector3::new(-theta.sin(), 0.0, theta.cos()),
        ];
        let mut collection =
            ChainCollection::new(vec![chain(&walkers), chain(&walkers), chain(&walkers)]);
        let config = MmfConfig {
            method: MethodConfig::builder()
                .force_convergence(1e-5)
                .n_iterations(20_000)
                .n_iterations_log(2_000)
                .build()
                .unwrap(),
            hessian_update_interval: 5,
            finite_difference_step: 1e-5,
            mode_overlap_threshold: 0.5,
        };

        let result = run(
            &mut collection,
            &hamiltonian,
            &config,
            SolverKind::Vp,
            &mut NullWriter,
            &StopToken::new(),
        )
        .unwrap();

        assert_eq!(result.reports.len(), 3);
        assert!(result.reports[0].is_some());
        assert!(result.reports[1].is_none());
        assert!(result.reports[2].is_none());
        // The first chain's walkers reached the equatorial saddle ring.
        for image in &collection.chains[0].images {
            assert!(image.spins[0].z.abs() < 0.05);
        }
    }
}
