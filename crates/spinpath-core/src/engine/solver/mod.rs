//! Integration strategies.
//!
//! A [`Solver`] is selected by [`SolverKind`] at construction and owns every
//! transient buffer it needs, pre-sized to `[image][site]`. Each iteration
//! starts from one consistent snapshot of all image configurations: forces
//! and tangents are computed against that frozen snapshot before any image
//! advances, so results cannot become order-dependent.
//!
//! Dynamics variants (SIB, Heun, Depondt) consume the method's virtual force
//! as a rotation-axis field (the update is `ds = f_v x s`). Minimization
//! variants (VP, NCG, BFGS) consume the tangentially projected physical
//! force. `None` performs no update and serves static evaluation.

mod bfgs;
mod depondt;
mod heun;
mod ncg;
mod sib;
mod vp;

use crate::core::vectormath::{self, VectorField};
use crate::engine::error::EngineError;
use crate::engine::method::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    None,
    Sib,
    Heun,
    Depondt,
    Ncg,
    Bfgs,
    Vp,
}

impl SolverKind {
    pub fn name(&self) -> &'static str {
        match self {
            SolverKind::None => "None",
            SolverKind::Sib => "SIB",
            SolverKind::Heun => "Heun",
            SolverKind::Depondt => "Depondt",
            SolverKind::Ncg => "NCG",
            SolverKind::Bfgs => "BFGS",
            SolverKind::Vp => "VP",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            SolverKind::None => "None",
            SolverKind::Sib => "Semi-implicit B",
            SolverKind::Heun => "Heun",
            SolverKind::Depondt => "Depondt",
            SolverKind::Ncg => "Nonlinear conjugate gradient",
            SolverKind::Bfgs => "Limited-memory BFGS",
            SolverKind::Vp => "Velocity projection",
        }
    }
}

enum State {
    Static,
    Sib(sib::Buffers),
    Heun(heun::Buffers),
    Depondt,
    Vp(vp::Buffers),
    Ncg(ncg::Buffers),
    Bfgs(bfgs::Buffers),
}

/// One integration strategy plus its exclusively owned transient state.
pub struct Solver {
    kind: SolverKind,
    /// Frozen pre-iteration snapshot of all configurations.
    configurations: Vec<VectorField>,
    forces: Vec<VectorField>,
    forces_virtual: Vec<VectorField>,
    state: State,
}

impl Solver {
    /// Allocates and zeroes all transient buffers for `noi` images of `nos`
    /// sites each.
    pub fn new(kind: SolverKind, noi: usize, nos: usize) -> Self {
        let field = |_: usize| vectormath::zeros(nos);
        let state = match kind {
            SolverKind::None => State::Static,
            SolverKind::Sib => State::Sib(sib::Buffers::new(noi, nos)),
            SolverKind::Heun => State::Heun(heun::Buffers::new(noi, nos)),
            SolverKind::Depondt => State::Depondt,
            SolverKind::Vp => State::Vp(vp::Buffers::new(noi, nos)),
            SolverKind::Ncg => State::Ncg(ncg::Buffers::new(noi, nos)),
            SolverKind::Bfgs => State::Bfgs(bfgs::Buffers::new(noi, nos)),
        };
        Self {
            kind,
            configurations: (0..noi).map(field).collect(),
            forces: (0..noi).map(field).collect(),
            forces_virtual: (0..noi).map(field).collect(),
            state,
        }
    }

    pub fn kind(&self) -> SolverKind {
        self.kind
    }

    /// Advances all images of `method` by one step.
    pub fn iteration<M: Method>(&mut self, method: &mut M) -> Result<(), EngineError> {
        for (snapshot, image) in self.configurations.iter_mut().zip(method.images().iter()) {
            snapshot.copy_from_slice(&image.spins);
        }
        method.calculate_force(&self.configurations, &mut self.forces);
        method.calculate_force_virtual(&self.configurations, &self.forces, &mut self.forces_virtual);

        match &mut self.state {
            State::Static => Ok(()),
            State::Sib(buffers) => {
                buffers.step(method, &self.configurations, &self.forces_virtual)
            }
            State::Heun(buffers) => {
                buffers.step(method, &self.configurations, &self.forces_virtual)
            }
            State::Depondt => depondt::step(method, &self.configurations, &self.forces_virtual),
            State::Vp(buffers) => buffers.step(method, &self.configurations, &self.forces),
            State::Ncg(buffers) => buffers.step(method, &self.configurations, &self.forces),
            State::Bfgs(buffers) => buffers.step(method, &self.configurations, &self.forces),
        }
    }

    /// Drops all transient state; the solver must not be reused afterwards
    /// without reconstruction.
    pub fn finalize(self) {}
}

/// Tangential projection of every image's force against the snapshot, into
/// `out`, returning the per-image maximum absolute component as the
/// minimizers' convergence metric.
fn project_forces(
    forces: &[VectorField],
    configurations: &[VectorField],
    out: &mut [VectorField],
    metrics: &mut [f64],
) {
    for (img, force) in forces.iter().enumerate() {
        out[img].copy_from_slice(force);
        crate::core::manifoldmath::project_tangential(&mut out[img], &configurations[img]);
        metrics[img] = vectormath::max_abs_component(&out[img]);
    }
}
