//! Minimum-mode following saddle search.

use nalgebra::{DMatrix, Vector3};
use tracing::{info, warn};

use crate::core::chain::{Chain, HaltFlag, ImageKind};
use crate::core::hamiltonian::Hamiltonian;
use crate::core::manifoldmath;
use crate::core::system::SpinImage;
use crate::core::vectormath::{self, VectorField};
use crate::engine::config::{MethodConfig, MmfConfig};
use crate::engine::method::{apply_pinning_mask, Method};
use crate::engine::output::{SnapshotKind, TrajectoryWriter};

/// How well the followed eigenmode connects across Hessian refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTracking {
    /// The minimum mode evolved continuously since the last refresh.
    Tracking,
    /// The minimum eigenvalue changed sign; the walker crossed into a
    /// region of different curvature.
    Switched,
    /// The mode overlap collapsed below the configured threshold; the
    /// force falls back to the plain gradient until the next refresh.
    Unstable,
}

/// Dense 3N x 3N Hessian of the energy by central differences of the
/// gradient, symmetrized. Perturbations step in the embedding space; the
/// eigenmode is projected back onto the tangent space afterwards.
fn numerical_hessian<H: Hamiltonian>(
    hamiltonian: &H,
    spins: &[Vector3<f64>],
    step: f64,
) -> DMatrix<f64> {
    let nos = spins.len();
    let n = 3 * nos;
    let mut hessian = DMatrix::zeros(n, n);
    let mut displaced = spins.to_vec();
    let mut grad_plus = vectormath::zeros(nos);
    let mut grad_minus = vectormath::zeros(nos);

    for col in 0..n {
        let (site, axis) = (col / 3, col % 3);
        displaced[site][axis] += step;
        hamiltonian.gradient(&displaced, &mut grad_plus);
        displaced[site][axis] -= 2.0 * step;
        hamiltonian.gradient(&displaced, &mut grad_minus);
        displaced[site][axis] = spins[site][axis];

        for row in 0..n {
            let (r_site, r_axis) = (row / 3, row % 3);
            hessian[(row, col)] =
                (grad_plus[r_site][r_axis] - grad_minus[r_site][r_axis]) / (2.0 * step);
        }
    }
    // Central differences are not exactly symmetric; the eigensolver
    // requires symmetry.
    let transpose = hessian.transpose();
    (hessian + transpose) * 0.5
}

/// Walks every image of a chain toward its nearest first-order saddle
/// point by following the minimum eigenmode of the energy Hessian.
pub struct MmfMethod<'a, H> {
    chain: &'a mut Chain,
    halt: HaltFlag,
    hamiltonian: H,
    config: MmfConfig,
    modes: Vec<VectorField>,
    eigenvalues: Vec<f64>,
    tracking: Vec<ModeTracking>,
    gradients: Vec<VectorField>,
    forces: Vec<VectorField>,
    scratch: VectorField,
    /// Configurations at the previous refresh, for displacement logging.
    spins_previous: Vec<VectorField>,
    converged: Vec<bool>,
    max_force: f64,
    iteration: u64,
    refresh_due: bool,
    modes_ready: bool,
    energy_headers_written: bool,
}

impl<'a, H: Hamiltonian> MmfMethod<'a, H> {
    pub fn new(chain: &'a mut Chain, halt: HaltFlag, hamiltonian: H, config: MmfConfig) -> Self {
        let noi = chain.noi();
        let nos = chain.nos();
        let max_force = config.method.force_convergence + 1.0;
        // The loop configuration is where the threshold is set; the
        // per-image copies mirror it so the two never disagree.
        for image in chain.images.iter_mut() {
            image.parameters.force_convergence = config.method.force_convergence;
        }
        let spins_previous = chain.images.iter().map(|i| i.spins.clone()).collect();
        Self {
            chain,
            halt,
            hamiltonian,
            config,
            modes: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            eigenvalues: vec![0.0; noi],
            tracking: vec![ModeTracking::Tracking; noi],
            gradients: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            forces: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            scratch: vectormath::zeros(nos),
            spins_previous,
            converged: vec![false; noi],
            max_force,
            iteration: 0,
            refresh_due: true,
            modes_ready: false,
            energy_headers_written: false,
        }
    }

    pub fn mode_tracking(&self, image: usize) -> ModeTracking {
        self.tracking[image]
    }

    pub fn minimum_eigenvalue(&self, image: usize) -> f64 {
        self.eigenvalues[image]
    }

    fn refresh_modes(&mut self, configurations: &[VectorField]) {
        let nos = self.chain.nos();
        for (idx, conf) in configurations.iter().enumerate() {
            let hessian =
                numerical_hessian(&self.hamiltonian, conf, self.config.finite_difference_step);
            let eigen = hessian.symmetric_eigen();
            let mut min_idx = 0;
            for i in 1..eigen.eigenvalues.len() {
                if eigen.eigenvalues[i] < eigen.eigenvalues[min_idx] {
                    min_idx = i;
                }
            }
            let eigenvalue = eigen.eigenvalues[min_idx];
            let column = eigen.eigenvectors.column(min_idx);
            let mut mode: VectorField = (0..nos)
                .map(|i| Vector3::new(column[3 * i], column[3 * i + 1], column[3 * i + 2]))
                .collect();
            manifoldmath::project_tangential(&mut mode, conf);
            manifoldmath::normalize_3n(&mut mode);

            let mut overlap = vectormath::dot(&mode, &self.modes[idx]);
            if overlap < 0.0 {
                // The eigenvector sign is arbitrary; keep it continuous.
                vectormath::scale(&mut mode, -1.0);
                overlap = -overlap;
            }

            if self.modes_ready {
                let displacement = manifoldmath::dist_geodesic(&self.spins_previous[idx], conf);
                if eigenvalue * self.eigenvalues[idx] < 0.0 {
                    info!(
                        image = idx,
                        eigenvalue,
                        previous = self.eigenvalues[idx],
                        displacement,
                        "minimum mode switched curvature sign"
                    );
                    self.tracking[idx] = ModeTracking::Switched;
                } else if overlap < self.config.mode_overlap_threshold {
                    warn!(
                        image = idx,
                        overlap,
                        threshold = self.config.mode_overlap_threshold,
                        displacement,
                        "mode tracking unstable, falling back to the plain gradient"
                    );
                    self.tracking[idx] = ModeTracking::Unstable;
                } else {
                    self.tracking[idx] = ModeTracking::Tracking;
                }
            }

            self.modes[idx] = mode;
            self.eigenvalues[idx] = eigenvalue;
            self.spins_previous[idx].copy_from_slice(conf);
        }
        self.modes_ready = true;
    }
}

impl<H: Hamiltonian> Method for MmfMethod<'_, H> {
    fn name(&self) -> &'static str {
        "MMF"
    }

    fn common(&self) -> &MethodConfig {
        &self.config.method
    }

    fn images(&self) -> &[SpinImage] {
        &self.chain.images
    }

    fn images_mut(&mut self) -> &mut [SpinImage] {
        &mut self.chain.images
    }

    fn calculate_force(&mut self, configurations: &[VectorField], forces: &mut [VectorField]) {
        if self.refresh_due {
            self.refresh_modes(configurations);
            self.refresh_due = false;
        }

        for (idx, conf) in configurations.iter().enumerate() {
            let force = &mut forces[idx];
            if self.chain.kind(idx) == ImageKind::Stationary {
                vectormath::fill(force, Vector3::zeros());
                self.forces[idx].copy_from_slice(force);
                continue;
            }

            self.hamiltonian.gradient(conf, &mut self.gradients[idx]);
            force.copy_from_slice(&self.gradients[idx]);
            vectormath::scale(force, -1.0);

            if self.tracking[idx] != ModeTracking::Unstable {
                let along = vectormath::dot(force, &self.modes[idx]);
                if self.eigenvalues[idx] < 0.0 {
                    // Negative curvature: inverting the along-mode component
                    // turns descent into ascent toward the saddle.
                    vectormath::add_c_a(-2.0 * along, &self.modes[idx], force);
                } else {
                    vectormath::add_c_a(-along, &self.modes[idx], force);
                }
            }

            apply_pinning_mask(&self.chain.images[idx].parameters, force);
            self.forces[idx].copy_from_slice(force);
        }
    }

    fn hook_pre_iteration(&mut self) {
        if self.iteration % self.config.hessian_update_interval == 0 {
            self.refresh_due = true;
        }
        self.iteration += 1;
    }

    fn hook_post_iteration(&mut self) {
        self.max_force = 0.0;
        for idx in 0..self.chain.noi() {
            let image = &mut self.chain.images[idx];
            self.scratch.copy_from_slice(&self.forces[idx]);
            manifoldmath::project_tangential(&mut self.scratch, &image.spins);
            let metric = vectormath::max_abs_component(&self.scratch);
            self.converged[idx] = metric <= image.parameters.force_convergence;
            self.max_force = self.max_force.max(metric);

            image.energy = self.hamiltonian.energy(&image.spins);
            for (h, f) in image.effective_field.iter_mut().zip(self.forces[idx].iter()) {
                *h = -*f;
            }
        }
        self.chain.update_reaction_coordinates();
    }

    fn force_converged(&self) -> bool {
        self.converged.iter().all(|&c| c)
    }

    fn max_force_component(&self) -> f64 {
        self.max_force
    }

    fn iterations_allowed(&self) -> bool {
        !self.halt.is_raised()
    }

    fn finalize(&mut self) {
        info!("saddle search finished, halting the owning collection");
        self.halt.raise();
    }

    fn save_current(
        &mut self,
        writer: &mut dyn TrajectoryWriter,
        iteration: u64,
        initial: bool,
        last: bool,
    ) {
        let output = self.config.method.output.clone();
        let rx = self.chain.reaction_coordinates().to_vec();
        for (idx, image) in self.chain.images.iter().enumerate() {
            if output.save_archive {
                if let Err(error) =
                    writer.append_configuration(idx, iteration, SnapshotKind::Archive, &image.spins)
                {
                    warn!(%error, image = idx, iteration, "failed to write spin snapshot");
                }
            }
            if output.save_single || initial || last {
                if let Err(error) =
                    writer.append_configuration(idx, iteration, SnapshotKind::Single, &image.spins)
                {
                    warn!(%error, image = idx, iteration, "failed to write spin snapshot");
                }
            }
            if output.save_energy {
                if !self.energy_headers_written {
                    if let Err(error) = writer.write_energy_header(idx) {
                        warn!(%error, image = idx, "failed to write energy header");
                    }
                }
                if let Err(error) = writer.append_energy(idx, iteration, rx[idx], image.energy) {
                    warn!(%error, image = idx, iteration, "failed to append energy");
                }
            }
        }
        if output.save_energy {
            self.energy_headers_written = true;
        }
    }
}
