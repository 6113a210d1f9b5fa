//! Geodesic nudged elastic band over a chain of images.

use tracing::warn;

use crate::core::chain::{Chain, ImageKind};
use crate::core::hamiltonian::Hamiltonian;
use crate::core::manifoldmath;
use crate::core::system::SpinImage;
use crate::core::vectormath::{self, VectorField};
use crate::engine::config::{GnebConfig, MethodConfig};
use crate::engine::method::{apply_pinning_mask, Method};
use crate::engine::output::{SnapshotKind, TrajectoryWriter};

/// Relaxes a whole chain toward the minimum-energy path. Interior images
/// receive the perpendicular gradient plus a spring along the path tangent;
/// the spring force replaces the gradient's tangential component rather than
/// adding to it, so the images spread out without sliding downhill.
pub struct GnebMethod<'a, H> {
    chain: &'a mut Chain,
    hamiltonian: H,
    config: GnebConfig,
    energies: Vec<f64>,
    gradients: Vec<VectorField>,
    tangents: Vec<VectorField>,
    /// Last computed total force per image, for the convergence metric and
    /// the effective-field refresh.
    forces: Vec<VectorField>,
    scratch: VectorField,
    converged: Vec<bool>,
    max_force: f64,
    energy_headers_written: bool,
}

impl<'a, H: Hamiltonian> GnebMethod<'a, H> {
    pub fn new(chain: &'a mut Chain, hamiltonian: H, config: GnebConfig) -> Self {
        let noi = chain.noi();
        let nos = chain.nos();
        let max_force = config.method.force_convergence + 1.0;
        // The loop configuration is where the threshold is set; the
        // per-image copies mirror it so the two never disagree.
        for image in chain.images.iter_mut() {
            image.parameters.force_convergence = config.method.force_convergence;
        }
        Self {
            chain,
            hamiltonian,
            config,
            energies: vec![0.0; noi],
            gradients: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            tangents: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            forces: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            scratch: vectormath::zeros(nos),
            converged: vec![false; noi],
            max_force,
            energy_headers_written: false,
        }
    }

    /// Per-image energy of the last force evaluation.
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// Cubic Hermite interpolation of the energy along the path, using the
    /// tangential energy derivative `dE/dx = grad E . t` at every image.
    /// Returns `(reaction coordinate, energy)` samples covering all segments
    /// with `n_energy_interpolations` subdivisions each.
    pub fn interpolated_energy_curve(&self) -> Vec<(f64, f64)> {
        let noi = self.chain.noi();
        let rx = self.chain.reaction_coordinates();
        let n = self.config.n_energy_interpolations.max(1);
        let derivatives: Vec<f64> = (0..noi)
            .map(|i| vectormath::dot(&self.gradients[i], &self.tangents[i]))
            .collect();

        let mut curve = Vec::with_capacity((noi - 1) * n + 1);
        for segment in 0..noi - 1 {
            let (x0, x1) = (rx[segment], rx[segment + 1]);
            let (e0, e1) = (self.energies[segment], self.energies[segment + 1]);
            let (d0, d1) = (derivatives[segment], derivatives[segment + 1]);
            let dx = x1 - x0;
            for sample in 0..n {
                let t = sample as f64 / n as f64;
                let t2 = t * t;
                let t3 = t2 * t;
                let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
                let h10 = t3 - 2.0 * t2 + t;
                let h01 = -2.0 * t3 + 3.0 * t2;
                let h11 = t3 - t2;
                let energy = h00 * e0 + h10 * dx * d0 + h01 * e1 + h11 * dx * d1;
                curve.push((x0 + t * dx, energy));
            }
        }
        curve.push((rx[noi - 1], self.energies[noi - 1]));
        curve
    }
}

impl<H: Hamiltonian> Method for GnebMethod<'_, H> {
    fn name(&self) -> &'static str {
        "GNEB"
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
        let noi = self.chain.noi();

        {
            let hamiltonian = &self.hamiltonian;
            let energies = &mut self.energies;
            let gradients = &mut self.gradients;
            #[cfg(feature = "parallel")]
            {
                use rayon::prelude::*;
                energies
                    .par_iter_mut()
                    .zip(gradients.par_iter_mut())
                    .zip(configurations.par_iter())
                    .for_each(|((energy, gradient), conf)| {
                        *energy = hamiltonian.energy(conf);
                        hamiltonian.gradient(conf, gradient);
                    });
            }
            #[cfg(not(feature = "parallel"))]
            for ((energy, gradient), conf) in energies
                .iter_mut()
                .zip(gradients.iter_mut())
                .zip(configurations.iter())
            {
                *energy = hamiltonian.energy(conf);
                hamiltonian.gradient(conf, gradient);
            }
        }

        manifoldmath::tangents(configurations, &self.energies, &mut self.tangents);

        for idx in 0..noi {
            let force = &mut forces[idx];
            let kind = self.chain.kind(idx);

            // Endpoints are anchors regardless of their declared kind.
            if kind == ImageKind::Stationary || idx == 0 || idx == noi - 1 {
                vectormath::fill(force, nalgebra::Vector3::zeros());
                self.forces[idx].copy_from_slice(force);
                continue;
            }

            force.copy_from_slice(&self.gradients[idx]);
            vectormath::scale(force, -1.0);
            let tangent = &self.tangents[idx];

            match kind {
                ImageKind::Normal => {
                    // Spring force replaces the tangential gradient component.
                    let along = vectormath::dot(force, tangent);
                    vectormath::add_c_a(-along, tangent, force);
                    let d_prev =
                        manifoldmath::dist_geodesic(&configurations[idx - 1], &configurations[idx]);
                    let d_next =
                        manifoldmath::dist_geodesic(&configurations[idx], &configurations[idx + 1]);
                    let spring = self.config.spring_constant * (d_next - d_prev);
                    vectormath::add_c_a(spring, tangent, force);
                }
                ImageKind::Climbing => {
                    // Invert the tangential component, no spring; the image
                    // climbs the path toward the saddle.
                    let along = vectormath::dot(force, tangent);
                    vectormath::add_c_a(-2.0 * along, tangent, force);
                }
                // Falling keeps the plain force; Stationary images were
                // zeroed by the anchor branch above.
                ImageKind::Falling | ImageKind::Stationary => {}
            }

            apply_pinning_mask(&self.chain.images[idx].parameters, force);
            self.forces[idx].copy_from_slice(force);
        }
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
