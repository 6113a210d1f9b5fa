//! Landau-Lifshitz-Gilbert dynamics of a single image.

use nalgebra::Vector3;
use tracing::warn;

use crate::core::constants;
use crate::core::hamiltonian::Hamiltonian;
use crate::core::manifoldmath;
use crate::core::system::SpinImage;
use crate::core::vectormath::{self, VectorField};
use crate::engine::config::MethodConfig;
use crate::engine::method::{apply_pinning_mask, Method};
use crate::engine::output::{SnapshotKind, TrajectoryWriter};

/// Precessional spin dynamics on one image. With a dynamics solver this
/// integrates the damped precession around the effective field; with a
/// minimization solver the same force drives an energy descent.
pub struct LlgMethod<'a, H> {
    system: &'a mut SpinImage,
    hamiltonian: H,
    config: MethodConfig,
    /// Last computed physical force, kept so the post-iteration hook can
    /// derive the effective field without a second gradient evaluation.
    force: VectorField,
    scratch: VectorField,
    converged: bool,
    max_force: f64,
    energy_header_written: bool,
}

impl<'a, H: Hamiltonian> LlgMethod<'a, H> {
    pub fn new(system: &'a mut SpinImage, hamiltonian: H, config: MethodConfig) -> Self {
        let nos = system.nos();
        // Seed above the threshold so a fresh method never reports
        // convergence before its first force evaluation.
        let max_force = config.force_convergence + 1.0;
        // The loop configuration is where the threshold is set; the
        // per-image copy mirrors it so the two never disagree.
        system.parameters.force_convergence = config.force_convergence;
        Self {
            system,
            hamiltonian,
            config,
            force: vectormath::zeros(nos),
            scratch: vectormath::zeros(nos),
            converged: false,
            max_force,
            energy_header_written: false,
        }
    }

    fn save_image(&mut self, writer: &mut dyn TrajectoryWriter, iteration: u64, kind: SnapshotKind) {
        if let Err(error) = writer.append_configuration(0, iteration, kind, &self.system.spins) {
            warn!(%error, iteration, "failed to write spin snapshot");
        }
    }
}

impl<H: Hamiltonian> Method for LlgMethod<'_, H> {
    fn name(&self) -> &'static str {
        "LLG"
    }

    fn common(&self) -> &MethodConfig {
        &self.config
    }

    fn images(&self) -> &[SpinImage] {
        std::slice::from_ref(self.system)
    }

    fn images_mut(&mut self) -> &mut [SpinImage] {
        std::slice::from_mut(self.system)
    }

    fn calculate_force(&mut self, configurations: &[VectorField], forces: &mut [VectorField]) {
        let spins = &configurations[0];
        self.hamiltonian.gradient(spins, &mut forces[0]);
        vectormath::scale(&mut forces[0], -1.0);
        apply_pinning_mask(&self.system.parameters, &mut forces[0]);
        self.force.copy_from_slice(&forces[0]);
    }

    /// `f_v = dtg/(1+a^2) (f + a s x f)` with damping `a` and
    /// `dtg = dt gamma / mu_B`, plus the spin-transfer torque driven by the
    /// polarisation normal, damped the same way.
    fn calculate_force_virtual(
        &mut self,
        configurations: &[VectorField],
        forces: &[VectorField],
        forces_virtual: &mut [VectorField],
    ) {
        let p = &self.system.parameters;
        let spins = &configurations[0];
        let force = &forces[0];
        let out = &mut forces_virtual[0];

        let damping = p.damping;
        let dtg = p.dt * constants::GAMMA / constants::MU_B / (1.0 + damping * damping);

        for ((o, f), s) in out.iter_mut().zip(force.iter()).zip(spins.iter()) {
            *o = dtg * (f + damping * s.cross(f));
        }
        if p.stt_magnitude != 0.0 {
            let je = p.stt_magnitude * dtg;
            let normal = p.stt_polarisation_normal;
            for (o, s) in out.iter_mut().zip(spins.iter()) {
                *o += je * (normal + damping * s.cross(&normal));
            }
        }
        apply_pinning_mask(p, out);
    }

    fn hook_post_iteration(&mut self) {
        self.scratch.copy_from_slice(&self.force);
        manifoldmath::project_tangential(&mut self.scratch, &self.system.spins);
        self.max_force = vectormath::max_abs_component(&self.scratch);
        self.converged = self.max_force <= self.system.parameters.force_convergence;

        self.system.energy = self.hamiltonian.energy(&self.system.spins);
        for (h, f) in self
            .system
            .effective_field
            .iter_mut()
            .zip(self.force.iter())
        {
            *h = -*f;
        }
    }

    fn force_converged(&self) -> bool {
        self.converged
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
        let output = self.config.output.clone();
        if output.save_archive {
            self.save_image(writer, iteration, SnapshotKind::Archive);
        }
        if output.save_single || initial || last {
            self.save_image(writer, iteration, SnapshotKind::Single);
        }
        if output.save_energy {
            if !self.energy_header_written {
                if let Err(error) = writer.write_energy_header(0) {
                    warn!(%error, "failed to write energy header");
                }
                self.energy_header_written = true;
            }
            if let Err(error) = writer.append_energy(0, iteration, 0.0, self.system.energy) {
                warn!(%error, iteration, "failed to append energy");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system::LlgParameters;
    use crate::engine::solver::{Solver, SolverKind};

    fn config() -> MethodConfig {
        MethodConfig::builder()
            .force_convergence(1e-7)
            .n_iterations(1000)
            .n_iterations_log(100)
            .build()
            .unwrap()
    }

    fn field_z() -> crate::core::hamiltonian::ZeemanHamiltonian {
        crate::core::hamiltonian::ZeemanHamiltonian {
            field: Vector3::new(0.0, 0.0, 1.0),
        }
    }

    #[test]
    fn force_points_opposite_the_gradient() {
        let hamiltonian = field_z();
        let mut image = SpinImage::new(
            vec![Vector3::new(1.0, 0.0, 0.0)],
            LlgParameters::default(),
        )
        .unwrap();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, config());

        let configurations = vec![vec![Vector3::new(1.0, 0.0, 0.0)]];
        let mut forces = vec![vectormath::zeros(1)];
        method.calculate_force(&configurations, &mut forces);
        // gradient of -s.B is -B, so the force is +B.
        assert!((forces[0][0] - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-15);
    }

    #[test]
    fn fresh_method_is_not_converged() {
        let hamiltonian = field_z();
        let mut image = SpinImage::new(
            vec![Vector3::new(0.0, 0.0, 1.0)],
            LlgParameters::default(),
        )
        .unwrap();
        let method = LlgMethod::new(&mut image, &hamiltonian, config());
        assert!(!method.force_converged());
        assert!(method.max_force_component() > 1e-7);
    }

    #[test]
    fn damping_relaxes_the_spin_toward_the_field() {
        let hamiltonian = field_z();
        let parameters = LlgParameters {
            damping: 0.3,
            dt: 1e-2,
            ..LlgParameters::default()
        };
        let mut image = SpinImage::new(vec![Vector3::new(1.0, 0.0, 0.1)], parameters).unwrap();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, config());
        let mut solver = Solver::new(SolverKind::Depondt, 1, 1);

        let z_before = method.images()[0].spins[0].z;
        for _ in 0..5000 {
            solver.iteration(&mut method).unwrap();
            method.hook_post_iteration();
        }
        let z_after = method.images()[0].spins[0].z;
        assert!(z_after > z_before);
        assert!(z_after > 0.99);
    }

    #[test]
    fn pinned_site_never_moves() {
        let hamiltonian = field_z();
        let parameters = LlgParameters {
            pinned: Some(vec![true, false]),
            damping: 0.3,
            dt: 1e-2,
            ..LlgParameters::default()
        };
        let start = Vector3::new(1.0, 0.0, 0.0);
        let mut image = SpinImage::new(vec![start, start], parameters).unwrap();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, config());
        let mut solver = Solver::new(SolverKind::Heun, 1, 2);

        for _ in 0..100 {
            solver.iteration(&mut method).unwrap();
        }
        let spins = &method.images()[0].spins;
        assert!((spins[0] - start).norm() < 1e-12);
        assert!((spins[1] - start).norm() > 1e-6);
    }

    #[test]
    fn configured_threshold_governs_convergence() {
        // A per-image parameter set left at its default must not shadow
        // the threshold the method was configured with.
        let hamiltonian = crate::core::hamiltonian::ZeemanHamiltonian {
            field: Vector3::new(1e-4, 0.0, 1.0),
        };
        let mut image = SpinImage::new(
            vec![Vector3::new(0.0, 0.0, 1.0)],
            LlgParameters::default(),
        )
        .unwrap();
        let loose = MethodConfig::builder()
            .force_convergence(1e-2)
            .n_iterations(5)
            .n_iterations_log(5)
            .build()
            .unwrap();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, loose);

        let configurations = vec![vec![Vector3::new(0.0, 0.0, 1.0)]];
        let mut forces = vec![vectormath::zeros(1)];
        method.calculate_force(&configurations, &mut forces);
        method.hook_post_iteration();

        assert!((method.max_force_component() - 1e-4).abs() < 1e-18);
        assert!(method.force_converged());
    }

    #[test]
    fn force_exactly_at_threshold_counts_as_converged() {
        // The tangential force at s = z is exactly (1e-4, 0, 0).
        let hamiltonian = crate::core::hamiltonian::ZeemanHamiltonian {
            field: Vector3::new(1e-4, 0.0, 1.0),
        };
        let mut image = SpinImage::new(
            vec![Vector3::new(0.0, 0.0, 1.0)],
            LlgParameters::default(),
        )
        .unwrap();
        let exact = MethodConfig::builder()
            .force_convergence(1e-4)
            .n_iterations(5)
            .n_iterations_log(5)
            .build()
            .unwrap();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, exact);

        let configurations = vec![vec![Vector3::new(0.0, 0.0, 1.0)]];
        let mut forces = vec![vectormath::zeros(1)];
        method.calculate_force(&configurations, &mut forces);
        method.hook_post_iteration();

        assert!((method.max_force_component() - 1e-4).abs() < 1e-18);
        assert!(method.force_converged());
    }

    #[test]
    fn boundary_snapshots_use_the_single_stream() {
        use crate::engine::output::FileTrajectoryWriter;

        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileTrajectoryWriter::new(dir.path()).unwrap();
        let hamiltonian = field_z();
        let mut image = SpinImage::new(
            vec![Vector3::new(0.0, 0.0, 1.0)],
            LlgParameters::default(),
        )
        .unwrap();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, config());

        method.save_current(&mut writer, 0, true, false);
        method.save_current(&mut writer, 7, false, true);

        assert!(dir.path().join("spins_00_single.txt").exists());
        assert!(!dir.path().join("spins_00_archive.txt").exists());
    }

    #[test]
    fn post_hook_caches_energy_and_effective_field() {
        let hamiltonian = field_z();
        let mut image = SpinImage::new(
            vec![Vector3::new(0.0, 0.0, 1.0)],
            LlgParameters::default(),
        )
        .unwrap();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, config());

        let configurations = vec![vec![Vector3::new(0.0, 0.0, 1.0)]];
        let mut forces = vec![vectormath::zeros(1)];
        method.calculate_force(&configurations, &mut forces);
        method.hook_post_iteration();

        assert!((method.images()[0].energy + 1.0).abs() < 1e-12);
        // Effective field is the negated force.
        assert!(
            (method.images()[0].effective_field[0] + Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-12
        );
        // Aligned spin: tangential force vanishes, so the image converged.
        assert!(method.force_converged());
    }
}
