//! Velocity-projection solver.
//!
//! Pseudo-dynamics of a fictitious particle of mass `m`: the velocity is
//! integrated from the averaged previous/current force, then projected onto
//! the force direction with the per-image scalar projection
//! `sum(v . f) / sum(f . f)`, clipped at zero — the velocity is zeroed
//! whenever it disagrees in sign with the force (inertia with reset).

use crate::core::manifoldmath;
use crate::core::vectormath::{self, VectorField};
use crate::engine::error::EngineError;
use crate::engine::method::Method;

pub(super) struct Buffers {
    /// Mass of the fictitious particle.
    mass: f64,
    velocities: Vec<VectorField>,
    forces_previous: Vec<VectorField>,
    /// Tangentially projected current force, per image.
    projected: Vec<VectorField>,
}

impl Buffers {
    pub(super) fn new(noi: usize, nos: usize) -> Self {
        Self {
            mass: 1.0,
            velocities: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            forces_previous: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
            projected: (0..noi).map(|_| vectormath::zeros(nos)).collect(),
        }
    }

    pub(super) fn step<M: Method>(
        &mut self,
        method: &mut M,
        configurations: &[VectorField],
        forces: &[VectorField],
    ) -> Result<(), EngineError> {
        for (img, force) in forces.iter().enumerate() {
            self.projected[img].copy_from_slice(force);
            manifoldmath::project_tangential(&mut self.projected[img], &configurations[img]);
        }

        for (img, image) in method.images_mut().iter_mut().enumerate() {
            let dt = image.parameters.dt;
            let force = &self.projected[img];
            let velocity = &mut self.velocities[img];

            for i in 0..velocity.len() {
                velocity[i] += 0.5 * dt / self.mass * (self.forces_previous[img][i] + force[i]);
            }

            let projection = vectormath::dot(velocity, force);
            let force_norm2 = vectormath::dot(force, force);
            if projection <= 0.0 || force_norm2 == 0.0 {
                vectormath::fill(velocity, nalgebra::Vector3::zeros());
            } else {
                let ratio = projection / force_norm2;
                for (v, f) in velocity.iter_mut().zip(force.iter()) {
                    *v = ratio * f;
                }
            }

            for i in 0..image.spins.len() {
                image.spins[i] = configurations[img][i]
                    + dt * velocity[i]
                    + 0.5 * dt * dt / self.mass * force[i];
            }
            image.normalize_spins()?;

            self.forces_previous[img].copy_from_slice(force);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hamiltonian::ZeemanHamiltonian;
    use crate::core::system::{LlgParameters, SpinImage};
    use crate::engine::config::MethodConfig;
    use crate::engine::method::llg::LlgMethod;
    use nalgebra::Vector3;

    #[test]
    fn opposing_force_zeroes_the_velocity() {
        // A field-free image, so the method never perturbs the hand-crafted
        // forces below.
        let hamiltonian = ZeemanHamiltonian {
            field: Vector3::zeros(),
        };
        let config = MethodConfig::builder()
            .force_convergence(1e-7)
            .n_iterations(10)
            .n_iterations_log(1)
            .build()
            .unwrap();
        let mut image = SpinImage::new(
            vec![Vector3::new(0.0, 0.0, 1.0)],
            LlgParameters::default(),
        )
        .unwrap();
        let mut method = LlgMethod::new(&mut image, &hamiltonian, config);
        let mut buffers = Buffers::new(1, 1);

        let configurations = vec![vec![Vector3::new(0.0, 0.0, 1.0)]];
        let forward = vec![vec![Vector3::new(1.0, 0.0, 0.0)]];
        buffers.step(&mut method, &configurations, &forward).unwrap();
        assert!(vectormath::dot(&buffers.velocities[0], &buffers.velocities[0]) > 0.0);

        // A force opposing the accumulated velocity must reset it.
        let configurations = vec![method.images()[0].spins.clone()];
        let reversed = vec![vec![Vector3::new(-0.5, 0.0, 0.0)]];
        buffers.step(&mut method, &configurations, &reversed).unwrap();
        assert!(vectormath::dot(&buffers.velocities[0], &buffers.velocities[0]) == 0.0);
    }
}
