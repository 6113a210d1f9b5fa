//! Depondt solver: exact rotation of each spin about its local virtual-force
//! axis by the angle `|f_v|`. The update is a proper rotation, preserving the
//! unit norm exactly.

use crate::core::vectormath::VectorField;
use crate::engine::error::EngineError;
use crate::engine::method::Method;

/// Rotation angle below which the spin is left untouched.
const MIN_ANGLE: f64 = 1e-20;

pub(super) fn step<M: Method>(
    method: &mut M,
    configurations: &[VectorField],
    forces_virtual: &[VectorField],
) -> Result<(), EngineError> {
    for (img, image) in method.images_mut().iter_mut().enumerate() {
        for i in 0..image.spins.len() {
            let axis = forces_virtual[img][i];
            let angle = axis.norm();
            if angle < MIN_ANGLE {
                continue;
            }
            let axis = axis / angle;
            let s = configurations[img][i];
            let (sin, cos) = angle.sin_cos();
            // Rodrigues rotation about the unit axis.
            image.spins[i] = s * cos + axis.cross(&s) * sin + axis * (axis.dot(&s)) * (1.0 - cos);
        }
    }
    Ok(())
}
