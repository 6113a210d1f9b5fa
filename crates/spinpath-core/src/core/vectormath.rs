//! Primitives on fields of 3-vectors.
//!
//! A "field" is a flat slice of `Vector3<f64>`, one vector per lattice site.
//! All aggregated products (`dot`, norms) run over the full 3N-dimensional
//! embedding unless a function name says otherwise.

use nalgebra::Vector3;

/// One 3-vector per lattice site.
pub type VectorField = Vec<Vector3<f64>>;

/// Allocates a zeroed field of `nos` sites.
pub fn zeros(nos: usize) -> VectorField {
    vec![Vector3::zeros(); nos]
}

/// Sets every site of `field` to `value`.
pub fn fill(field: &mut [Vector3<f64>], value: Vector3<f64>) {
    for v in field.iter_mut() {
        *v = value;
    }
}

/// Scales every site of `field` by `c`.
pub fn scale(field: &mut [Vector3<f64>], c: f64) {
    for v in field.iter_mut() {
        *v *= c;
    }
}

/// Inner product of two fields in the 3N-dimensional embedding.
pub fn dot(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x.dot(y)).sum()
}

/// Site-wise scalar products `a_i . b_i`, written into `out`.
pub fn scalar_product(a: &[Vector3<f64>], b: &[Vector3<f64>], out: &mut [f64]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    for ((x, y), o) in a.iter().zip(b.iter()).zip(out.iter_mut()) {
        *o = x.dot(y);
    }
}

/// `out_i += c * a_i`.
pub fn add_c_a(c: f64, a: &[Vector3<f64>], out: &mut [Vector3<f64>]) {
    debug_assert_eq!(a.len(), out.len());
    for (x, o) in a.iter().zip(out.iter_mut()) {
        *o += c * x;
    }
}

/// `out_i = c * (a_i x b_i)`.
pub fn set_c_cross(c: f64, a: &[Vector3<f64>], b: &[Vector3<f64>], out: &mut [Vector3<f64>]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    for ((x, y), o) in a.iter().zip(b.iter()).zip(out.iter_mut()) {
        *o = c * x.cross(y);
    }
}

/// `out_i += c * (a_i x b_i)`.
pub fn add_c_cross(c: f64, a: &[Vector3<f64>], b: &[Vector3<f64>], out: &mut [Vector3<f64>]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    for ((x, y), o) in a.iter().zip(b.iter()).zip(out.iter_mut()) {
        *o += c * x.cross(y);
    }
}

/// Maximum of the absolute values of all vector components in the field.
pub fn max_abs_component(field: &[Vector3<f64>]) -> f64 {
    let mut max = 0.0_f64;
    for v in field {
        for d in 0..3 {
            max = max.max(v[d].abs());
        }
    }
    max
}

/// Norm of a single vector squared below which it counts as degenerate.
pub const DEGENERACY_EPSILON: f64 = 1e-24;

/// Normalizes `v` to unit length. `None` signals a (near-)zero input,
/// the division-by-zero degeneracy of the unit-sphere constraint.
pub fn try_normalize(v: Vector3<f64>) -> Option<Vector3<f64>> {
    let n2 = v.norm_squared();
    if n2 < DEGENERACY_EPSILON {
        return None;
    }
    Some(v / n2.sqrt())
}
