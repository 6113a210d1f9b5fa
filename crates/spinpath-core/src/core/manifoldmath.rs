//! Math on the product-of-unit-spheres manifold.
//!
//! Spin configurations live on (S^2)^N. Everything here keeps quantities
//! consistent with that constraint surface: tangential projections against a
//! unit reference field, geodesic distances, and the energy-weighted tangent
//! construction used by path methods.

use nalgebra::Vector3;

use super::vectormath::{self, VectorField};

/// Removes the radial component of every site of `field` with respect to the
/// unit reference `reference`: `f_i -= (f_i . s_i) s_i`.
pub fn project_tangential(field: &mut [Vector3<f64>], reference: &[Vector3<f64>]) {
    debug_assert_eq!(field.len(), reference.len());
    for (f, s) in field.iter_mut().zip(reference.iter()) {
        *f -= f.dot(s) * s;
    }
}

/// Great-circle distance between two unit vectors. The dot product is clamped
/// to [-1, 1] so roundoff cannot produce NaN from `acos`.
pub fn dist_greatcircle(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.dot(b).clamp(-1.0, 1.0).acos()
}

/// Geodesic distance between two configurations: the root of the summed
/// squared great-circle distances over all sites.
pub fn dist_geodesic(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| dist_greatcircle(x, y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Normalizes `field` in the 3N-dimensional embedding. A zero field is left
/// untouched.
pub fn normalize_3n(field: &mut [Vector3<f64>]) {
    let norm2 = vectormath::dot(field, field);
    if norm2 > 0.0 {
        vectormath::scale(field, 1.0 / norm2.sqrt());
    }
}

/// Builds the path tangent at every image of a chain.
///
/// Interior images use the three-way energy rule: near an extremum the
/// forward and backward differences are blended with weights given by the
/// larger/smaller neighboring energy gap (the forward difference gets the
/// larger weight when the next image is the higher-energy neighbor); a
/// monotonically rising or falling segment uses the pure forward or backward
/// difference; flat energy uses the sum of both. Endpoints take the plain
/// one-sided difference and never participate in blending.
///
/// Every tangent is then projected tangential to the local configuration and
/// normalized in 3N dimensions.
pub fn tangents(configurations: &[VectorField], energies: &[f64], out: &mut [VectorField]) {
    let noi = configurations.len();
    debug_assert!(noi >= 2);
    debug_assert_eq!(energies.len(), noi);
    debug_assert_eq!(out.len(), noi);
    let nos = configurations[0].len();

    for idx in 0..noi {
        let image = &configurations[idx];
        let tangent = &mut out[idx];

        if idx == 0 {
            let plus = &configurations[idx + 1];
            for i in 0..nos {
                tangent[i] = plus[i] - image[i];
            }
        } else if idx == noi - 1 {
            let minus = &configurations[idx - 1];
            for i in 0..nos {
                tangent[i] = image[i] - minus[i];
            }
        } else {
            let plus = &configurations[idx + 1];
            let minus = &configurations[idx - 1];
            let (e_minus, e_mid, e_plus) = (energies[idx - 1], energies[idx], energies[idx + 1]);

            if (e_plus < e_mid && e_mid > e_minus) || (e_plus > e_mid && e_mid < e_minus) {
                // Near an extremum: smooth blend of both differences.
                let gap_max = (e_plus - e_mid).abs().max((e_minus - e_mid).abs());
                let gap_min = (e_plus - e_mid).abs().min((e_minus - e_mid).abs());
                let (w_plus, w_minus) = if e_plus > e_minus {
                    (gap_max, gap_min)
                } else {
                    (gap_min, gap_max)
                };
                for i in 0..nos {
                    tangent[i] = w_plus * (plus[i] - image[i]) + w_minus * (image[i] - minus[i]);
                }
            } else if e_plus > e_mid && e_mid > e_minus {
                // Rising slope.
                for i in 0..nos {
                    tangent[i] = plus[i] - image[i];
                }
            } else if e_plus < e_mid && e_mid < e_minus {
                // Falling slope.
                for i in 0..nos {
                    tangent[i] = image[i] - minus[i];
                }
            } else {
                // Flat.
                for i in 0..nos {
                    tangent[i] = (plus[i] - image[i]) + (image[i] - minus[i]);
                }
            }
        }

        project_tangential(tangent, image);
        normalize_3n(tangent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn x() -> Vector3<f64> {
        Vector3::new(1.0, 0.0, 0.0)
    }
    fn z() -> Vector3<f64> {
        Vector3::new(0.0, 0.0, 1.0)
    }

    #[test]
    fn projection_removes_radial_component() {
        let reference = vec![z()];
        let mut field = vec![Vector3::new(0.3, -0.2, 5.0)];
        project_tangential(&mut field, &reference);
        assert!(field[0].dot(&reference[0]).abs() < 1e-15);
        assert!((field[0] - Vector3::new(0.3, -0.2, 0.0)).norm() < 1e-15);
    }

    #[test]
    fn greatcircle_distance_is_angle() {
        assert!(dist_greatcircle(&z(), &z()).abs() < 1e-12);
        assert!((dist_greatcircle(&z(), &x()) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        // Clamping keeps antiparallel vectors finite.
        assert!((dist_greatcircle(&z(), &-z()) - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn geodesic_distance_aggregates_sites() {
        let a = vec![z(), z()];
        let b = vec![x(), z()];
        let expected = std::f64::consts::FRAC_PI_2;
        assert!((dist_geodesic(&a, &b) - expected).abs() < 1e-12);
    }

    /// Three nearby configurations on the sphere around +z, tilted toward +x
    /// by increasing angles so forward/backward differences are well defined.
    fn tilted_chain() -> Vec<VectorField> {
        let angles = [0.00, 0.05, 0.10];
        angles
            .iter()
            .map(|&a: &f64| vec![Vector3::new(a.sin(), 0.0, a.cos())])
            .collect()
    }

    #[test]
    fn rising_energies_give_forward_difference() {
        let configurations = tilted_chain();
        let energies = vec![0.0, 1.0, 2.0];
        let mut tangents_out = vec![vec![Vector3::zeros()]; 3];
        tangents(&configurations, &energies, &mut tangents_out);

        let mut forward = vec![configurations[2][0] - configurations[1][0]];
        project_tangential(&mut forward, &configurations[1]);
        normalize_3n(&mut forward);
        assert!((tangents_out[1][0] - forward[0]).norm() < 1e-12);
    }

    #[test]
    fn falling_energies_give_backward_difference() {
        let configurations = tilted_chain();
        let energies = vec![2.0, 1.0, 0.0];
        let mut tangents_out = vec![vec![Vector3::zeros()]; 3];
        tangents(&configurations, &energies, &mut tangents_out);

        let mut backward = vec![configurations[1][0] - configurations[0][0]];
        project_tangential(&mut backward, &configurations[1]);
        normalize_3n(&mut backward);
        assert!((tangents_out[1][0] - backward[0]).norm() < 1e-12);
    }

    #[test]
    fn flat_energies_give_sum_of_differences() {
        let configurations = tilted_chain();
        let energies = vec![1.0, 1.0, 1.0];
        let mut tangents_out = vec![vec![Vector3::zeros()]; 3];
        tangents(&configurations, &energies, &mut tangents_out);

        let mut sum = vec![
            (configurations[2][0] - configurations[1][0])
                + (configurations[1][0] - configurations[0][0]),
        ];
        project_tangential(&mut sum, &configurations[1]);
        normalize_3n(&mut sum);
        assert!((tangents_out[1][0] - sum[0]).norm() < 1e-12);
    }

    #[test]
    fn tangents_are_tangential_and_unit_in_3n() {
        let configurations = tilted_chain();
        let energies = vec![0.0, 2.0, 1.0]; // maximum at the middle image
        let mut tangents_out = vec![vec![Vector3::zeros()]; 3];
        tangents(&configurations, &energies, &mut tangents_out);

        for (t, c) in tangents_out.iter().zip(configurations.iter()) {
            assert!(t[0].dot(&c[0]).abs() < 1e-12);
            assert!((vectormath::dot(t, t) - 1.0).abs() < 1e-12);
        }
    }
}
