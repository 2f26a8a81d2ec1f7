//! Fixed-size linear algebra shared by the material models, the collision
//! energies, and the mesh assembly pipeline.
//!
//! Fourth-order tensors are stored as 9×9 matrices over the column-major
//! flattening of 3×3 matrices, so `flatten`/`unflatten` fix the basis that
//! every Hessian in this crate is expressed in.

pub mod decomp;
pub mod eigen;
pub mod sparse;

use nalgebra as na;

/// Scalar type used throughout the core.
pub type Real = f64;

pub type Vec2 = na::Vector2<Real>;
pub type Vec3 = na::Vector3<Real>;
pub type Vec9 = na::SVector<Real, 9>;
pub type Vec12 = na::SVector<Real, 12>;

pub type Mat3 = na::Matrix3<Real>;
pub type Mat9 = na::SMatrix<Real, 9, 9>;
pub type Mat12 = na::SMatrix<Real, 12, 12>;
pub type Mat3x12 = na::SMatrix<Real, 3, 12>;
pub type Mat9x12 = na::SMatrix<Real, 9, 12>;

/// Dynamically sized state vector (3N stacked vertex quantities).
pub type DVec = na::DVector<Real>;

/// Convert a 3×3 matrix to a 9-vector in column-major order.
pub fn flatten(a: &Mat3) -> Vec9 {
    Vec9::from_column_slice(a.as_slice())
}

/// Reconstruct the 3×3 matrix a 9-vector was flattened from.
pub fn unflatten(v: &Vec9) -> Mat3 {
    Mat3::from_column_slice(v.as_slice())
}

/// Matrix double-contraction, A : B.
pub fn ddot(a: &Mat3, b: &Mat3) -> Real {
    let mut result = 0.0;
    for j in 0..3 {
        for i in 0..3 {
            result += a[(i, j)] * b[(i, j)];
        }
    }
    result
}

/// Second tensor invariant, I₂ = ‖F‖².
pub fn invariant2(f: &Mat3) -> Real {
    ddot(f, f)
}

/// I₂ from the singular values.
pub fn invariant2_sigma(sigma: &Vec3) -> Real {
    sigma[0] * sigma[0] + sigma[1] * sigma[1] + sigma[2] * sigma[2]
}

/// Third tensor invariant, I₃ = det F = J.
pub fn invariant3(f: &Mat3) -> Real {
    f.determinant()
}

/// I₃ from the singular values.
pub fn invariant3_sigma(sigma: &Vec3) -> Real {
    sigma[0] * sigma[1] * sigma[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_round_trip_is_exact() {
        let a = Mat3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let v = flatten(&a);

        // column-major ordering
        assert_eq!(v[0], 1.0);
        assert_eq!(v[1], 4.0);
        assert_eq!(v[2], 7.0);
        assert_eq!(v[3], 2.0);

        assert_eq!(unflatten(&v), a);
    }

    #[test]
    fn invariants_match_sigma_forms() {
        let f = Mat3::new(0.9, 0.1, 0.0, -0.2, 1.1, 0.3, 0.0, 0.2, 0.8);
        let (_, sigma, _) = decomp::svd_rv(&f);

        assert!((invariant2(&f) - invariant2_sigma(&sigma)).abs() < 1e-12);
        assert!((invariant3(&f) - invariant3_sigma(&sigma)).abs() < 1e-12);
    }

    #[test]
    fn ddot_matches_squared_norm() {
        let a = Mat3::new(1.0, -2.0, 0.5, 0.0, 3.0, 1.0, -1.0, 0.25, 2.0);
        assert!((ddot(&a, &a) - a.norm_squared()).abs() < 1e-14);
    }
}
