//! Symmetric eigensolves and positive-semidefinite projections.

use super::{Mat12, Mat3, Mat9, Real, Vec3};
use nalgebra::SymmetricEigen;

/// Eigensystem of a symmetric 3×3 matrix: returns (Q, Λ) with A = Q Λ Qᵀ.
pub fn eigensystem3(a: &Mat3) -> (Mat3, Vec3) {
    let eig = SymmetricEigen::new(*a);
    (eig.eigenvectors, eig.eigenvalues)
}

/// Clamp the eigenvalues of a symmetric 9×9 matrix to be non-negative.
pub fn clamp_eigenvalues9(a: &Mat9) -> Mat9 {
    let eig = SymmetricEigen::new(*a);
    let clamped = eig.eigenvalues.map(|x| x.max(0.0));
    eig.eigenvectors * Mat9::from_diagonal(&clamped) * eig.eigenvectors.transpose()
}

/// Clamp the eigenvalues of a symmetric 12×12 matrix to be non-negative.
pub fn clamp_eigenvalues12(a: &Mat12) -> Mat12 {
    let eig = SymmetricEigen::new(*a);
    let clamped = eig.eigenvalues.map(|x| x.max(0.0));
    eig.eigenvectors * Mat12::from_diagonal(&clamped) * eig.eigenvectors.transpose()
}

/// Smallest eigenvalue of a symmetric 9×9 matrix.
pub fn min_eigenvalue9(a: &Mat9) -> Real {
    SymmetricEigen::new(*a).eigenvalues.min()
}

/// Smallest eigenvalue of a symmetric 12×12 matrix.
pub fn min_eigenvalue12(a: &Mat12) -> Real {
    SymmetricEigen::new(*a).eigenvalues.min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn eigensystem3_reconstructs() {
        let a = Mat3::new(2.0, 0.5, 0.1, 0.5, 1.0, -0.3, 0.1, -0.3, 3.0);
        let (q, lambda) = eigensystem3(&a);
        let rebuilt = q * Mat3::from_diagonal(&lambda) * q.transpose();
        assert!((rebuilt - a).norm() < 1e-10);
    }

    #[test]
    fn clamped_matrices_are_positive_semidefinite() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..20 {
            let raw = Mat9::from_fn(|_, _| rng.gen_range(-1.0..1.0));
            let symmetric = 0.5 * (raw + raw.transpose());
            let clamped = clamp_eigenvalues9(&symmetric);
            assert!(min_eigenvalue9(&clamped) > -1e-10);

            let raw12 = Mat12::from_fn(|_, _| rng.gen_range(-1.0..1.0));
            let symmetric12 = 0.5 * (raw12 + raw12.transpose());
            let clamped12 = clamp_eigenvalues12(&symmetric12);
            assert!(min_eigenvalue12(&clamped12) > -1e-10);
        }
    }

    #[test]
    fn clamping_preserves_positive_definite_input() {
        let a = Mat9::identity() * 2.0;
        assert!((clamp_eigenvalues9(&a) - a).norm() < 1e-10);
    }
}
