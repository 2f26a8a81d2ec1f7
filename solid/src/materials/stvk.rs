//! Saint Venant-Kirchhoff energy over the Green strain E = ½(FᵀF − I).

use super::Hyperelastic;
use crate::math::decomp::{
    scaling_eigenvectors_from, svd_rv, twist_and_flip_eigenvectors,
};
use crate::math::eigen::eigensystem3;
use crate::math::{invariant2_sigma, Mat3, Mat9, Real, Vec3, Vec9};

#[derive(Debug, Clone)]
pub struct StVk {
    mu: Real,
    lambda: Real,
}

impl StVk {
    pub fn new(mu: Real, lambda: Real) -> Self {
        assert!(mu > 0.0);
        Self { mu, lambda }
    }

    /// Analytic eigensystem of the energy Hessian: twist modes 0-2, flip
    /// modes 3-5, and a 3×3 scaling block diagonalised numerically.
    fn eigen_system(&self, u: &Mat3, sigma: &Vec3, v: &Mat3) -> (Vec9, Mat9) {
        let i2 = invariant2_sigma(sigma);
        let front = -self.mu + 0.5 * self.lambda * (i2 - 3.0);
        let s0_sq = sigma[0] * sigma[0];
        let s1_sq = sigma[1] * sigma[1];
        let s2_sq = sigma[2] * sigma[2];
        let s0s1 = sigma[0] * sigma[1];
        let s0s2 = sigma[0] * sigma[2];
        let s1s2 = sigma[1] * sigma[2];

        let mut eigenvalues = Vec9::zeros();
        eigenvalues[0] = front + self.mu * (s1_sq + s2_sq - s1s2);
        eigenvalues[1] = front + self.mu * (s0_sq + s2_sq - s0s2);
        eigenvalues[2] = front + self.mu * (s0_sq + s1_sq - s0s1);

        eigenvalues[3] = front + self.mu * (s1_sq + s2_sq + s1s2);
        eigenvalues[4] = front + self.mu * (s0_sq + s2_sq + s0s2);
        eigenvalues[5] = front + self.mu * (s0_sq + s1_sq + s0s1);

        // scaling block, off-diagonals couple the singular values
        let mut a = Mat3::zeros();
        for i in 0..3 {
            a[(i, i)] = front + (self.lambda + 3.0 * self.mu) * sigma[i] * sigma[i];
        }
        for j in 0..3 {
            for i in 0..3 {
                if i != j {
                    a[(i, j)] = self.lambda * sigma[i] * sigma[j];
                }
            }
        }

        let (q3, block_eigenvalues) = eigensystem3(&a);
        for i in 0..3 {
            eigenvalues[6 + i] = block_eigenvalues[i];
        }

        let mut eigenvectors = Mat9::zeros();
        twist_and_flip_eigenvectors(u, v, &mut eigenvectors);
        scaling_eigenvectors_from(u, &q3, v, &mut eigenvectors);

        (eigenvalues, eigenvectors)
    }
}

impl Hyperelastic for StVk {
    fn name(&self) -> &'static str {
        "StVK"
    }

    fn psi(&self, f: &Mat3) -> Real {
        let e = 0.5 * (f.transpose() * f - Mat3::identity());
        self.mu * e.norm_squared() + 0.5 * self.lambda * e.trace() * e.trace()
    }

    fn pk1(&self, f: &Mat3) -> Mat3 {
        let e = 0.5 * (f.transpose() * f - Mat3::identity());

        // second PK, pushed forward by F
        let s = 2.0 * self.mu * e + self.lambda * e.trace() * Mat3::identity();
        f * s
    }

    fn hessian(&self, f: &Mat3) -> Mat9 {
        let (u, sigma, v) = svd_rv(f);
        let (eigenvalues, q) = self.eigen_system(&u, &sigma, &v);
        q * Mat9::from_diagonal(&eigenvalues) * q.transpose()
    }

    fn clamped_hessian_svd(&self, u: &Mat3, sigma: &Vec3, v: &Mat3) -> Mat9 {
        let (mut eigenvalues, q) = self.eigen_system(u, sigma, v);
        for i in 0..9 {
            eigenvalues[i] = eigenvalues[i].max(0.0);
        }
        q * Mat9::from_diagonal(&eigenvalues) * q.transpose()
    }

    fn energy_needs_svd(&self) -> bool {
        false
    }

    fn pk1_needs_svd(&self) -> bool {
        false
    }
}
