//! Stable Neo-Hookean, the simplified production variant.
//!
//! λ is reparametrised as λ′ = λ + μ with shift α = 1 + μ/λ′ so that ψ
//! vanishes at F = I. The log(I_C + 1) safeguard from the paper is dropped;
//! see [`SnhWithBarrier`](super::SnhWithBarrier) for the guarded form.

use super::Hyperelastic;
use crate::math::decomp::{
    j_hessian, partial_j_partial_f, scaling_eigenvectors_from, twist_and_flip_eigenvectors,
};
use crate::math::eigen::eigensystem3;
use crate::math::{flatten, invariant3, invariant3_sigma, Mat3, Mat9, Real, Vec3, Vec9};

#[derive(Debug, Clone)]
pub struct Snh {
    mu: Real,
    lambda: Real,
    alpha: Real,
}

impl Snh {
    pub fn new(mu: Real, lambda: Real) -> Self {
        let reparametrised = lambda + mu;
        assert!(mu > 0.0);
        assert!(reparametrised > 0.0);
        Self {
            mu,
            lambda: reparametrised,
            alpha: 1.0 + mu / reparametrised,
        }
    }
}

impl Hyperelastic for Snh {
    fn name(&self) -> &'static str {
        "Stable Neo-Hookean"
    }

    fn psi(&self, f: &Mat3) -> Real {
        let ic = f.norm_squared();
        let j_minus = f.determinant() - self.alpha;
        0.5 * (self.mu * (ic - 3.0) + self.lambda * j_minus * j_minus)
    }

    fn pk1(&self, f: &Mat3) -> Mat3 {
        let pjpf = partial_j_partial_f(f);
        let j_minus = f.determinant() - self.alpha;
        self.mu * f + self.lambda * j_minus * pjpf
    }

    fn hessian(&self, f: &Mat3) -> Mat9 {
        let pjpf = flatten(&partial_j_partial_f(f));
        let i3 = invariant3(f);
        let scale = self.lambda * (i3 - self.alpha);

        Mat9::identity() * self.mu
            + self.lambda * (pjpf * pjpf.transpose())
            + scale * j_hessian(f)
    }

    fn clamped_hessian_svd(&self, u: &Mat3, sigma: &Vec3, v: &Mat3) -> Mat9 {
        let j = invariant3_sigma(sigma);

        // 0-2 twist, 3-5 flip, 6-8 scaling
        let front = self.lambda * (j - 1.0) - self.mu;
        let mut eigenvalues = Vec9::zeros();
        eigenvalues[0] = front * sigma[0] + self.mu;
        eigenvalues[1] = front * sigma[1] + self.mu;
        eigenvalues[2] = front * sigma[2] + self.mu;
        eigenvalues[3] = -front * sigma[0] + self.mu;
        eigenvalues[4] = -front * sigma[1] + self.mu;
        eigenvalues[5] = -front * sigma[2] + self.mu;

        let s0s0 = sigma[0] * sigma[0];
        let s1s1 = sigma[1] * sigma[1];
        let s2s2 = sigma[2] * sigma[2];

        let mut a = Mat3::zeros();
        a[(0, 0)] = self.mu + self.lambda * s1s1 * s2s2;
        a[(1, 1)] = self.mu + self.lambda * s0s0 * s2s2;
        a[(2, 2)] = self.mu + self.lambda * s0s0 * s1s1;

        let front_off_diag = self.lambda * (2.0 * j - 1.0) - self.mu;
        a[(0, 1)] = front_off_diag * sigma[2];
        a[(0, 2)] = front_off_diag * sigma[1];
        a[(1, 2)] = front_off_diag * sigma[0];
        a[(1, 0)] = a[(0, 1)];
        a[(2, 0)] = a[(0, 2)];
        a[(2, 1)] = a[(1, 2)];

        let (q3, block_eigenvalues) = eigensystem3(&a);
        for i in 0..3 {
            eigenvalues[6 + i] = block_eigenvalues[i];
        }

        let mut q = Mat9::zeros();
        twist_and_flip_eigenvectors(u, v, &mut q);
        scaling_eigenvectors_from(u, &q3, v, &mut q);

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
