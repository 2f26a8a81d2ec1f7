//! Stable Neo-Hookean with the log(I_C + 1) barrier term retained,
//! following the eigensystem pattern of "Analytic Eigensystems for
//! Isotropic Distortion Energies" (Smith et al. 2019).

use super::Hyperelastic;
use crate::math::decomp::{
    j_hessian, partial_j_partial_f, scaling_eigenvectors_from, twist_and_flip_eigenvectors,
};
use crate::math::eigen::eigensystem3;
use crate::math::{
    flatten, invariant2_sigma, invariant3, invariant3_sigma, Mat3, Mat9, Real, Vec3, Vec9,
};

#[derive(Debug, Clone)]
pub struct SnhWithBarrier {
    mu: Real,
    lambda: Real,
    alpha: Real,
}

impl SnhWithBarrier {
    pub fn new(mu: Real, lambda: Real) -> Self {
        assert!(mu > 0.0);
        assert!(lambda > 0.0);
        Self {
            mu,
            lambda,
            // the rest stability shift, so PK1 vanishes at F = I
            alpha: 1.0 + mu / lambda - mu / (4.0 * lambda),
        }
    }
}

impl Hyperelastic for SnhWithBarrier {
    fn name(&self) -> &'static str {
        "Stable Neo-Hookean (barrier)"
    }

    fn psi(&self, f: &Mat3) -> Real {
        let ic = f.norm_squared();
        let j_minus = f.determinant() - self.alpha;
        0.5 * (self.mu * (ic - 3.0) + self.lambda * j_minus * j_minus
            - self.mu * (ic + 1.0).ln())
    }

    fn pk1(&self, f: &Mat3) -> Mat3 {
        let ic = f.norm_squared();
        let pjpf = partial_j_partial_f(f);
        let j_minus = f.determinant() - self.alpha;
        self.mu * (1.0 - 1.0 / (ic + 1.0)) * f + self.lambda * j_minus * pjpf
    }

    fn hessian(&self, f: &Mat3) -> Mat9 {
        let ic = f.norm_squared();
        let fv = flatten(f);
        let pjpf = flatten(&partial_j_partial_f(f));
        let i3 = invariant3(f);

        Mat9::identity() * (self.mu * (1.0 - 1.0 / (ic + 1.0)))
            + (2.0 * self.mu / ((ic + 1.0) * (ic + 1.0))) * (fv * fv.transpose())
            + self.lambda * (pjpf * pjpf.transpose())
            + self.lambda * (i3 - self.alpha) * j_hessian(f)
    }

    fn clamped_hessian_svd(&self, u: &Mat3, sigma: &Vec3, v: &Mat3) -> Mat9 {
        let ic = invariant2_sigma(sigma);
        let j = invariant3_sigma(sigma);
        let ic1 = ic + 1.0;

        // 0-2 twist, 3-5 flip, 6-8 scaling
        let barrier = self.mu * (1.0 - 1.0 / ic1);
        let front = self.lambda * (j - self.alpha);
        let mut eigenvalues = Vec9::zeros();
        for i in 0..3 {
            eigenvalues[i] = barrier + front * sigma[i];
            eigenvalues[3 + i] = barrier - front * sigma[i];
        }

        let mut a = Mat3::zeros();
        for i in 0..3 {
            let (j_idx, k_idx) = ((i + 1) % 3, (i + 2) % 3);
            let cofactor = sigma[j_idx] * sigma[k_idx];
            a[(i, i)] = self.mu + self.lambda * cofactor * cofactor - self.mu / ic1
                + 2.0 * self.mu * sigma[i] * sigma[i] / (ic1 * ic1);
        }
        for i in 0..3 {
            for j_idx in 0..3 {
                if i == j_idx {
                    continue;
                }
                let k_idx = 3 - i - j_idx;
                a[(i, j_idx)] = self.lambda * sigma[k_idx] * (2.0 * j - self.alpha)
                    + 2.0 * self.mu * sigma[i] * sigma[j_idx] / (ic1 * ic1);
            }
        }

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
