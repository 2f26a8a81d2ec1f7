//! Bonet-Wood Neo-Hookean with the classic log(J) volume terms.

use super::Hyperelastic;
use crate::math::decomp::{
    j_hessian, partial_j_partial_f, scaling_eigenvectors_from, twist_and_flip_eigenvectors,
};
use crate::math::eigen::eigensystem3;
use crate::math::{flatten, invariant3, invariant3_sigma, Mat3, Mat9, Real, Vec3, Vec9};

#[derive(Debug, Clone)]
pub struct NeoHookeanBw {
    mu: Real,
    lambda: Real,
}

impl NeoHookeanBw {
    pub fn new(mu: Real, lambda: Real) -> Self {
        assert!(mu > 0.0);
        assert!(lambda > 0.0);
        Self { mu, lambda }
    }
}

impl Hyperelastic for NeoHookeanBw {
    fn name(&self) -> &'static str {
        "Neo-Hookean (Bonet-Wood)"
    }

    fn psi(&self, f: &Mat3) -> Real {
        let ic = f.norm_squared();
        let j = invariant3(f);
        let log_j = j.ln();
        self.mu * 0.5 * (ic - 3.0) - self.mu * log_j + self.lambda * 0.5 * log_j * log_j
    }

    fn pk1(&self, f: &Mat3) -> Mat3 {
        let pjpf = partial_j_partial_f(f);
        let j = invariant3(f);
        self.mu * (f - (1.0 / j) * pjpf) + self.lambda * j.ln() * (1.0 / j) * pjpf
    }

    fn hessian(&self, f: &Mat3) -> Mat9 {
        let pjpf = flatten(&partial_j_partial_f(f));
        let j = invariant3(f);
        let log_j = j.ln();

        Mat9::identity() * self.mu
            + ((self.mu + self.lambda * (1.0 - log_j)) / (j * j)) * (pjpf * pjpf.transpose())
            + ((self.lambda * log_j - self.mu) / j) * j_hessian(f)
    }

    fn clamped_hessian_svd(&self, u: &Mat3, sigma: &Vec3, v: &Mat3) -> Mat9 {
        let j = invariant3_sigma(sigma);
        let log_j = j.ln();
        let s0s1_inv = 1.0 / (sigma[0] * sigma[1]);
        let s0s2_inv = 1.0 / (sigma[0] * sigma[2]);
        let s1s2_inv = 1.0 / (sigma[1] * sigma[2]);

        // 0-2 twist, 3-5 flip, 6-8 scaling
        let front = self.lambda * log_j - self.mu;
        let mut eigenvalues = Vec9::zeros();
        eigenvalues[0] = front * s1s2_inv + self.mu;
        eigenvalues[1] = front * s0s2_inv + self.mu;
        eigenvalues[2] = front * s0s1_inv + self.mu;
        eigenvalues[3] = -front * s1s2_inv + self.mu;
        eigenvalues[4] = -front * s0s2_inv + self.mu;
        eigenvalues[5] = -front * s0s1_inv + self.mu;

        let front_diag = self.lambda * (1.0 - log_j) + self.mu;
        let mut a = Mat3::zeros();
        a[(0, 0)] = front_diag / (sigma[0] * sigma[0]) + self.mu;
        a[(1, 1)] = front_diag / (sigma[1] * sigma[1]) + self.mu;
        a[(2, 2)] = front_diag / (sigma[2] * sigma[2]) + self.mu;

        a[(0, 1)] = self.lambda * s0s1_inv;
        a[(0, 2)] = self.lambda * s0s2_inv;
        a[(1, 2)] = self.lambda * s1s2_inv;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::test_utils::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // keep J positive; log(J) is undefined through inversion
    fn random_uninverted_f(rng: &mut StdRng) -> Mat3 {
        loop {
            let f = random_f(rng);
            if f.determinant() > 0.2 {
                return f;
            }
        }
    }

    #[test]
    fn stress_matches_energy() {
        let mut rng = StdRng::seed_from_u64(401);
        let material = NeoHookeanBw::new(2.0, 9.0);
        for _ in 0..10 {
            let f = random_uninverted_f(&mut rng);
            check_pk1_against_psi(&material, &f);
        }
    }

    #[test]
    fn hessian_matches_stress() {
        let mut rng = StdRng::seed_from_u64(402);
        let material = NeoHookeanBw::new(2.0, 9.0);
        for _ in 0..10 {
            let f = random_uninverted_f(&mut rng);
            check_hessian_against_pk1(&material, &f);
        }
    }

    #[test]
    fn clamped_hessian_is_psd() {
        let mut rng = StdRng::seed_from_u64(403);
        let material = NeoHookeanBw::new(2.0, 9.0);
        for _ in 0..20 {
            let f = random_uninverted_f(&mut rng);
            check_clamped_psd(&material, &f);
        }
    }

    #[test]
    fn energy_is_rotation_invariant() {
        let mut rng = StdRng::seed_from_u64(404);
        let material = NeoHookeanBw::new(2.0, 9.0);
        for _ in 0..10 {
            let f = random_uninverted_f(&mut rng);
            let q = random_rotation(&mut rng);
            check_rotation_invariance(&material, &f, &q);
        }
    }
}
