//! As-rigid-as-possible energy, ψ = μ ‖F − R‖².

use super::Hyperelastic;
use crate::math::decomp::{
    scaling_eigenvectors, svd_rv, twist_and_flip_eigenvectors,
};
use crate::math::{flatten, Mat3, Mat9, Real, Vec3, Vec9};

#[derive(Debug, Clone)]
pub struct Arap {
    mu: Real,
}

impl Arap {
    pub fn new(mu: Real) -> Self {
        assert!(mu > 0.0);
        Self { mu }
    }
}

impl Hyperelastic for Arap {
    fn name(&self) -> &'static str {
        "ARAP"
    }

    fn psi(&self, f: &Mat3) -> Real {
        let (u, sigma, v) = svd_rv(f);
        self.psi_svd(&u, &sigma, &v)
    }

    fn psi_svd(&self, u: &Mat3, sigma: &Vec3, v: &Mat3) -> Real {
        let f = u * Mat3::from_diagonal(sigma) * v.transpose();
        let r = u * v.transpose();
        self.mu * (f - r).norm_squared()
    }

    fn pk1(&self, f: &Mat3) -> Mat3 {
        let (u, sigma, v) = svd_rv(f);
        self.pk1_svd(&u, &sigma, &v)
    }

    fn pk1_svd(&self, u: &Mat3, sigma: &Vec3, v: &Mat3) -> Mat3 {
        let r = u * v.transpose();
        let s = v * Mat3::from_diagonal(sigma) * v.transpose();
        r * (2.0 * self.mu * (s - Mat3::identity()))
    }

    fn hessian(&self, f: &Mat3) -> Mat9 {
        let (u, sigma, v) = svd_rv(f);

        // eigenvalues of dR/dF, scaled by mu
        let lambda0 = self.mu * 2.0 / (sigma[1] + sigma[2]);
        let lambda1 = self.mu * 2.0 / (sigma[0] + sigma[2]);
        let lambda2 = self.mu * 2.0 / (sigma[0] + sigma[1]);

        // twist eigenmatrices, rotated into world
        let twist0 = Mat3::new(0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, -1.0, 0.0);
        let twist1 = Mat3::new(0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        let twist2 = Mat3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0);

        let front = 1.0 / (2.0 as Real).sqrt();
        let q0: Vec9 = flatten(&(front * u * twist0 * v.transpose()));
        let q1: Vec9 = flatten(&(front * u * twist1 * v.transpose()));
        let q2: Vec9 = flatten(&(front * u * twist2 * v.transpose()));

        let mut dpdf = Mat9::identity() * self.mu;
        dpdf -= lambda0 * (q0 * q0.transpose());
        dpdf -= lambda1 * (q1 * q1.transpose());
        dpdf -= lambda2 * (q2 * q2.transpose());

        // 2 mu (I - dR/dF)
        dpdf * 2.0
    }

    fn clamped_hessian_svd(&self, u: &Mat3, sigma: &Vec3, v: &Mat3) -> Mat9 {
        let mut q = Mat9::zeros();
        twist_and_flip_eigenvectors(u, v, &mut q);
        scaling_eigenvectors(u, v, &mut q);

        // flip and scaling modes sit at 2 mu; only the twists dip negative
        let mut lambda = Vec9::from_element(2.0 * self.mu);
        lambda[0] = self.mu * (2.0 - 4.0 / (sigma[1] + sigma[2]));
        lambda[1] = self.mu * (2.0 - 4.0 / (sigma[0] + sigma[2]));
        lambda[2] = self.mu * (2.0 - 4.0 / (sigma[0] + sigma[1]));

        for i in 0..9 {
            lambda[i] = lambda[i].max(0.0);
        }
        q * Mat9::from_diagonal(&lambda) * q.transpose()
    }

    fn energy_needs_svd(&self) -> bool {
        true
    }

    fn pk1_needs_svd(&self) -> bool {
        true
    }
}
