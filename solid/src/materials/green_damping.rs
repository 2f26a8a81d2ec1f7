//! Velocity-Green damping over the strain rate Ė = ½(ḞᵀF + FᵀḞ).

use super::Damping;
use crate::math::decomp::partial_f_partial_f;
use crate::math::{flatten, Mat3, Mat9, Real};

#[derive(Debug, Clone)]
pub struct GreenDamping {
    mu: Real,
}

impl GreenDamping {
    pub fn new(mu: Real) -> Self {
        assert!(mu > 0.0);
        Self { mu }
    }
}

impl Damping for GreenDamping {
    fn name(&self) -> &'static str {
        "Green Damping"
    }

    fn mu(&self) -> Real {
        self.mu
    }

    fn psi(&self, f: &Mat3, fdot: &Mat3) -> Real {
        let fdot_f = fdot.transpose() * f;
        let edot = 0.5 * (fdot_f + fdot_f.transpose());
        self.mu * edot.norm_squared()
    }

    fn pk1(&self, f: &Mat3, fdot: &Mat3) -> Mat3 {
        self.mu * f * (f.transpose() * fdot + fdot.transpose() * f)
    }

    fn hessian(&self, f: &Mat3, _fdot: &Mat3) -> Mat9 {
        let mut dpdf = Mat9::zeros();
        let mut index = 0;
        for j in 0..3 {
            for i in 0..3 {
                let pfpf = partial_f_partial_f(i, j);
                let column = f * f.transpose() * pfpf + f * pfpf.transpose() * f;
                dpdf.set_column(index, &flatten(&column));
                index += 1;
            }
        }
        self.mu * dpdf
    }

    fn position_gradient(&self, f: &Mat3, fdot: &Mat3) -> Mat9 {
        let f_sum = f.transpose() * fdot + fdot.transpose() * f;
        let f_product = f * fdot.transpose();

        let mut dpdf = Mat9::zeros();
        let mut index = 0;
        for j in 0..3 {
            for i in 0..3 {
                let pfpf = partial_f_partial_f(i, j);
                let column = pfpf * f_sum + f * pfpf.transpose() * fdot + f_product * pfpf;
                dpdf.set_column(index, &flatten(&column));
                index += 1;
            }
        }
        self.mu * dpdf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::test_utils::random_f;
    use crate::math::eigen::min_eigenvalue9;
    use crate::math::Vec9;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn pk1_matches_finite_difference_in_fdot() {
        let mut rng = StdRng::seed_from_u64(601);
        let damping = GreenDamping::new(0.5);
        let f = random_f(&mut rng);
        let fdot = random_f(&mut rng) - Mat3::identity();

        let h = 1e-4;
        let pk1 = damping.pk1(&f, &fdot);
        let scale = 1.0 + pk1.norm();
        for j in 0..3 {
            for i in 0..3 {
                let mut plus = fdot;
                let mut minus = fdot;
                plus[(i, j)] += h;
                minus[(i, j)] -= h;
                let fd = (damping.psi(&f, &plus) - damping.psi(&f, &minus)) / (2.0 * h);
                assert!((pk1[(i, j)] - fd).abs() < 1e-4 * scale);
            }
        }
    }

    #[test]
    fn velocity_hessian_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(602);
        let damping = GreenDamping::new(0.5);
        let f = random_f(&mut rng);
        let fdot = random_f(&mut rng) - Mat3::identity();

        let h = 1e-4;
        let hessian = damping.hessian(&f, &fdot);
        let scale = 1.0 + hessian.norm();
        for col in 0..9 {
            let mut plus = fdot;
            let mut minus = fdot;
            plus[(col % 3, col / 3)] += h;
            minus[(col % 3, col / 3)] -= h;
            let fd: Vec9 =
                (flatten(&damping.pk1(&f, &plus)) - flatten(&damping.pk1(&f, &minus))) / (2.0 * h);
            for row in 0..9 {
                assert!((hessian[(row, col)] - fd[row]).abs() < 1e-4 * scale);
            }
        }
    }

    #[test]
    fn position_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(603);
        let damping = GreenDamping::new(0.5);
        let f = random_f(&mut rng);
        let fdot = random_f(&mut rng) - Mat3::identity();

        let h = 1e-4;
        let gradient = damping.position_gradient(&f, &fdot);
        let scale = 1.0 + gradient.norm();
        for col in 0..9 {
            let mut plus = f;
            let mut minus = f;
            plus[(col % 3, col / 3)] += h;
            minus[(col % 3, col / 3)] -= h;
            let fd: Vec9 = (flatten(&damping.pk1(&plus, &fdot))
                - flatten(&damping.pk1(&minus, &fdot)))
                / (2.0 * h);
            for row in 0..9 {
                assert!((gradient[(row, col)] - fd[row]).abs() < 1e-4 * scale);
            }
        }
    }

    #[test]
    fn velocity_hessian_is_positive_semidefinite() {
        let mut rng = StdRng::seed_from_u64(604);
        let damping = GreenDamping::new(0.5);
        for _ in 0..10 {
            let f = random_f(&mut rng);
            let fdot = random_f(&mut rng) - Mat3::identity();
            let clamped = damping.clamped_hessian(&f, &fdot);
            assert!(min_eigenvalue9(&clamped) >= -1e-8);
        }
    }
}
