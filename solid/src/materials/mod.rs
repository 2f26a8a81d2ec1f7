//! Isotropic hyperelastic and damping material models.
//!
//! Every hyperelastic variant exposes the same contract: an energy density
//! ψ(F), the first Piola–Kirchhoff stress P = ∂ψ/∂F, the 9×9 stress
//! derivative H = ∂P/∂F in the flattened basis, and a positive-semidefinite
//! "clamped" H̄ built from the material's analytic twist/flip/scaling
//! eigensystem with negative eigenvalues zeroed.

mod arap;
mod green_damping;
mod neo_hookean_bw;
mod snh;
mod snh_with_barrier;
mod stvk;

pub use arap::Arap;
pub use green_damping::GreenDamping;
pub use neo_hookean_bw::NeoHookeanBw;
pub use snh::Snh;
pub use snh_with_barrier::SnhWithBarrier;
pub use stvk::StVk;

use crate::math::decomp::svd_rv;
use crate::math::{Mat3, Mat9, Real, Vec3};

/// Convert Young's modulus E and Poisson's ratio ν to the first Lamé
/// parameter μ.
pub fn lame_mu(e: Real, nu: Real) -> Real {
    e / (2.0 * (1.0 + nu))
}

/// Convert Young's modulus E and Poisson's ratio ν to the second Lamé
/// parameter λ.
pub fn lame_lambda(e: Real, nu: Real) -> Real {
    e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu))
}

fn recompose(u: &Mat3, sigma: &Vec3, v: &Mat3) -> Mat3 {
    u * Mat3::from_diagonal(sigma) * v.transpose()
}

/// Contract shared by all hyperelastic material variants.
pub trait Hyperelastic: Send + Sync {
    /// The name of the material
    fn name(&self) -> &'static str;

    /// Strain energy density Psi
    fn psi(&self, f: &Mat3) -> Real;

    /// Psi evaluated from a rotation-variant SVD of F
    fn psi_svd(&self, u: &Mat3, sigma: &Vec3, v: &Mat3) -> Real {
        self.psi(&recompose(u, sigma, v))
    }

    /// First Piola-Kirchhoff stress, ∂ψ/∂F
    fn pk1(&self, f: &Mat3) -> Mat3;

    /// PK1 evaluated from a rotation-variant SVD of F
    fn pk1_svd(&self, u: &Mat3, sigma: &Vec3, v: &Mat3) -> Mat3 {
        self.pk1(&recompose(u, sigma, v))
    }

    /// Derivative of the PK1 stress, ∂²ψ/∂F² as a 9×9
    fn hessian(&self, f: &Mat3) -> Mat9;

    /// Hessian clamped to positive semi-definiteness
    fn clamped_hessian(&self, f: &Mat3) -> Mat9 {
        let (u, sigma, v) = svd_rv(f);
        self.clamped_hessian_svd(&u, &sigma, &v)
    }

    /// Clamped Hessian from the material's analytic eigensystem
    fn clamped_hessian_svd(&self, u: &Mat3, sigma: &Vec3, v: &Mat3) -> Mat9;

    /// True if the energy computation requires the SVD of F
    fn energy_needs_svd(&self) -> bool;

    /// True if the PK1 computation requires the SVD of F
    fn pk1_needs_svd(&self) -> bool;
}

/// Contract for damping materials, evaluated on (F, Ḟ).
pub trait Damping: Send + Sync {
    /// The name of the material
    fn name(&self) -> &'static str;

    /// Damping stiffness
    fn mu(&self) -> Real;

    /// Dissipation density
    fn psi(&self, f: &Mat3, fdot: &Mat3) -> Real;

    /// Damping PK1 stress
    fn pk1(&self, f: &Mat3, fdot: &Mat3) -> Mat3;

    /// Velocity Hessian, ∂PK1/∂Ḟ with F held constant
    fn hessian(&self, f: &Mat3, fdot: &Mat3) -> Mat9;

    /// Velocity Hessian clamped to positive semi-definiteness
    fn clamped_hessian(&self, f: &Mat3, fdot: &Mat3) -> Mat9 {
        crate::math::eigen::clamp_eigenvalues9(&self.hessian(f, fdot))
    }

    /// The asymmetric cross term ∂PK1/∂F, exposed for completeness but left
    /// out of the solve
    fn position_gradient(&self, _f: &Mat3, _fdot: &Mat3) -> Mat9 {
        Mat9::zeros()
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use crate::math::{flatten, Vec9};
    use rand::rngs::StdRng;
    use rand::Rng;

    /// A random rotation from a random axis and angle.
    pub fn random_rotation(rng: &mut StdRng) -> Mat3 {
        let axis = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        )
        .normalize();
        let angle: Real = rng.gen_range(0.0..std::f64::consts::TAU);
        nalgebra::Rotation3::from_axis_angle(&nalgebra::Unit::new_normalize(axis), angle)
            .into_inner()
    }

    /// A random deformation gradient with singular values in (0.5, 2.0).
    pub fn random_f(rng: &mut StdRng) -> Mat3 {
        let u = random_rotation(rng);
        let v = random_rotation(rng);
        let sigma = Vec3::new(
            rng.gen_range(0.5..2.0),
            rng.gen_range(0.5..2.0),
            rng.gen_range(0.5..2.0),
        );
        u * Mat3::from_diagonal(&sigma) * v.transpose()
    }

    /// Central finite difference of ψ, checked against PK1 componentwise.
    pub fn check_pk1_against_psi(material: &dyn Hyperelastic, f: &Mat3) {
        let h = 1e-4;
        let pk1 = material.pk1(f);
        let scale = 1.0 + pk1.norm();
        for j in 0..3 {
            for i in 0..3 {
                let mut plus = *f;
                let mut minus = *f;
                plus[(i, j)] += h;
                minus[(i, j)] -= h;
                let fd = (material.psi(&plus) - material.psi(&minus)) / (2.0 * h);
                assert!(
                    (pk1[(i, j)] - fd).abs() < 1e-4 * scale,
                    "{} PK1({}, {}): analytic {} vs fd {}",
                    material.name(),
                    i,
                    j,
                    pk1[(i, j)],
                    fd
                );
            }
        }
    }

    /// Central finite difference of PK1, checked against the Hessian.
    pub fn check_hessian_against_pk1(material: &dyn Hyperelastic, f: &Mat3) {
        let h = 1e-4;
        let hessian = material.hessian(f);
        let scale = 1.0 + hessian.norm();
        for col in 0..9 {
            let mut plus = *f;
            let mut minus = *f;
            plus[(col % 3, col / 3)] += h;
            minus[(col % 3, col / 3)] -= h;
            let fd: Vec9 = (flatten(&material.pk1(&plus)) - flatten(&material.pk1(&minus)))
                / (2.0 * h);
            for row in 0..9 {
                assert!(
                    (hessian[(row, col)] - fd[row]).abs() < 1e-4 * scale,
                    "{} H({}, {}): analytic {} vs fd {}",
                    material.name(),
                    row,
                    col,
                    hessian[(row, col)],
                    fd[row]
                );
            }
        }
    }

    /// Clamped Hessian must be positive semidefinite.
    pub fn check_clamped_psd(material: &dyn Hyperelastic, f: &Mat3) {
        let clamped = material.clamped_hessian(f);
        let min = crate::math::eigen::min_eigenvalue9(&clamped);
        assert!(min >= -1e-8, "{}: min eigenvalue {}", material.name(), min);
    }

    /// ψ and the spectrum of H must be invariant under a uniform world
    /// rotation Q F.
    pub fn check_rotation_invariance(material: &dyn Hyperelastic, f: &Mat3, q: &Mat3) {
        let psi = material.psi(f);
        let rotated = material.psi(&(q * f));
        assert!(
            (psi - rotated).abs() < 1e-8 * (1.0 + psi.abs()),
            "{}: psi {} vs rotated {}",
            material.name(),
            psi,
            rotated
        );

        let mut eigenvalues = nalgebra::SymmetricEigen::new(material.hessian(f)).eigenvalues;
        let mut rotated_eigenvalues =
            nalgebra::SymmetricEigen::new(material.hessian(&(q * f))).eigenvalues;
        let sort = |v: &mut crate::math::Vec9| {
            let mut data: Vec<Real> = v.iter().copied().collect();
            data.sort_by(|a, b| a.partial_cmp(b).expect("finite eigenvalues"));
            for (slot, value) in v.iter_mut().zip(data) {
                *slot = value;
            }
        };
        sort(&mut eigenvalues);
        sort(&mut rotated_eigenvalues);
        for i in 0..9 {
            assert!(
                (eigenvalues[i] - rotated_eigenvalues[i]).abs()
                    < 1e-8 * (1.0 + eigenvalues[i].abs()),
                "{}: eigenvalue {} moved under rotation",
                material.name(),
                i
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lame_conversions_match_reference_values() {
        // E = 6, nu = 0.45 gives mu near 2.07 and lambda near 18.6
        let mu = lame_mu(6.0, 0.45);
        let lambda = lame_lambda(6.0, 0.45);
        assert!((mu - 6.0 / 2.9).abs() < 1e-12);
        assert!((lambda - 2.7 / 0.145).abs() < 1e-12);
    }
}
