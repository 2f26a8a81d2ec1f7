//! Vertex-face contact energies.
//!
//! All variants take the packed four-vertex configuration with the colliding
//! vertex first and the face vertices following in reversed orientation, and
//! return ψ, a 12-gradient, a 12×12 Hessian, and its PSD projection.

use super::kernels::{
    barycentric_coordinates, normal_gradient_vf, normal_hessian_vf, t_diff_partial, vf_edges,
};
use crate::math::eigen::clamp_eigenvalues12;
use crate::math::{Mat12, Mat3x12, Real, Vec3, Vec12};

/// Contract shared by the vertex-face contact energies.
pub trait VertexFaceEnergy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Collision stiffness
    fn mu(&self) -> Real;
    fn set_mu(&mut self, mu: Real);

    /// Collision epsilon -- how far apart should we push things?
    fn eps(&self) -> Real;
    fn set_eps(&mut self, eps: Real);

    /// Contact energy
    fn psi(&self, v: &[Vec3; 4]) -> Real;

    /// Gradient of psi; the force is its negative
    fn gradient(&self, v: &[Vec3; 4]) -> Vec12;

    /// Hessian of psi
    fn hessian(&self, v: &[Vec3; 4]) -> Mat12;

    /// Hessian clamped to positive semi-definiteness
    fn clamped_hessian(&self, v: &[Vec3; 4]) -> Mat12 {
        clamp_eigenvalues12(&self.hessian(v))
    }
}

// Jacobian of tvf = v0 - v2 with respect to the packed 12-vector.
fn tvf_partial() -> Mat3x12 {
    let mut partial = Mat3x12::zeros();
    for k in 0..3 {
        partial[(k, k)] = 1.0;
        partial[(k, 6 + k)] = -1.0;
    }
    partial
}

/// Cross-product form: spring length is the normal component of v₀ − v₂.
/// The fall-back energy when the bodies are nearly parallel.
#[derive(Debug, Clone)]
pub struct VertexFaceCollision {
    mu: Real,
    eps: Real,
}

impl VertexFaceCollision {
    pub fn new(mu: Real, eps: Real) -> Self {
        Self { mu, eps }
    }

    fn spring_length_gradient(v: &[Vec3; 4], e: &[Vec3; 3], n: &Vec3) -> Vec12 {
        let n_partial = normal_gradient_vf(e);
        let tvf = v[0] - v[2];
        n_partial.transpose() * tvf + tvf_partial().transpose() * n
    }

    fn spring_length_hessian(v: &[Vec3; 4], e: &[Vec3; 3]) -> Mat12 {
        let tvf = v[0] - v[2];

        // mode-3 contraction of the normal Hessian against tvf
        let normal_h = normal_hessian_vf(e);
        let contracted = tvf[0] * normal_h[0] + tvf[1] * normal_h[1] + tvf[2] * normal_h[2];

        let n_grad = normal_gradient_vf(e);
        let product = n_grad.transpose() * tvf_partial();

        contracted + product + product.transpose()
    }
}

impl VertexFaceEnergy for VertexFaceCollision {
    fn name(&self) -> &'static str {
        "Vertex-Face Collision"
    }

    fn mu(&self) -> Real {
        self.mu
    }

    fn set_mu(&mut self, mu: Real) {
        self.mu = mu;
    }

    fn eps(&self) -> Real {
        self.eps
    }

    fn set_eps(&mut self, eps: Real) {
        self.eps = eps;
    }

    fn psi(&self, v: &[Vec3; 4]) -> Real {
        let e = vf_edges(v);
        let n = e[2].cross(&e[0]).normalize();

        // spring length against a non-zero rest length
        let tvf = v[0] - v[2];
        let spring_length = tvf.dot(&n) - self.eps;
        self.mu * spring_length * spring_length
    }

    fn gradient(&self, v: &[Vec3; 4]) -> Vec12 {
        let e = vf_edges(v);
        let n = e[2].cross(&e[0]).normalize();

        let tvf = v[0] - v[2];
        let spring_length = tvf.dot(&n) - self.eps;
        2.0 * self.mu * spring_length * Self::spring_length_gradient(v, &e, &n)
    }

    fn hessian(&self, v: &[Vec3; 4]) -> Mat12 {
        let e = vf_edges(v);
        let n = e[2].cross(&e[0]).normalize();

        let tvf = v[0] - v[2];
        let spring_length = tvf.dot(&n) - self.eps;
        let gradient = Self::spring_length_gradient(v, &e, &n);
        let hessian = Self::spring_length_hessian(v, &e);

        2.0 * self.mu * (gradient * gradient.transpose() + spring_length * hessian)
    }
}

/// Barycentric form: the spring length is the normal component of the
/// difference to the in-face reference point.
#[derive(Debug, Clone)]
pub struct McAdamsCollision {
    mu: Real,
    eps: Real,
}

impl McAdamsCollision {
    pub fn new(mu: Real, eps: Real) -> Self {
        Self { mu, eps }
    }

    /// ψ with the barycentric weights held fixed.
    pub fn psi_with_bary(&self, v: &[Vec3; 4], bary: &Vec3) -> Real {
        let e = vf_edges(v);
        let n = e[2].cross(&e[0]).normalize();

        let xs = bary[0] * v[1] + bary[1] * v[2] + bary[2] * v[3];
        let t = v[0] - xs;
        let spring_length = t.dot(&n) - self.eps;
        self.mu * spring_length * spring_length
    }

    /// Gradient with the barycentric weights held fixed.
    pub fn gradient_with_bary(&self, v: &[Vec3; 4], bary: &Vec3) -> Vec12 {
        let e = vf_edges(v);
        let n = e[2].cross(&e[0]).normalize();

        let xs = bary[0] * v[1] + bary[1] * v[2] + bary[2] * v[3];
        let t = v[0] - xs;
        let spring_length = t.dot(&n) - self.eps;
        2.0 * self.mu * spring_length * Self::spring_length_gradient(v, &e, &n, bary)
    }

    /// Hessian with the barycentric weights held fixed.
    pub fn hessian_with_bary(&self, v: &[Vec3; 4], bary: &Vec3) -> Mat12 {
        let e = vf_edges(v);
        let n = e[2].cross(&e[0]).normalize();

        let xs = bary[0] * v[1] + bary[1] * v[2] + bary[2] * v[3];
        let t = v[0] - xs;
        let spring_length = t.dot(&n) - self.eps;

        let gradient = Self::spring_length_gradient(v, &e, &n, bary);
        let hessian = Self::spring_length_hessian(v, &e, bary);

        2.0 * self.mu * (gradient * gradient.transpose() + spring_length * hessian)
    }

    fn spring_length_gradient(
        v: &[Vec3; 4],
        e: &[Vec3; 3],
        n: &Vec3,
        bary: &Vec3,
    ) -> Vec12 {
        let n_partial = normal_gradient_vf(e);
        let t_partial = t_diff_partial(bary);

        let xs = bary[0] * v[1] + bary[1] * v[2] + bary[2] * v[3];
        let t = v[0] - xs;

        n_partial.transpose() * t + t_partial.transpose() * n
    }

    fn spring_length_hessian(v: &[Vec3; 4], e: &[Vec3; 3], bary: &Vec3) -> Mat12 {
        let xs = bary[0] * v[1] + bary[1] * v[2] + bary[2] * v[3];
        let t = v[0] - xs;

        let t_partial = t_diff_partial(bary);
        let normal_h = normal_hessian_vf(e);
        let contracted = t[0] * normal_h[0] + t[1] * normal_h[1] + t[2] * normal_h[2];

        let n_grad = normal_gradient_vf(e);
        let product = n_grad.transpose() * t_partial;

        contracted + product + product.transpose()
    }
}

impl VertexFaceEnergy for McAdamsCollision {
    fn name(&self) -> &'static str {
        "McAdams Collision"
    }

    fn mu(&self) -> Real {
        self.mu
    }

    fn set_mu(&mut self, mu: Real) {
        self.mu = mu;
    }

    fn eps(&self) -> Real {
        self.eps
    }

    fn set_eps(&mut self, eps: Real) {
        self.eps = eps;
    }

    fn psi(&self, v: &[Vec3; 4]) -> Real {
        self.psi_with_bary(v, &barycentric_coordinates(v))
    }

    fn gradient(&self, v: &[Vec3; 4]) -> Vec12 {
        self.gradient_with_bary(v, &barycentric_coordinates(v))
    }

    fn hessian(&self, v: &[Vec3; 4]) -> Mat12 {
        self.hessian_with_bary(v, &barycentric_coordinates(v))
    }
}

/// The difference-based √-form energy: spring length is the Euclidean
/// distance to the in-face reference point. The production default;
/// a reversal flag handles vertices that have already penetrated.
#[derive(Debug, Clone)]
pub struct VertexFaceSqrtCollision {
    mu: Real,
    eps: Real,

    // divide-by-zero threshold below which the force is zeroed
    inverse_eps: Real,
}

impl VertexFaceSqrtCollision {
    pub fn new(mu: Real, eps: Real) -> Self {
        Self {
            mu,
            eps,
            inverse_eps: 1e-8,
        }
    }

    // has the vertex crossed to the inside of the face plane?
    fn reverse(e: &[Vec3; 3]) -> bool {
        let n = e[2].cross(&e[0]).normalize();
        // e[1] is the collision vertex recentered to the face origin
        n.dot(&e[1]) < 0.0
    }

    /// ψ with the barycentric weights held fixed.
    pub fn psi_with_bary(&self, v: &[Vec3; 4], bary: &Vec3) -> Real {
        let e = vf_edges(v);
        let reversal = Self::reverse(&e);

        let xs = bary[0] * v[1] + bary[1] * v[2] + bary[2] * v[3];
        let t = v[0] - xs;
        let t_magnitude = t.norm();

        let spring_diff = if reversal {
            t_magnitude + self.eps
        } else {
            t_magnitude - self.eps
        };
        self.mu * spring_diff * spring_diff
    }

    /// Gradient with the barycentric weights held fixed.
    pub fn gradient_with_bary(&self, v: &[Vec3; 4], bary: &Vec3) -> Vec12 {
        let e = vf_edges(v);
        let reversal = Self::reverse(&e);

        let xs = bary[0] * v[1] + bary[1] * v[2] + bary[2] * v[3];
        let t = v[0] - xs;
        let t_dot_t = t.dot(&t);
        let t_magnitude = t_dot_t.sqrt();

        // if everything has become undefined, just give up
        if t_magnitude.abs() <= self.inverse_eps || t_dot_t.abs() < self.inverse_eps {
            return Vec12::zeros();
        }

        let spring_diff = if reversal {
            t_magnitude + self.eps
        } else {
            t_magnitude - self.eps
        };
        let t_diff = t_diff_partial(bary);

        2.0 * self.mu * spring_diff * (1.0 / t_magnitude) * (t_diff.transpose() * t)
    }

    /// Hessian with the barycentric weights held fixed.
    pub fn hessian_with_bary(&self, v: &[Vec3; 4], bary: &Vec3) -> Mat12 {
        let e = vf_edges(v);
        let reversal = Self::reverse(&e);

        let xs = bary[0] * v[1] + bary[1] * v[2] + bary[2] * v[3];
        let t = v[0] - xs;
        let t_dot_t = t.dot(&t);
        let t_magnitude = t_dot_t.sqrt();

        if t_magnitude.abs() <= self.inverse_eps || t_dot_t.abs() < self.inverse_eps {
            return Mat12::zeros();
        }

        let spring_diff = if reversal {
            t_magnitude + self.eps
        } else {
            t_magnitude - self.eps
        };
        let t_diff = t_diff_partial(bary);
        let product = t_diff.transpose() * t;

        2.0 * self.mu
            * ((1.0 / t_dot_t - spring_diff / (t_dot_t * t_magnitude))
                * (product * product.transpose())
                + (spring_diff / t_magnitude) * (t_diff.transpose() * t_diff))
    }
}

impl VertexFaceEnergy for VertexFaceSqrtCollision {
    fn name(&self) -> &'static str {
        "Vertex-Face Sqrt Collision"
    }

    fn mu(&self) -> Real {
        self.mu
    }

    fn set_mu(&mut self, mu: Real) {
        self.mu = mu;
    }

    fn eps(&self) -> Real {
        self.eps
    }

    fn set_eps(&mut self, eps: Real) {
        self.eps = eps;
    }

    fn psi(&self, v: &[Vec3; 4]) -> Real {
        self.psi_with_bary(v, &barycentric_coordinates(v))
    }

    fn gradient(&self, v: &[Vec3; 4]) -> Vec12 {
        self.gradient_with_bary(v, &barycentric_coordinates(v))
    }

    fn hessian(&self, v: &[Vec3; 4]) -> Mat12 {
        self.hessian_with_bary(v, &barycentric_coordinates(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::kernels::{flatten_vertices, unflatten_vertices};
    use crate::math::eigen::min_eigenvalue12;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    // a vertex hovering near a well-shaped triangle, face reversed as the
    // collision pipeline packs it
    fn separated_pair(rng: &mut StdRng) -> [Vec3; 4] {
        let jitter = |rng: &mut StdRng| rng.gen_range(-0.05..0.05);
        [
            Vec3::new(
                0.3 + jitter(rng),
                0.3 + jitter(rng),
                0.4 + rng.gen_range(0.0..0.1),
            ),
            Vec3::new(0.0, 1.0, jitter(rng)),
            Vec3::new(1.0, 0.0, jitter(rng)),
            Vec3::new(0.0, 0.0, jitter(rng)),
        ]
    }

    fn check_gradient(energy: &dyn VertexFaceEnergy, v: &[Vec3; 4]) {
        let gradient = energy.gradient(v);
        let scale = 1.0 + gradient.norm();
        let h = 1e-5;
        let mut x = flatten_vertices(v);
        for i in 0..12 {
            let original = x[i];
            x[i] = original + h;
            let psi_plus = energy.psi(&unflatten_vertices(&x));
            x[i] = original - h;
            let psi_minus = energy.psi(&unflatten_vertices(&x));
            x[i] = original;

            let fd = (psi_plus - psi_minus) / (2.0 * h);
            assert!(
                (gradient[i] - fd).abs() < 1e-4 * scale,
                "{} gradient[{}]: {} vs {}",
                energy.name(),
                i,
                gradient[i],
                fd
            );
        }
    }

    fn check_hessian(energy: &dyn VertexFaceEnergy, v: &[Vec3; 4]) {
        let hessian = energy.hessian(v);
        let scale = 1.0 + hessian.norm();
        let h = 1e-5;
        let mut x = flatten_vertices(v);
        for j in 0..12 {
            let original = x[j];
            x[j] = original + h;
            let grad_plus = energy.gradient(&unflatten_vertices(&x));
            x[j] = original - h;
            let grad_minus = energy.gradient(&unflatten_vertices(&x));
            x[j] = original;

            let fd = (grad_plus - grad_minus) / (2.0 * h);
            for i in 0..12 {
                assert!(
                    (hessian[(i, j)] - fd[i]).abs() < 1e-3 * scale,
                    "{} H({}, {})",
                    energy.name(),
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn cross_product_energy_derivatives() {
        let mut rng = StdRng::seed_from_u64(81);
        let energy = VertexFaceCollision::new(1000.0, 0.01);
        for _ in 0..5 {
            let v = separated_pair(&mut rng);
            check_gradient(&energy, &v);
            check_hessian(&energy, &v);
        }
    }

    #[test]
    fn mcadams_energy_derivatives() {
        let mut rng = StdRng::seed_from_u64(82);
        let energy = McAdamsCollision::new(1000.0, 0.01);
        for _ in 0..5 {
            let v = separated_pair(&mut rng);
            check_gradient(&energy, &v);

            // the Hessian holds the barycentric weights fixed, so the
            // finite-difference probe must as well
            let bary = barycentric_coordinates(&v);
            let hessian = energy.hessian_with_bary(&v, &bary);
            let scale = 1.0 + hessian.norm();
            let h = 1e-5;
            let mut x = flatten_vertices(&v);
            for j in 0..12 {
                let original = x[j];
                x[j] = original + h;
                let grad_plus = energy.gradient_with_bary(&unflatten_vertices(&x), &bary);
                x[j] = original - h;
                let grad_minus = energy.gradient_with_bary(&unflatten_vertices(&x), &bary);
                x[j] = original;

                let fd = (grad_plus - grad_minus) / (2.0 * h);
                for i in 0..12 {
                    assert!((hessian[(i, j)] - fd[i]).abs() < 1e-3 * scale);
                }
            }
        }
    }

    #[test]
    fn sqrt_energy_derivatives() {
        let mut rng = StdRng::seed_from_u64(83);
        let energy = VertexFaceSqrtCollision::new(1000.0, 0.01);
        for _ in 0..5 {
            let v = separated_pair(&mut rng);
            check_gradient(&energy, &v);

            let bary = barycentric_coordinates(&v);
            let hessian = energy.hessian_with_bary(&v, &bary);
            let scale = 1.0 + hessian.norm();
            let h = 1e-5;
            let mut x = flatten_vertices(&v);
            for j in 0..12 {
                let original = x[j];
                x[j] = original + h;
                let grad_plus = energy.gradient_with_bary(&unflatten_vertices(&x), &bary);
                x[j] = original - h;
                let grad_minus = energy.gradient_with_bary(&unflatten_vertices(&x), &bary);
                x[j] = original;

                let fd = (grad_plus - grad_minus) / (2.0 * h);
                for i in 0..12 {
                    assert!((hessian[(i, j)] - fd[i]).abs() < 1e-3 * scale);
                }
            }
        }
    }

    #[test]
    fn clamped_hessians_are_psd() {
        let mut rng = StdRng::seed_from_u64(84);
        let cross = VertexFaceCollision::new(1000.0, 0.01);
        let sqrt = VertexFaceSqrtCollision::new(1000.0, 0.01);
        for _ in 0..5 {
            let v = separated_pair(&mut rng);
            assert!(min_eigenvalue12(&cross.clamped_hessian(&v)) >= -1e-8);
            assert!(min_eigenvalue12(&sqrt.clamped_hessian(&v)) >= -1e-8);
        }
    }

    #[test]
    fn gradient_pushes_vertex_outward() {
        // the face is wound in reverse, so its geometric normal points away
        // from the vertex side; a vertex within eps of the plane must be
        // pushed further out along the outward direction
        let v = [
            Vec3::new(0.25, 0.25, 0.005),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
        ];
        let e = vf_edges(&v);
        let n = e[2].cross(&e[0]).normalize();

        let energy = VertexFaceSqrtCollision::new(1000.0, 0.01);
        let gradient = energy.gradient(&v);
        let vertex_component = Vec3::new(gradient[0], gradient[1], gradient[2]);

        // psi grows as the vertex approaches, so the gradient points against
        // the outward normal and the force (its negative) pushes out
        assert!(vertex_component.dot(&n) < 0.0);
    }
}
