//! Edge-edge contact energies.
//!
//! Each variant evaluates over the packed four vertices of two edges plus
//! the interpolation coordinates of the closest points along each edge, and
//! exposes a negated dual used when the adjacent faces already
//! interpenetrate so the force pushes the other way.

use super::kernels::{ee_edges, normal_gradient_ee, normal_hessian_ee, v_diff_partial};
use crate::math::eigen::clamp_eigenvalues12;
use crate::math::{Mat12, Real, Vec2, Vec3, Vec12};

/// Contract shared by the edge-edge contact energies.
pub trait EdgeEdgeEnergy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Collision stiffness
    fn mu(&self) -> Real;
    fn set_mu(&mut self, mu: Real);

    /// Collision epsilon -- how far apart should we push things?
    fn eps(&self) -> Real;
    fn set_eps(&mut self, eps: Real);

    /// Contact energy
    fn psi(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Real;

    /// Negated energy, used once the neighbouring faces interpenetrate
    fn psi_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Real;

    /// Gradient of psi; the force is its negative
    fn gradient(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Vec12;
    fn gradient_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Vec12;

    fn hessian(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Mat12;
    fn hessian_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Mat12;

    fn clamped_hessian(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Mat12 {
        clamp_eigenvalues12(&self.hessian(v, a, b))
    }

    fn clamped_hessian_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Mat12 {
        clamp_eigenvalues12(&self.hessian_negated(v, a, b))
    }
}

fn interpolated_diff(v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Vec3 {
    let va = a[0] * v[0] + a[1] * v[1];
    let vb = b[0] * v[2] + b[1] * v[3];
    vb - va
}

/// Cross-product form: the repulsion direction is the mutual normal of the
/// two edges, which stays well defined as the closest points meet.
#[derive(Debug, Clone)]
pub struct EdgeCollision {
    mu: Real,
    eps: Real,
}

impl EdgeCollision {
    pub fn new(mu: Real, eps: Real) -> Self {
        Self { mu, eps }
    }

    // conditioning of the force goes haywire near parallel, and Harmon et
    // al. argue a vertex-face pair picks up the slack there anyway
    fn nearly_parallel(e: &[Vec3; 2]) -> bool {
        let e0 = e[0].normalize();
        let e1 = e[1].normalize();
        e0.dot(&e1).abs() > 1.0 - 1e-2
    }

    fn unit_normal(e: &[Vec3; 2]) -> Vec3 {
        let n = e[1].cross(&e[0]);
        // colinear edges skip the normalization
        if n.norm() > 1e-8 {
            n / n.norm()
        } else {
            n
        }
    }

    fn spring_length_gradient(
        e: &[Vec3; 2],
        n: &Vec3,
        diff: &Vec3,
        a: &Vec2,
        b: &Vec2,
    ) -> Vec12 {
        let n_partial = normal_gradient_ee(e);
        let t_partial = v_diff_partial(a, b);
        let sign = if diff.dot(n) > 0.0 { -1.0 } else { 1.0 };
        sign * (n_partial.transpose() * diff) + t_partial.transpose() * (sign * n)
    }

    fn spring_length_hessian(
        e: &[Vec3; 2],
        n: &Vec3,
        diff: &Vec3,
        a: &Vec2,
        b: &Vec2,
    ) -> Mat12 {
        let t_partial = v_diff_partial(a, b);
        let sign = if diff.dot(n) > 0.0 { -1.0 } else { 1.0 };

        let normal_h = normal_hessian_ee(e);
        let contracted =
            sign * (diff[0] * normal_h[0] + diff[1] * normal_h[1] + diff[2] * normal_h[2]);

        let n_grad = sign * normal_gradient_ee(e);
        let product = n_grad.transpose() * t_partial;

        contracted + product + product.transpose()
    }
}

impl EdgeEdgeEnergy for EdgeCollision {
    fn name(&self) -> &'static str {
        "Edge Collision"
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

    fn psi(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Real {
        let e = ee_edges(v);
        let n = Self::unit_normal(&e);
        let diff = interpolated_diff(v, a, b);

        let sign = if diff.dot(&n) > 0.0 { -1.0 } else { 1.0 };
        let spring_length = self.eps + diff.dot(&(sign * n));
        self.mu * spring_length * spring_length
    }

    fn psi_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Real {
        let e = ee_edges(v);
        if Self::nearly_parallel(&e) {
            return 0.0;
        }

        let n = Self::unit_normal(&e);
        let diff = interpolated_diff(v, a, b);

        let sign = if diff.dot(&n) > 0.0 { -1.0 } else { 1.0 };
        let spring_length = self.eps - diff.dot(&(sign * n));
        self.mu * spring_length * spring_length
    }

    fn gradient(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Vec12 {
        let e = ee_edges(v);
        if Self::nearly_parallel(&e) {
            return Vec12::zeros();
        }

        let n = Self::unit_normal(&e);
        let diff = interpolated_diff(v, a, b);

        let sign = if diff.dot(&n) > 0.0 { -1.0 } else { 1.0 };
        let spring_length = self.eps + diff.dot(&(sign * n));
        2.0 * self.mu * spring_length * Self::spring_length_gradient(&e, &n, &diff, a, b)
    }

    fn gradient_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Vec12 {
        let e = ee_edges(v);
        if Self::nearly_parallel(&e) {
            return Vec12::zeros();
        }

        let n = Self::unit_normal(&e);
        let diff = interpolated_diff(v, a, b);

        let sign = if diff.dot(&n) > 0.0 { -1.0 } else { 1.0 };
        let spring_length = self.eps - diff.dot(&(sign * n));
        -2.0 * self.mu * spring_length * Self::spring_length_gradient(&e, &n, &diff, a, b)
    }

    fn hessian(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Mat12 {
        let e = ee_edges(v);
        if Self::nearly_parallel(&e) {
            return Mat12::zeros();
        }

        let n = Self::unit_normal(&e);
        let diff = interpolated_diff(v, a, b);

        let sign = if diff.dot(&n) > 0.0 { -1.0 } else { 1.0 };
        let spring_length = self.eps + diff.dot(&(sign * n));
        let gradient = Self::spring_length_gradient(&e, &n, &diff, a, b);
        let hessian = Self::spring_length_hessian(&e, &n, &diff, a, b);

        2.0 * self.mu * (gradient * gradient.transpose() + spring_length * hessian)
    }

    fn hessian_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Mat12 {
        let e = ee_edges(v);
        if Self::nearly_parallel(&e) {
            return Mat12::zeros();
        }

        let n = Self::unit_normal(&e);
        let diff = interpolated_diff(v, a, b);

        let sign = if diff.dot(&n) > 0.0 { -1.0 } else { 1.0 };
        let spring_length = self.eps - diff.dot(&(sign * n));
        let gradient = Self::spring_length_gradient(&e, &n, &diff, a, b);
        let hessian = Self::spring_length_hessian(&e, &n, &diff, a, b);

        -2.0 * self.mu * (spring_length * hessian - gradient * gradient.transpose())
    }
}

/// The √-form energy over the distance between the interpolated closest
/// points. The production default.
#[derive(Debug, Clone)]
pub struct EdgeSqrtCollision {
    mu: Real,
    eps: Real,

    // distances below this short-circuit to zero
    too_small: Real,
}

impl EdgeSqrtCollision {
    pub fn new(mu: Real, eps: Real) -> Self {
        Self {
            mu,
            eps,
            too_small: 1e-7,
        }
    }
}

impl EdgeEdgeEnergy for EdgeSqrtCollision {
    fn name(&self) -> &'static str {
        "Edge Sqrt Collision"
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

    fn psi(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Real {
        let diff = interpolated_diff(v, a, b);
        if diff.norm() < self.too_small {
            return 0.0;
        }

        let spring_length = self.eps - diff.norm();
        self.mu * spring_length * spring_length
    }

    fn psi_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Real {
        let diff = interpolated_diff(v, a, b);
        if diff.norm() < self.too_small {
            return 0.0;
        }

        let spring_length = self.eps + diff.norm();
        self.mu * spring_length * spring_length
    }

    fn gradient(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Vec12 {
        let diff = interpolated_diff(v, a, b);

        // co-linear closest points; the hybrid energy falls back to the
        // cross-product form here
        if diff.norm() < self.too_small {
            return Vec12::zeros();
        }

        let d = diff / diff.norm();
        let spring_length = self.eps - diff.norm();
        -2.0 * self.mu * spring_length * (v_diff_partial(a, b).transpose() * d)
    }

    fn gradient_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Vec12 {
        let diff = interpolated_diff(v, a, b);
        if diff.norm() < self.too_small {
            return Vec12::zeros();
        }

        let d = diff / diff.norm();
        let spring_length = self.eps + diff.norm();
        2.0 * self.mu * spring_length * (v_diff_partial(a, b).transpose() * d)
    }

    fn hessian(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Mat12 {
        let diff = interpolated_diff(v, a, b);
        let diff_norm = diff.norm();
        if diff_norm < self.too_small {
            return Mat12::zeros();
        }

        let d = diff / diff_norm;
        let v_partial = v_diff_partial(a, b);
        let inv_norm = if diff_norm >= 1e-8 { 1.0 / diff_norm } else { 1.0 };
        let inv_norm3 = inv_norm * inv_norm * inv_norm;

        let norm_partial = -inv_norm * (v_partial.transpose() * diff);
        let d_grad = inv_norm * v_partial
            - inv_norm3 * diff * (v_partial.transpose() * diff).transpose();

        -2.0 * self.mu
            * ((self.eps - diff_norm) * (v_partial.transpose() * d_grad)
                + norm_partial * (v_partial.transpose() * d).transpose())
    }

    fn hessian_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Mat12 {
        let diff = interpolated_diff(v, a, b);
        let diff_norm = diff.norm();
        if diff_norm < self.too_small {
            return Mat12::zeros();
        }
        let diff_norm3 = diff_norm * diff_norm * diff_norm;

        let n = diff / diff_norm;
        let v_partial = v_diff_partial(a, b);
        let norm_partial = (-1.0 / diff_norm) * (v_partial.transpose() * diff);

        let n_grad = (1.0 / diff_norm) * v_partial
            - (1.0 / diff_norm3) * diff * (v_partial.transpose() * diff).transpose();

        // the energetically consistent form
        2.0 * self.mu
            * ((self.eps + diff_norm) * (v_partial.transpose() * n_grad)
                - norm_partial * (v_partial.transpose() * n).transpose())
    }
}

/// Barycentric √ form with a cross-product fall-back: when the repulsion
/// direction collapses below a separation epsilon the magnitude of the
/// cross-product form stays well defined.
#[derive(Debug, Clone)]
pub struct EdgeHybridCollision {
    cross: EdgeCollision,
    sqrt: EdgeSqrtCollision,

    // can't set this too small: once the threshold is hit, a huge force can
    // get injected because the normalization went haywire
    separation_eps: Real,
}

impl EdgeHybridCollision {
    pub fn new(mu: Real, eps: Real) -> Self {
        Self {
            cross: EdgeCollision::new(mu, eps),
            sqrt: EdgeSqrtCollision::new(mu, eps),
            separation_eps: 1e-4,
        }
    }

    fn punt_to_cross_product(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> bool {
        interpolated_diff(v, a, b).norm() < self.separation_eps
    }
}

impl EdgeEdgeEnergy for EdgeHybridCollision {
    fn name(&self) -> &'static str {
        "Edge Hybrid Collision"
    }

    fn mu(&self) -> Real {
        self.sqrt.mu()
    }

    fn set_mu(&mut self, mu: Real) {
        self.cross.set_mu(mu);
        self.sqrt.set_mu(mu);
    }

    fn eps(&self) -> Real {
        self.sqrt.eps()
    }

    fn set_eps(&mut self, eps: Real) {
        self.cross.set_eps(eps);
        self.sqrt.set_eps(eps);
    }

    fn psi(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Real {
        if self.punt_to_cross_product(v, a, b) {
            return self.cross.psi(v, a, b);
        }
        self.sqrt.psi(v, a, b)
    }

    fn psi_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Real {
        if self.punt_to_cross_product(v, a, b) {
            return self.cross.psi_negated(v, a, b);
        }
        self.sqrt.psi_negated(v, a, b)
    }

    fn gradient(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Vec12 {
        if self.punt_to_cross_product(v, a, b) {
            return self.cross.gradient(v, a, b);
        }
        self.sqrt.gradient(v, a, b)
    }

    fn gradient_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Vec12 {
        if self.punt_to_cross_product(v, a, b) {
            return self.cross.gradient_negated(v, a, b);
        }
        self.sqrt.gradient_negated(v, a, b)
    }

    fn hessian(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Mat12 {
        if self.punt_to_cross_product(v, a, b) {
            return self.cross.hessian(v, a, b);
        }
        self.sqrt.hessian(v, a, b)
    }

    fn hessian_negated(&self, v: &[Vec3; 4], a: &Vec2, b: &Vec2) -> Mat12 {
        if self.punt_to_cross_product(v, a, b) {
            return self.cross.hessian_negated(v, a, b);
        }
        self.sqrt.hessian_negated(v, a, b)
    }
}
