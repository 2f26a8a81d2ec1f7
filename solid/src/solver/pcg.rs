//! Projected, Jacobi-preconditioned conjugate gradient.
//!
//! Solves (S A S + S̄) y = rhs without ever forming the projected matrix:
//! the operator applies the per-vertex filter blocks around the sparse
//! mat-vec, and the preconditioner reads the diagonal of the projected
//! system straight from the filter blocks and A's diagonal blocks.

use super::ConstraintFilter;
use crate::math::sparse::SparseMatrix;
use crate::math::{DVec, Mat3, Real};

/// What the iteration did; the caller decides whether to care.
#[derive(Debug, Clone, Copy)]
pub struct PcgSummary {
    pub iterations: usize,
    pub residual: Real,
    pub converged: bool,
}

fn apply_operator(a: &SparseMatrix, filter: &ConstraintFilter, x: &DVec) -> DVec {
    let sx = filter.apply(x);
    let asx = a.mul_vec(&sx);
    filter.apply(&asx) + filter.apply_complement(x)
}

// diagonal of S A S + (I - S), one 3x3 block per vertex
fn preconditioner_diagonal(a: &SparseMatrix, filter: &ConstraintFilter) -> DVec {
    let total_vertices = filter.total_vertices();
    let mut diagonal = DVec::zeros(3 * total_vertices);
    for vertex in 0..total_vertices {
        if filter.is_constrained(vertex) {
            let s = filter.block(vertex);
            let block = s * a.diagonal_block(vertex) * s + (Mat3::identity() - s);
            for k in 0..3 {
                diagonal[3 * vertex + k] = block[(k, k)];
            }
        } else {
            for k in 0..3 {
                diagonal[3 * vertex + k] = a.get(3 * vertex + k, 3 * vertex + k);
            }
        }
    }

    // fall back to unpreconditioned where the diagonal is unusable
    for value in diagonal.iter_mut() {
        if *value <= 0.0 || !value.is_finite() {
            *value = 1.0;
        }
    }
    diagonal
}

/// Solve (S A S + S̄) y = rhs.
pub fn solve_projected(
    a: &SparseMatrix,
    filter: &ConstraintFilter,
    rhs: &DVec,
    tolerance: Real,
    max_iterations: usize,
) -> (DVec, PcgSummary) {
    let rhs_norm = rhs.norm();
    if rhs_norm == 0.0 {
        return (
            DVec::zeros(rhs.len()),
            PcgSummary {
                iterations: 0,
                residual: 0.0,
                converged: true,
            },
        );
    }

    let inv_diagonal = preconditioner_diagonal(a, filter).map(|d| 1.0 / d);

    let mut x = DVec::zeros(rhs.len());
    let mut r = rhs.clone();
    let mut z = r.component_mul(&inv_diagonal);
    let mut p = z.clone();
    let mut r_dot_z = r.dot(&z);

    let mut iterations = 0;
    let mut residual = 1.0;
    while iterations < max_iterations {
        let q = apply_operator(a, filter, &p);
        let p_dot_q = p.dot(&q);
        if p_dot_q.abs() < Real::MIN_POSITIVE {
            break;
        }

        let alpha = r_dot_z / p_dot_q;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &q, 1.0);
        iterations += 1;

        residual = r.norm() / rhs_norm;
        if residual < tolerance {
            break;
        }

        z = r.component_mul(&inv_diagonal);
        let r_dot_z_next = r.dot(&z);
        let beta = r_dot_z_next / r_dot_z;
        r_dot_z = r_dot_z_next;
        p = z + beta * &p;
    }

    let converged = residual < tolerance;
    (
        x,
        PcgSummary {
            iterations,
            residual,
            converged,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    fn spd_system() -> (SparseMatrix, DVec) {
        // a diagonally dominant 6x6 system
        let mut triplets = Vec::new();
        for i in 0..6usize {
            triplets.push((i, i, 4.0 + i as Real));
            if i + 1 < 6 {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -1.0));
            }
        }
        let a = SparseMatrix::from_triplets(6, &triplets);
        let b = DVec::from_vec(vec![1.0, -2.0, 3.0, 0.5, -1.5, 2.0]);
        (a, b)
    }

    #[test]
    fn solves_an_unconstrained_system() {
        let (a, b) = spd_system();
        let filter = ConstraintFilter::identity(2);

        let (x, summary) = solve_projected(&a, &filter, &b, 1e-10, 100);
        assert!(summary.converged);
        assert!((a.mul_vec(&x) - b).norm() < 1e-8);
    }

    #[test]
    fn respects_a_pinned_vertex() {
        let (a, b) = spd_system();
        let mut filter = ConstraintFilter::identity(2);
        filter.set_zero(0);

        let rhs = filter.apply(&b);
        let (x, summary) = solve_projected(&a, &filter, &rhs, 1e-10, 100);
        assert!(summary.converged);

        // the pinned block solves to zero
        assert!(x[0].abs() < 1e-10);
        assert!(x[1].abs() < 1e-10);
        assert!(x[2].abs() < 1e-10);
    }

    #[test]
    fn respects_a_plane_constraint() {
        let (a, b) = spd_system();
        let normal = Vec3::new(0.0, 1.0, 0.0);
        let mut filter = ConstraintFilter::identity(2);
        filter.set_plane(1, &normal);

        let rhs = filter.apply(&b);
        let (x, summary) = solve_projected(&a, &filter, &rhs, 1e-10, 100);
        assert!(summary.converged);

        // no motion along the constrained normal
        assert!(x[4].abs() < 1e-10);
    }

    #[test]
    fn zero_rhs_returns_immediately() {
        let (a, _) = spd_system();
        let filter = ConstraintFilter::identity(2);
        let (x, summary) = solve_projected(&a, &filter, &DVec::zeros(6), 1e-10, 100);
        assert_eq!(summary.iterations, 0);
        assert!(x.norm() == 0.0);
    }
}
