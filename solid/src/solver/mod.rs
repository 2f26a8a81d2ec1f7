//! The implicit velocity-level integrator and its constraint machinery.

mod backward_euler;
mod pcg;

pub use backward_euler::{BackwardEulerVelocity, ShapeId, SolverConfig};
pub use pcg::{solve_projected, PcgSummary};

use crate::math::{DVec, Mat3, Vec3};

/// Pin a vertex to a local coordinate of a kinematic shape.
#[derive(Debug, Clone)]
pub struct KinematicConstraint {
    pub shape: ShapeId,
    pub vertex: usize,
    pub local_position: Vec3,
}

/// Constrain a vertex to a kinematic surface; it may still slide
/// tangentially.
#[derive(Debug, Clone)]
pub struct PlaneConstraint {
    pub shape: ShapeId,
    pub vertex: usize,
    pub local_closest_point: Vec3,
    pub local_normal: Vec3,

    // was the body lifting away from the surface at the end of the last
    // step? If so the next constraint pass deletes this entry.
    pub is_separating: bool,
}

/// The block-diagonal filter S: identity everywhere except constrained
/// vertices, where the block is I − nnᵀ (plane) or zero (pin).
#[derive(Debug, Clone)]
pub struct ConstraintFilter {
    blocks: Vec<Option<Mat3>>,
}

impl ConstraintFilter {
    pub fn identity(total_vertices: usize) -> Self {
        Self {
            blocks: vec![None; total_vertices],
        }
    }

    pub fn clear(&mut self) {
        self.blocks.fill(None);
    }

    pub fn total_vertices(&self) -> usize {
        self.blocks.len()
    }

    /// The 3×3 block at a vertex, identity when unconstrained.
    pub fn block(&self, vertex: usize) -> Mat3 {
        self.blocks[vertex].unwrap_or_else(Mat3::identity)
    }

    pub fn is_constrained(&self, vertex: usize) -> bool {
        self.blocks[vertex].is_some()
    }

    /// Project out the component along a world normal at a vertex.
    pub fn set_plane(&mut self, vertex: usize, normal: &Vec3) {
        let n = normal.normalize();
        self.blocks[vertex] = Some(Mat3::identity() - n * n.transpose());
    }

    /// Zero out every direction at a vertex (a kinematic pin). Overrides
    /// any plane block, so pins are applied last.
    pub fn set_zero(&mut self, vertex: usize) {
        self.blocks[vertex] = Some(Mat3::zeros());
    }

    /// y = S x.
    pub fn apply(&self, x: &DVec) -> DVec {
        debug_assert_eq!(x.len(), 3 * self.blocks.len());
        let mut y = x.clone();
        for (vertex, block) in self.blocks.iter().enumerate() {
            if let Some(block) = block {
                let v = Vec3::new(x[3 * vertex], x[3 * vertex + 1], x[3 * vertex + 2]);
                let filtered = block * v;
                y[3 * vertex] = filtered[0];
                y[3 * vertex + 1] = filtered[1];
                y[3 * vertex + 2] = filtered[2];
            }
        }
        y
    }

    /// y = (I − S) x, the complement S̄.
    pub fn apply_complement(&self, x: &DVec) -> DVec {
        debug_assert_eq!(x.len(), 3 * self.blocks.len());
        let mut y = DVec::zeros(x.len());
        for (vertex, block) in self.blocks.iter().enumerate() {
            if let Some(block) = block {
                let v = Vec3::new(x[3 * vertex], x[3 * vertex + 1], x[3 * vertex + 2]);
                let complement = v - block * v;
                y[3 * vertex] = complement[0];
                y[3 * vertex + 1] = complement[1];
                y[3 * vertex + 2] = complement[2];
            }
        }
        y
    }
}

#[cfg(test)]
mod filter_tests {
    use super::*;

    #[test]
    fn plane_block_removes_the_normal_component() {
        let mut filter = ConstraintFilter::identity(2);
        filter.set_plane(1, &Vec3::new(0.0, 1.0, 0.0));

        let x = DVec::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let filtered = filter.apply(&x);

        // vertex 0 untouched, vertex 1 loses its y component
        assert_eq!(filtered[0], 1.0);
        assert_eq!(filtered[1], 2.0);
        assert_eq!(filtered[4], 0.0);
        assert_eq!(filtered[3], 4.0);
        assert_eq!(filtered[5], 6.0);

        // S + (I - S) reassembles the input
        let complement = filter.apply_complement(&x);
        assert!((filtered + complement - x).norm() < 1e-14);
    }

    #[test]
    fn pin_block_zeroes_everything() {
        let mut filter = ConstraintFilter::identity(1);
        filter.set_plane(0, &Vec3::new(1.0, 0.0, 0.0));
        filter.set_zero(0);

        let x = DVec::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(filter.apply(&x).norm() < 1e-14);
        assert!((filter.apply_complement(&x) - x).norm() < 1e-14);
    }
}
