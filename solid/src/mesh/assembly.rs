//! Scatter-assembly of per-tet forces and sparse Hessians.
//!
//! The global Hessian's sparsity is fixed by the tet adjacency, so the
//! constructor tabulates, for every non-zero entry, the (tet, row, col)
//! lookups whose sum lands there. Recomputation then becomes a parallel
//! loop over non-zeros. Collision Hessians change pattern every step and
//! go through plain triplets instead.

use super::TetMesh;
use crate::materials::{Damping, Hyperelastic};
use crate::math::sparse::SparseMatrix;
use crate::math::{flatten, DVec, Mat3, Mat9x12, Mat12, Real, Vec12, Vec3};
use rayon::prelude::*;

/// One (tet, row, col) lookup contributing to a non-zero entry.
#[derive(Debug, Clone, Copy)]
pub struct HessianGather {
    pub tet: u32,
    pub row: u8,
    pub col: u8,
}

/// Change-of-basis from the deformation gradient F to vertex positions x
/// for a single tet (the 9×12 ∂F/∂x built from Dm⁻¹).
pub(crate) fn compute_pfpx(dm_inv: &Mat3) -> Mat9x12 {
    let m = dm_inv[(0, 0)];
    let n = dm_inv[(0, 1)];
    let o = dm_inv[(0, 2)];
    let p = dm_inv[(1, 0)];
    let q = dm_inv[(1, 1)];
    let r = dm_inv[(1, 2)];
    let s = dm_inv[(2, 0)];
    let t = dm_inv[(2, 1)];
    let u = dm_inv[(2, 2)];

    let t1 = -m - p - s;
    let t2 = -n - q - t;
    let t3 = -o - r - u;

    let mut pfpx = Mat9x12::zeros();
    for i in 0..3 {
        pfpx[(i, i)] = t1;
        pfpx[(i, 3 + i)] = m;
        pfpx[(i, 6 + i)] = p;
        pfpx[(i, 9 + i)] = s;

        pfpx[(3 + i, i)] = t2;
        pfpx[(3 + i, 3 + i)] = n;
        pfpx[(3 + i, 6 + i)] = q;
        pfpx[(3 + i, 9 + i)] = t;

        pfpx[(6 + i, i)] = t3;
        pfpx[(6 + i, 3 + i)] = o;
        pfpx[(6 + i, 6 + i)] = r;
        pfpx[(6 + i, 9 + i)] = u;
    }
    pfpx
}

/// Bake the tet-adjacency sparsity and its compressed-index gather tables.
pub(crate) fn build_sparsity(
    total_vertices: usize,
    tets: &[[usize; 4]],
) -> (SparseMatrix, Vec<Vec<HessianGather>>) {
    let dofs = 3 * total_vertices;

    let mut triplets = Vec::with_capacity(144 * tets.len());
    for tet in tets {
        for &y_vertex in tet {
            for &x_vertex in tet {
                for b in 0..3 {
                    for a in 0..3 {
                        triplets.push((3 * x_vertex + a, 3 * y_vertex + b, 0.0));
                    }
                }
            }
        }
    }
    let pattern = SparseMatrix::from_triplets(dofs, &triplets);

    let mut gathers: Vec<Vec<HessianGather>> = vec![Vec::new(); pattern.nnz()];
    for (i, tet) in tets.iter().enumerate() {
        for (y, &y_vertex) in tet.iter().enumerate() {
            for (x, &x_vertex) in tet.iter().enumerate() {
                for b in 0..3 {
                    for a in 0..3 {
                        let index = pattern
                            .entry_index(3 * x_vertex + a, 3 * y_vertex + b)
                            .expect("baked sparsity covers every tet entry");
                        gathers[index].push(HessianGather {
                            tet: i as u32,
                            row: (3 * x + a) as u8,
                            col: (3 * y + b) as u8,
                        });
                    }
                }
            }
        }
    }

    (pattern, gathers)
}

// scatter-add one packed 12-vector into the global force vector
fn scatter_force(forces: &mut DVec, indices: &[usize; 4], element: &Vec12) {
    for x in 0..4 {
        let index = 3 * indices[x];
        forces[index] += element[3 * x];
        forces[index + 1] += element[3 * x + 1];
        forces[index + 2] += element[3 * x + 2];
    }
}

// triplets of one 12×12 block scattered to four vertex indices
fn push_block_triplets(
    triplets: &mut Vec<(usize, usize, Real)>,
    indices: &[usize; 4],
    h: &Mat12,
) {
    for y in 0..4 {
        let y_vertex = indices[y];
        for x in 0..4 {
            let x_vertex = indices[x];
            for b in 0..3 {
                for a in 0..3 {
                    triplets.push((
                        3 * x_vertex + a,
                        3 * y_vertex + b,
                        h[(3 * x + a, 3 * y + b)],
                    ));
                }
            }
        }
    }
}

impl TetMesh {
    /// Total strain energy at the current deformation.
    pub fn hyperelastic_energy(&self, material: &dyn Hyperelastic) -> Real {
        if material.energy_needs_svd() {
            debug_assert!(self.svds_computed);
            return (0..self.tets.len())
                .map(|i| {
                    self.rest_tet_volumes[i]
                        * material.psi_svd(&self.us[i], &self.sigmas[i], &self.vs[i])
                })
                .sum();
        }
        (0..self.tets.len())
            .map(|i| self.rest_tet_volumes[i] * material.psi(&self.fs[i]))
            .sum()
    }

    /// Elastic and damping forces together: the parallel per-element
    /// produce phase, then a serialised scatter.
    pub fn internal_forces(
        &self,
        material: &dyn Hyperelastic,
        damping: Option<&dyn Damping>,
    ) -> DVec {
        if material.pk1_needs_svd() {
            debug_assert!(self.svds_computed);
        }

        let per_element: Vec<Vec12> = (0..self.tets.len())
            .into_par_iter()
            .map(|i| {
                let mut pk1 = if material.pk1_needs_svd() {
                    material.pk1_svd(&self.us[i], &self.sigmas[i], &self.vs[i])
                } else {
                    material.pk1(&self.fs[i])
                };
                if let Some(damping) = damping {
                    pk1 += damping.pk1(&self.fs[i], &self.fdots[i]);
                }
                let force_density = self.pfpxs[i].transpose() * flatten(&pk1);
                -self.rest_tet_volumes[i] * force_density
            })
            .collect();

        let mut forces = DVec::zeros(self.dofs());
        for (i, element) in per_element.iter().enumerate() {
            scatter_force(&mut forces, &self.tets[i], element);
        }
        forces
    }

    /// Purely elastic forces.
    pub fn hyperelastic_forces(&self, material: &dyn Hyperelastic) -> DVec {
        self.internal_forces(material, None)
    }

    /// Assemble the PSD-clamped elastic Hessian over the fixed pattern by
    /// the compressed-index gather.
    pub fn hyperelastic_clamped_hessian(&mut self, material: &dyn Hyperelastic) -> SparseMatrix {
        assert!(self.svds_computed);

        let us = &self.us;
        let sigmas = &self.sigmas;
        let vs = &self.vs;
        let pfpxs = &self.pfpxs;
        let volumes = &self.rest_tet_volumes;
        self.per_element_hessians
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, h)| {
                let hessian =
                    material.clamped_hessian_svd(&us[i], &sigmas[i], &vs[i]) * (-volumes[i]);
                *h = pfpxs[i].transpose() * hessian * pfpxs[i];
            });

        self.gather_per_element_hessians();
        self.stiffness.clone()
    }

    /// Assemble the damping (velocity) Hessian over the fixed pattern.
    pub fn damping_hessian(&mut self, damping: &dyn Damping) -> SparseMatrix {
        let fs = &self.fs;
        let fdots = &self.fdots;
        let pfpxs = &self.pfpxs;
        let volumes = &self.rest_tet_volumes;
        self.per_element_hessians
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, h)| {
                let hessian = damping.hessian(&fs[i], &fdots[i]) * (-volumes[i]);
                *h = pfpxs[i].transpose() * hessian * pfpxs[i];
            });

        self.gather_per_element_hessians();
        self.stiffness.clone()
    }

    // the embarrassingly parallel loop over non-zeros
    fn gather_per_element_hessians(&mut self) {
        let gathers = &self.hessian_gathers;
        let elements = &self.per_element_hessians;
        self.stiffness
            .values_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, value)| {
                let mut sum = 0.0;
                for gather in &gathers[i] {
                    sum += elements[gather.tet as usize]
                        [(gather.row as usize, gather.col as usize)];
                }
                *value = sum;
            });
    }

    fn vertex_face_vertices(&self, pair: usize) -> [Vec3; 4] {
        let tet = &self.vertex_face_collision_tets[pair];
        [
            self.vertices[tet[0]],
            self.vertices[tet[1]],
            self.vertices[tet[2]],
            self.vertices[tet[3]],
        ]
    }

    fn edge_edge_vertices(&self, pair: usize) -> ([Vec3; 4], [usize; 4]) {
        let (first, second) = self.edge_edge_collisions[pair];
        let edge0 = self.surface_edges[first];
        let edge1 = self.surface_edges[second];
        let indices = [edge0[0], edge0[1], edge1[0], edge1[1]];
        (
            [
                self.vertices[indices[0]],
                self.vertices[indices[1]],
                self.vertices[indices[2]],
                self.vertices[indices[3]],
            ],
            indices,
        )
    }

    /// Forces from the active vertex-face pairs, scaled by their rest-area
    /// weights.
    pub fn vertex_face_collision_forces(&self) -> DVec {
        let mut forces = DVec::zeros(self.dofs());
        for pair in 0..self.vertex_face_collision_tets.len() {
            let vs = self.vertex_face_vertices(pair);
            let force = -self.vertex_face_collision_areas[pair]
                * self.vertex_face_energy.gradient(&vs);
            scatter_force(&mut forces, &self.vertex_face_collision_tets[pair], &force);
        }
        forces
    }

    /// Clamped Hessians of the active vertex-face pairs as a sparse matrix.
    pub fn vertex_face_collision_clamped_hessian(&self) -> SparseMatrix {
        let mut triplets = Vec::new();
        for pair in 0..self.vertex_face_collision_tets.len() {
            let vs = self.vertex_face_vertices(pair);
            let h = -self.vertex_face_collision_areas[pair]
                * self.vertex_face_energy.clamped_hessian(&vs);
            push_block_triplets(&mut triplets, &self.vertex_face_collision_tets[pair], &h);
        }
        SparseMatrix::from_triplets(self.dofs(), &triplets)
    }

    /// Total energy in the active edge-edge pairs.
    pub fn edge_edge_collision_energy(&self) -> Real {
        let mut energy = 0.0;
        for pair in 0..self.edge_edge_collisions.len() {
            let (vs, _) = self.edge_edge_vertices(pair);
            let (a, b) = self.edge_edge_coordinates[pair];
            energy += self.edge_edge_collision_areas[pair]
                * self.edge_edge_energy.psi(&vs, &a, &b);
        }
        energy
    }

    /// Forces from the active edge-edge pairs; already-penetrating pairs use
    /// the negated dual so the push reverses.
    pub fn edge_edge_collision_forces(&self) -> DVec {
        let mut forces = DVec::zeros(self.dofs());
        for pair in 0..self.edge_edge_collisions.len() {
            let (vs, indices) = self.edge_edge_vertices(pair);
            let (a, b) = self.edge_edge_coordinates[pair];
            let gradient = if self.edge_edge_intersections[pair] {
                self.edge_edge_energy.gradient_negated(&vs, &a, &b)
            } else {
                self.edge_edge_energy.gradient(&vs, &a, &b)
            };
            let force = -self.edge_edge_collision_areas[pair] * gradient;
            scatter_force(&mut forces, &indices, &force);
        }
        forces
    }

    /// Clamped Hessians of the active edge-edge pairs as a sparse matrix.
    pub fn edge_edge_collision_clamped_hessian(&self) -> SparseMatrix {
        let mut triplets = Vec::new();
        for pair in 0..self.edge_edge_collisions.len() {
            let (vs, indices) = self.edge_edge_vertices(pair);
            let (a, b) = self.edge_edge_coordinates[pair];
            let clamped = if self.edge_edge_intersections[pair] {
                self.edge_edge_energy.clamped_hessian_negated(&vs, &a, &b)
            } else {
                self.edge_edge_energy.clamped_hessian(&vs, &a, &b)
            };
            let h = -self.edge_edge_collision_areas[pair] * clamped;
            push_block_triplets(&mut triplets, &indices, &h);
        }
        SparseMatrix::from_triplets(self.dofs(), &triplets)
    }
}

#[cfg(test)]
mod tests {
    use super::super::generate::{cube_lattice, single_tet};
    use super::super::TetMesh;
    use super::*;
    use crate::materials::{GreenDamping, Snh, StVk};

    fn displaced_mesh() -> TetMesh {
        let (vertices, tets) = single_tet();
        let mut mesh = TetMesh::new(vertices, tets).unwrap();

        let mut delta = DVec::zeros(mesh.dofs());
        for i in 0..delta.len() {
            delta[i] = ((i + 1) as Real * 0.83).sin() * 0.05;
        }
        mesh.set_displacement(&delta);
        mesh.compute_fs();
        mesh.compute_svds();
        mesh
    }

    #[test]
    fn forces_vanish_at_rest() {
        let (vertices, tets) = cube_lattice(2, 1.0, Vec3::zeros());
        let mut mesh = TetMesh::new(vertices, tets).unwrap();
        mesh.compute_fs();
        mesh.compute_svds();

        let material = StVk::new(1.0, 1.0);
        assert!(mesh.hyperelastic_forces(&material).norm() < 1e-12);
        assert!(mesh.hyperelastic_energy(&material).abs() < 1e-12);
    }

    #[test]
    fn forces_match_energy_gradient() {
        let mut mesh = displaced_mesh();
        let material = StVk::new(1.0, 1.0);
        let forces = mesh.hyperelastic_forces(&material);

        let h = 1e-6;
        let mut delta = mesh.displacement();
        for i in 0..mesh.dofs() {
            let original = delta[i];

            delta[i] = original + h;
            mesh.set_displacement(&delta);
            mesh.compute_fs();
            let energy_plus = mesh.hyperelastic_energy(&material);

            delta[i] = original - h;
            mesh.set_displacement(&delta);
            mesh.compute_fs();
            let energy_minus = mesh.hyperelastic_energy(&material);

            delta[i] = original;

            // force is the negative energy gradient
            let fd = -(energy_plus - energy_minus) / (2.0 * h);
            assert!((forces[i] - fd).abs() < 1e-6 * (1.0 + forces[i].abs()));
        }
    }

    #[test]
    fn clamped_hessian_matches_force_jacobian_near_rest() {
        // near rest the true Hessian is already PSD, so the clamped
        // assembly must agree with a finite difference of the forces
        let (vertices, tets) = single_tet();
        let mut mesh = TetMesh::new(vertices, tets).unwrap();
        let material = Snh::new(2.0, 9.0);

        let mut delta = DVec::zeros(mesh.dofs());
        for i in 0..delta.len() {
            delta[i] = ((i + 1) as Real * 1.3).cos() * 1e-3;
        }
        mesh.set_displacement(&delta);
        mesh.compute_fs();
        mesh.compute_svds();

        let k = mesh.hyperelastic_clamped_hessian(&material).to_dense();

        let h = 1e-6;
        for j in 0..mesh.dofs() {
            let original = delta[j];

            delta[j] = original + h;
            mesh.set_displacement(&delta);
            mesh.compute_fs();
            mesh.compute_svds();
            let forces_plus = mesh.internal_forces(&material, None);

            delta[j] = original - h;
            mesh.set_displacement(&delta);
            mesh.compute_fs();
            mesh.compute_svds();
            let forces_minus = mesh.internal_forces(&material, None);

            delta[j] = original;

            let fd = (forces_plus - forces_minus) / (2.0 * h);
            for i in 0..mesh.dofs() {
                assert!(
                    (k[(i, j)] - fd[i]).abs() < 1e-4 * (1.0 + k[(i, j)].abs()),
                    "K({}, {}): {} vs {}",
                    i,
                    j,
                    k[(i, j)],
                    fd[i]
                );
            }
        }
    }

    #[test]
    fn compressed_gather_matches_triplet_assembly() {
        let (vertices, tets) = cube_lattice(2, 1.0, Vec3::zeros());
        let mut mesh = TetMesh::new(vertices, tets).unwrap();

        let mut delta = DVec::zeros(mesh.dofs());
        for i in 0..delta.len() {
            delta[i] = ((i * 7 + 3) as Real * 0.29).sin() * 0.02;
        }
        mesh.set_displacement(&delta);
        mesh.compute_fs();
        mesh.compute_svds();

        let material = StVk::new(1.0, 1.0);
        let gathered = mesh.hyperelastic_clamped_hessian(&material).to_dense();

        // reference: scatter the same per-element blocks through triplets
        let mut triplets = Vec::new();
        for i in 0..mesh.tets().len() {
            let (u, sigma, v) = mesh.svd(i);
            let hessian = material.clamped_hessian_svd(u, sigma, v) * (-mesh.rest_tet_volumes()[i]);
            let block = mesh.pfpxs[i].transpose() * hessian * mesh.pfpxs[i];
            let tet = mesh.tets()[i];
            push_block_triplets(&mut triplets, &tet, &block);
        }
        let reference = SparseMatrix::from_triplets(mesh.dofs(), &triplets).to_dense();

        assert!((gathered - reference).norm() < 1e-10);
    }

    #[test]
    fn damping_hessian_matches_velocity_jacobian() {
        let mut mesh = displaced_mesh();
        let material = StVk::new(1.0, 1.0);
        let damping = GreenDamping::new(0.3);

        let mut velocity = DVec::zeros(mesh.dofs());
        for i in 0..velocity.len() {
            velocity[i] = ((i + 2) as Real * 0.51).cos() * 0.1;
        }
        mesh.compute_fdots(&velocity);
        let c = mesh.damping_hessian(&damping).to_dense();

        let damping_force = |mesh: &mut TetMesh, velocity: &DVec| -> DVec {
            mesh.compute_fdots(velocity);
            mesh.internal_forces(&material, Some(&damping))
                - mesh.internal_forces(&material, None)
        };

        let h = 1e-6;
        for j in 0..mesh.dofs() {
            let original = velocity[j];
            velocity[j] = original + h;
            let forces_plus = damping_force(&mut mesh, &velocity);
            velocity[j] = original - h;
            let forces_minus = damping_force(&mut mesh, &velocity);
            velocity[j] = original;

            let fd = (forces_plus - forces_minus) / (2.0 * h);
            for i in 0..mesh.dofs() {
                assert!((c[(i, j)] - fd[i]).abs() < 1e-5 * (1.0 + c[(i, j)].abs()));
            }
        }
    }

    #[test]
    fn collision_forces_push_the_cubes_apart() {
        let (mut vertices, mut tets) = cube_lattice(1, 0.5, Vec3::zeros());
        let (upper_vertices, upper_tets) = cube_lattice(1, 0.5, Vec3::new(0.13, 0.07, 0.505));
        let offset = vertices.len();
        vertices.extend(upper_vertices);
        tets.extend(
            upper_tets
                .iter()
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset, t[3] + offset]),
        );

        let mut mesh = TetMesh::new(vertices, tets).unwrap();
        mesh.set_collision_eps(0.02);
        mesh.set_collision_stiffness(1000.0);
        mesh.compute_fs();
        mesh.compute_vertex_face_collisions();
        mesh.build_vertex_face_collision_tets();
        mesh.compute_edge_edge_collisions();

        let forces = mesh.vertex_face_collision_forces() + mesh.edge_edge_collision_forces();
        assert!(forces.norm() > 0.0);
        assert!(mesh.edge_edge_collision_energy() >= 0.0);

        // net z-push on the upper cube is upward, on the lower downward
        let mut upper_z = 0.0;
        let mut lower_z = 0.0;
        for i in 0..mesh.total_vertices() {
            if i >= offset {
                upper_z += forces[3 * i + 2];
            } else {
                lower_z += forces[3 * i + 2];
            }
        }
        assert!(upper_z > 0.0);
        assert!(lower_z < 0.0);
    }
}
