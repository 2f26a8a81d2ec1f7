//! Tetrahedral mesh state: geometry, surface tables, the deformation
//! gradient pipeline, and self-collision detection.

mod assembly;
pub mod generate;
mod surface;

use crate::collision::aabb::AabbTree;
use crate::collision::kernels::{
    face_edge_intersection, point_projects_inside_triangle, point_triangle_distance,
    segment_segment_closest_points,
};
use crate::collision::{EdgeEdgeEnergy, EdgeSqrtCollision, VertexFaceEnergy,
    VertexFaceSqrtCollision};
use crate::math::decomp::{polar_decomposition, svd_rv};
use crate::math::sparse::SparseMatrix;
use crate::math::{DVec, Mat3, Mat9x12, Mat12, Real, Vec2, Vec3};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

pub use assembly::HessianGather;

/// Construction-time failures.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("mesh needs at least one vertex and one tet")]
    Empty,

    #[error("tet {tet} references vertex {index}, but there are {count} vertices")]
    VertexOutOfRange {
        tet: usize,
        index: usize,
        count: usize,
    },

    #[error("tet {tet} has non-positive rest volume {volume}")]
    NonPositiveVolume { tet: usize, volume: Real },
}

/// A deformable tetrahedral volume. Vertex and tet counts are fixed at
/// construction; per-element caches are refreshed every step.
pub struct TetMesh {
    vertices: Vec<Vec3>,
    rest_vertices: Vec<Vec3>,
    tets: Vec<[usize; 4]>,

    rest_tet_volumes: Vec<Real>,
    rest_one_ring_volumes: Vec<Real>,

    // support for the deformation gradient F and its change-of-basis
    dm_invs: Vec<Mat3>,
    pfpxs: Vec<Mat9x12>,

    // deformation gradients, their SVDs, and the velocity gradients
    fs: Vec<Mat3>,
    us: Vec<Mat3>,
    sigmas: Vec<Vec3>,
    vs: Vec<Mat3>,
    fdots: Vec<Mat3>,
    svds_computed: bool,

    // surface tables; triangles are wound counter-clockwise facing out
    surface_triangles: Vec<[usize; 3]>,
    surface_triangle_areas: Vec<Real>,
    surface_triangle_neighbors: Vec<[Option<usize>; 3]>,
    surface_edges: Vec<[usize; 2]>,
    surface_edge_triangle_neighbors: Vec<[Option<usize>; 2]>,
    surface_vertices: Vec<usize>,
    volume_to_surface: HashMap<usize, usize>,
    rest_one_ring_areas: Vec<Real>,
    rest_edge_areas: Vec<Real>,
    inside_surface_one_ring: HashSet<(usize, usize)>,

    // how close is considered to be in collision?
    collision_eps: Real,

    // vertex-face pairs: (vertex index, surface triangle index), plus the
    // derived four-vertex orderings and area weights
    vertex_face_collisions: Vec<(usize, usize)>,
    vertex_face_collision_tets: Vec<[usize; 4]>,
    vertex_face_collision_areas: Vec<Real>,

    // edge-edge pairs: (surface edge, surface edge) with interpolation
    // coordinates, area weights, and the already-penetrating flag
    edge_edge_collisions: Vec<(usize, usize)>,
    edge_edge_coordinates: Vec<(Vec2, Vec2)>,
    edge_edge_collision_areas: Vec<Real>,
    edge_edge_intersections: Vec<bool>,

    // vertices touching any inverted tet sit out of self-collision
    inverted_vertices: Vec<bool>,

    vertex_face_energy: Box<dyn VertexFaceEnergy>,
    edge_edge_energy: Box<dyn EdgeEdgeEnergy>,

    triangle_tree: AabbTree<3>,
    edge_tree: AabbTree<2>,

    // fixed-pattern global stiffness and its compressed-index gathers
    stiffness: SparseMatrix,
    hessian_gathers: Vec<Vec<HessianGather>>,
    per_element_hessians: Vec<Mat12>,
}

impl TetMesh {
    /// Build a mesh, extracting the surface triangles from the tet table.
    pub fn new(rest_vertices: Vec<Vec3>, tets: Vec<[usize; 4]>) -> Result<Self, MeshError> {
        let faces = surface::extract_surface_triangles(&tets);
        Self::with_surface(rest_vertices, faces, tets)
    }

    /// Build a mesh from pre-extracted surface triangles (the TetGen path).
    pub fn with_surface(
        rest_vertices: Vec<Vec3>,
        faces: Vec<[usize; 3]>,
        tets: Vec<[usize; 4]>,
    ) -> Result<Self, MeshError> {
        if rest_vertices.is_empty() || tets.is_empty() {
            return Err(MeshError::Empty);
        }
        for (i, tet) in tets.iter().enumerate() {
            for &index in tet {
                if index >= rest_vertices.len() {
                    return Err(MeshError::VertexOutOfRange {
                        tet: i,
                        index,
                        count: rest_vertices.len(),
                    });
                }
            }
        }

        let rest_tet_volumes = Self::compute_tet_volumes(&rest_vertices, &tets)?;
        let rest_one_ring_volumes =
            Self::compute_one_ring_volumes(rest_vertices.len(), &tets, &rest_tet_volumes);

        let dm_invs: Vec<Mat3> = tets
            .iter()
            .map(|tet| {
                let mut dm = Mat3::zeros();
                dm.set_column(0, &(rest_vertices[tet[1]] - rest_vertices[tet[0]]));
                dm.set_column(1, &(rest_vertices[tet[2]] - rest_vertices[tet[0]]));
                dm.set_column(2, &(rest_vertices[tet[3]] - rest_vertices[tet[0]]));
                dm.try_inverse().unwrap_or_else(Mat3::zeros)
            })
            .collect();
        let pfpxs: Vec<Mat9x12> = dm_invs.iter().map(assembly::compute_pfpx).collect();

        let (surface_vertices, volume_to_surface) = surface::compute_surface_vertices(&faces);
        let surface_edges = surface::compute_surface_edges(&faces);
        let surface_triangle_neighbors = surface::compute_triangle_neighbors(&faces);
        let surface_edge_triangle_neighbors =
            surface::compute_edge_triangle_neighbors(&faces, &surface_edges);
        let (surface_triangle_areas, rest_one_ring_areas, rest_edge_areas) =
            surface::compute_surface_areas(
                &rest_vertices,
                &faces,
                &surface_vertices,
                &volume_to_surface,
                &surface_edges,
            );
        let inside_surface_one_ring = surface::compute_one_ring_pairs(&surface_edges);

        info!(
            "Surface: {} triangles, {} edges, {} vertices",
            faces.len(),
            surface_edges.len(),
            surface_vertices.len()
        );

        let triangle_tree = AabbTree::new(&rest_vertices, faces.clone());
        let edge_tree = AabbTree::new(&rest_vertices, surface_edges.clone());

        let total_tets = tets.len();
        let total_vertices = rest_vertices.len();
        let (stiffness, hessian_gathers) = assembly::build_sparsity(total_vertices, &tets);

        // this gets overwritten by the integrator every step
        let collision_eps = 0.01;
        let stiffness_seed = 1000.0;

        Ok(Self {
            vertices: rest_vertices.clone(),
            rest_vertices,
            tets,
            rest_tet_volumes,
            rest_one_ring_volumes,
            dm_invs,
            pfpxs,
            fs: vec![Mat3::identity(); total_tets],
            us: vec![Mat3::identity(); total_tets],
            sigmas: vec![Vec3::new(1.0, 1.0, 1.0); total_tets],
            vs: vec![Mat3::identity(); total_tets],
            fdots: vec![Mat3::zeros(); total_tets],
            svds_computed: false,
            surface_triangles: faces,
            surface_triangle_areas,
            surface_triangle_neighbors,
            surface_edges,
            surface_edge_triangle_neighbors,
            surface_vertices,
            volume_to_surface,
            rest_one_ring_areas,
            rest_edge_areas,
            inside_surface_one_ring,
            collision_eps,
            vertex_face_collisions: Vec::new(),
            vertex_face_collision_tets: Vec::new(),
            vertex_face_collision_areas: Vec::new(),
            edge_edge_collisions: Vec::new(),
            edge_edge_coordinates: Vec::new(),
            edge_edge_collision_areas: Vec::new(),
            edge_edge_intersections: Vec::new(),
            inverted_vertices: vec![false; total_vertices],
            vertex_face_energy: Box::new(VertexFaceSqrtCollision::new(
                stiffness_seed,
                collision_eps,
            )),
            edge_edge_energy: Box::new(EdgeSqrtCollision::new(stiffness_seed, collision_eps)),
            triangle_tree,
            edge_tree,
            stiffness,
            hessian_gathers,
            per_element_hessians: vec![Mat12::zeros(); total_tets],
        })
    }

    fn compute_tet_volumes(
        vertices: &[Vec3],
        tets: &[[usize; 4]],
    ) -> Result<Vec<Real>, MeshError> {
        let mut volumes = Vec::with_capacity(tets.len());
        for (i, tet) in tets.iter().enumerate() {
            let d1 = vertices[tet[1]] - vertices[tet[0]];
            let d2 = vertices[tet[2]] - vertices[tet[0]];
            let d3 = vertices[tet[3]] - vertices[tet[0]];
            let volume = d3.dot(&d1.cross(&d2)) / 6.0;
            if volume <= 0.0 {
                return Err(MeshError::NonPositiveVolume { tet: i, volume });
            }
            volumes.push(volume);
        }
        Ok(volumes)
    }

    fn compute_one_ring_volumes(
        vertex_count: usize,
        tets: &[[usize; 4]],
        tet_volumes: &[Real],
    ) -> Vec<Real> {
        let mut one_ring = vec![0.0; vertex_count];
        for (i, tet) in tets.iter().enumerate() {
            let quarter = 0.25 * tet_volumes[i];
            for &v in tet {
                one_ring[v] += quarter;
            }
        }
        one_ring
    }

    // ------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn rest_vertices(&self) -> &[Vec3] {
        &self.rest_vertices
    }

    pub fn tets(&self) -> &[[usize; 4]] {
        &self.tets
    }

    pub fn total_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn dofs(&self) -> usize {
        self.vertices.len() * 3
    }

    pub fn rest_tet_volumes(&self) -> &[Real] {
        &self.rest_tet_volumes
    }

    pub fn rest_one_ring_volumes(&self) -> &[Real] {
        &self.rest_one_ring_volumes
    }

    pub fn surface_triangles(&self) -> &[[usize; 3]] {
        &self.surface_triangles
    }

    pub fn surface_triangle_areas(&self) -> &[Real] {
        &self.surface_triangle_areas
    }

    pub fn surface_edges(&self) -> &[[usize; 2]] {
        &self.surface_edges
    }

    pub fn surface_vertices(&self) -> &[usize] {
        &self.surface_vertices
    }

    pub fn collision_eps(&self) -> Real {
        self.collision_eps
    }

    pub fn vertex_face_collisions(&self) -> &[(usize, usize)] {
        &self.vertex_face_collisions
    }

    pub fn edge_edge_collisions(&self) -> &[(usize, usize)] {
        &self.edge_edge_collisions
    }

    pub fn edge_edge_coordinates(&self) -> &[(Vec2, Vec2)] {
        &self.edge_edge_coordinates
    }

    pub fn edge_edge_intersections(&self) -> &[bool] {
        &self.edge_edge_intersections
    }

    pub fn inverted_vertices(&self) -> &[bool] {
        &self.inverted_vertices
    }

    pub fn deformation_gradient(&self, tet: usize) -> &Mat3 {
        &self.fs[tet]
    }

    pub fn svd(&self, tet: usize) -> (&Mat3, &Vec3, &Mat3) {
        debug_assert!(self.svds_computed);
        (&self.us[tet], &self.sigmas[tet], &self.vs[tet])
    }

    pub fn triangle_tree(&self) -> &AabbTree<3> {
        &self.triangle_tree
    }

    pub fn edge_tree(&self) -> &AabbTree<2> {
        &self.edge_tree
    }

    // ------------------------------------------------------------------
    // positions and displacements
    // ------------------------------------------------------------------

    /// The current displacement away from rest, stacked into a 3N vector.
    pub fn displacement(&self) -> DVec {
        let mut delta = DVec::zeros(self.dofs());
        for (i, (vertex, rest)) in self.vertices.iter().zip(&self.rest_vertices).enumerate() {
            let diff = vertex - rest;
            delta[3 * i] = diff[0];
            delta[3 * i + 1] = diff[1];
            delta[3 * i + 2] = diff[2];
        }
        delta
    }

    /// Set the vertex displacements to these values exactly.
    pub fn set_displacement(&mut self, delta: &DVec) {
        debug_assert_eq!(delta.len(), self.dofs());
        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            *vertex = self.rest_vertices[i]
                + Vec3::new(delta[3 * i], delta[3 * i + 1], delta[3 * i + 2]);
        }
    }

    /// Set the vertex positions directly.
    pub fn set_positions(&mut self, positions: &DVec) {
        debug_assert_eq!(positions.len(), self.dofs());
        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            *vertex = Vec3::new(positions[3 * i], positions[3 * i + 1], positions[3 * i + 2]);
        }
    }

    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        let mut mins = self.vertices[0];
        let mut maxs = self.vertices[0];
        for v in &self.vertices {
            mins = mins.inf(v);
            maxs = maxs.sup(v);
        }
        (mins, maxs)
    }

    /// Volume-weighted translation of the current configuration.
    pub fn translation(&self) -> Vec3 {
        let mut vertex_sum = Vec3::zeros();
        let mut volume_sum = 0.0;
        for (vertex, &volume) in self.vertices.iter().zip(&self.rest_one_ring_volumes) {
            vertex_sum += vertex * volume;
            volume_sum += volume;
        }
        vertex_sum / volume_sum
    }

    /// Volume-weighted translation of the rest configuration.
    pub fn rest_translation(&self) -> Vec3 {
        let mut vertex_sum = Vec3::zeros();
        let mut volume_sum = 0.0;
        for (vertex, &volume) in self.rest_vertices.iter().zip(&self.rest_one_ring_volumes) {
            vertex_sum += vertex * volume;
            volume_sum += volume;
        }
        vertex_sum / volume_sum
    }

    /// Procrustes-style global rotation by shape matching.
    pub fn rotation(&self) -> Mat3 {
        let x_cm0 = self.rest_translation();
        let x_cm = self.translation();

        let mut apq = Mat3::zeros();
        for i in 0..self.vertices.len() {
            let p = self.vertices[i] - x_cm;
            let q = self.rest_vertices[i] - x_cm0;
            apq += self.rest_one_ring_volumes[i] * (p * q.transpose());
        }

        let (r, _) = polar_decomposition(&apq);
        r
    }

    // ------------------------------------------------------------------
    // deformation gradient pipeline
    // ------------------------------------------------------------------

    fn compute_f(vertices: &[Vec3], tet: &[usize; 4], dm_inv: &Mat3) -> Mat3 {
        let mut ds = Mat3::zeros();
        ds.set_column(0, &(vertices[tet[1]] - vertices[tet[0]]));
        ds.set_column(1, &(vertices[tet[2]] - vertices[tet[0]]));
        ds.set_column(2, &(vertices[tet[3]] - vertices[tet[0]]));
        ds * dm_inv
    }

    /// Refresh every per-tet deformation gradient; marks the SVDs stale.
    pub fn compute_fs(&mut self) {
        let vertices = &self.vertices;
        let tets = &self.tets;
        let dm_invs = &self.dm_invs;
        self.fs
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, f)| *f = Self::compute_f(vertices, &tets[i], &dm_invs[i]));
        self.svds_computed = false;
    }

    /// Refresh every per-tet velocity gradient from a stacked velocity.
    pub fn compute_fdots(&mut self, velocity: &DVec) {
        debug_assert_eq!(velocity.len(), self.dofs());
        let tets = &self.tets;
        let dm_invs = &self.dm_invs;
        self.fdots.par_iter_mut().enumerate().for_each(|(i, fdot)| {
            let tet = &tets[i];
            let at = |v: usize| {
                Vec3::new(velocity[3 * v], velocity[3 * v + 1], velocity[3 * v + 2])
            };
            let v0 = at(tet[0]);
            let mut vmat = Mat3::zeros();
            vmat.set_column(0, &(at(tet[1]) - v0));
            vmat.set_column(1, &(at(tet[2]) - v0));
            vmat.set_column(2, &(at(tet[3]) - v0));
            *fdot = vmat * dm_invs[i];
        });
    }

    /// Refresh the rotation-variant SVDs of every deformation gradient.
    pub fn compute_svds(&mut self) {
        let fs = &self.fs;
        (
            self.us.par_iter_mut(),
            self.sigmas.par_iter_mut(),
            self.vs.par_iter_mut(),
        )
            .into_par_iter()
            .enumerate()
            .for_each(|(i, (u, sigma, v))| {
                let (svd_u, svd_sigma, svd_v) = svd_rv(&fs[i]);
                *u = svd_u;
                *sigma = svd_sigma;
                *v = svd_v;
            });
        self.svds_computed = true;
    }

    /// Flag vertices whose incident tets have inverted (det F ≤ 0), so the
    /// elasticity solve can untangle them before self-collisions pile on.
    pub fn compute_inverted_vertices(&mut self) {
        self.inverted_vertices.fill(false);
        for (i, tet) in self.tets.iter().enumerate() {
            if self.fs[i].determinant() > 0.0 {
                continue;
            }
            for &v in tet {
                self.inverted_vertices[v] = true;
            }
        }
    }

    // ------------------------------------------------------------------
    // collision configuration
    // ------------------------------------------------------------------

    pub fn set_collision_eps(&mut self, eps: Real) {
        self.collision_eps = eps;
        self.vertex_face_energy.set_eps(eps);
        self.edge_edge_energy.set_eps(eps);
    }

    pub fn set_collision_stiffness(&mut self, stiffness: Real) {
        self.vertex_face_energy.set_mu(stiffness);
        self.edge_edge_energy.set_mu(stiffness);
    }

    /// Swap in a different vertex-face contact energy.
    pub fn set_vertex_face_energy(&mut self, energy: Box<dyn VertexFaceEnergy>) {
        self.vertex_face_energy = energy;
    }

    /// Swap in a different edge-edge contact energy.
    pub fn set_edge_edge_energy(&mut self, energy: Box<dyn EdgeEdgeEnergy>) {
        self.edge_edge_energy = energy;
    }

    /// Overwrite the collision pairs, for replays.
    pub fn set_collision_pairs(
        &mut self,
        vertex_face: Vec<(usize, usize)>,
        edge_edge: Vec<(usize, usize)>,
    ) {
        self.vertex_face_collisions = vertex_face;
        self.edge_edge_collisions = edge_edge;
    }

    // ------------------------------------------------------------------
    // self-collision detection
    // ------------------------------------------------------------------

    fn surface_triangle_is_degenerate(&self, triangle: usize) -> bool {
        let t = &self.surface_triangles[triangle];
        let deformed = surface::triangle_area(
            &self.vertices[t[0]],
            &self.vertices[t[1]],
            &self.vertices[t[2]],
        );
        let relative_area = deformed / self.surface_triangle_areas[triangle];
        relative_area < 1e-4
    }

    fn plane_normal(&self, triangle: usize) -> Vec3 {
        let t = &self.surface_triangles[triangle];
        let e1 = self.vertices[t[1]] - self.vertices[t[0]];
        let e2 = self.vertices[t[2]] - self.vertices[t[0]];
        e1.cross(&e2).normalize()
    }

    /// Is the vertex inside the prism bounded by the bisector planes between
    /// this triangle and its three face neighbours (the collision cell)?
    fn inside_collision_cell(&self, triangle: usize, vertex: &Vec3) -> bool {
        let t = &self.surface_triangles[triangle];
        let corners = [
            self.vertices[t[0]],
            self.vertices[t[1]],
            self.vertices[t[2]],
        ];
        let n = self.plane_normal(triangle);

        for x in 0..3 {
            let Some(neighbor) = self.surface_triangle_neighbors[triangle][x] else {
                return false;
            };
            let n_neighbor = self.plane_normal(neighbor);

            // bisector plane along this edge
            let ne = (n_neighbor + n).normalize();
            let eij = corners[(x + 1) % 3] - corners[x];
            let neb = ne.cross(&eij).normalize();
            if neb.dot(&(vertex - corners[x])) < 0.0 {
                return false;
            }
        }
        true
    }

    /// Scan for vertex-face proximity below the collision epsilon, using the
    /// triangle tree for the broad phase.
    pub fn compute_vertex_face_collisions(&mut self) {
        self.compute_inverted_vertices();
        self.triangle_tree.refit(&self.vertices);

        let mut collisions = Vec::new();
        let mut broad_phase = Vec::new();

        for x in 0..self.surface_vertices.len() {
            let current = self.surface_vertices[x];

            // a vertex in an inverted tet needs to get its house in order
            // before it starts bossing around a surface face
            if self.inverted_vertices[current] {
                continue;
            }

            let surface_vertex = self.vertices[current];
            self.triangle_tree
                .nearby_point(&surface_vertex, self.collision_eps, &mut broad_phase);

            for &face in &broad_phase {
                if self.surface_triangle_is_degenerate(face) {
                    continue;
                }

                let t = &self.surface_triangles[face];
                if self.inverted_vertices[t[0]]
                    && self.inverted_vertices[t[1]]
                    && self.inverted_vertices[t[2]]
                {
                    continue;
                }
                if t[0] == current || t[1] == current || t[2] == current {
                    continue;
                }

                let distance = point_triangle_distance(
                    &self.vertices[t[0]],
                    &self.vertices[t[1]],
                    &self.vertices[t[2]],
                    &surface_vertex,
                );
                if distance >= self.collision_eps {
                    continue;
                }

                if point_projects_inside_triangle(
                    &self.vertices[t[0]],
                    &self.vertices[t[1]],
                    &self.vertices[t[2]],
                    &surface_vertex,
                ) || self.inside_collision_cell(face, &surface_vertex)
                {
                    collisions.push((current, face));
                }
            }
        }

        if !collisions.is_empty() {
            debug!("Found {} vertex-face collisions", collisions.len());
        }
        self.vertex_face_collisions = collisions;
    }

    /// Build the four-vertex orderings and area weights for the recorded
    /// vertex-face pairs: colliding vertex first, face reversed behind it.
    pub fn build_vertex_face_collision_tets(&mut self) {
        self.vertex_face_collision_tets.clear();
        self.vertex_face_collision_areas.clear();

        for &(vertex, face) in &self.vertex_face_collisions {
            let t = &self.surface_triangles[face];

            // reversed so the face normal points at the colliding vertex
            let tet = [vertex, t[2], t[1], t[0]];

            let face_area = surface::triangle_area(
                &self.rest_vertices[t[0]],
                &self.rest_vertices[t[1]],
                &self.rest_vertices[t[2]],
            );
            let surface_id = self.volume_to_surface[&vertex];
            let vertex_area = self.rest_one_ring_areas[surface_id];

            self.vertex_face_collision_tets.push(tet);
            self.vertex_face_collision_areas.push(face_area + vertex_area);
        }
    }

    /// Scan for edge-edge proximity below the collision epsilon, recording
    /// interpolation coordinates and the penetration flag per pair.
    pub fn compute_edge_edge_collisions(&mut self) {
        self.edge_edge_collisions.clear();
        self.edge_edge_coordinates.clear();
        self.edge_edge_collision_areas.clear();
        self.edge_edge_intersections.clear();

        self.edge_tree.refit(&self.vertices);

        let mut nearby = Vec::new();
        for x in 0..self.surface_edges.len() {
            let outer = self.surface_edges[x];
            let v0 = self.vertices[outer[0]];
            let v1 = self.vertices[outer[1]];

            let mut closest_edge = None;
            let mut closest_distance = Real::MAX;
            let mut a_closest = Vec2::new(-1.0, -1.0);
            let mut b_closest = Vec2::new(-1.0, -1.0);

            self.edge_tree
                .nearby_edge(&self.vertices, &outer, self.collision_eps, &mut nearby);

            for &y in &nearby {
                // don't double-count (a, b) and (b, a)
                if y <= x {
                    continue;
                }

                let inner = self.surface_edges[y];
                if outer[0] == inner[0]
                    || outer[0] == inner[1]
                    || outer[1] == inner[0]
                    || outer[1] == inner[1]
                {
                    continue;
                }

                let v2 = self.vertices[inner[0]];
                let v3 = self.vertices[inner[1]];

                let (outer_point, inner_point) =
                    segment_segment_closest_points(&v0, &v1, &v2, &v3);
                let distance = (inner_point - outer_point).norm();
                if distance > closest_distance {
                    continue;
                }

                // interpolation coordinates along each edge; robust as long
                // as the closest-point test isn't total garbage
                let mut a = Vec2::zeros();
                let mut b = Vec2::zeros();
                a[1] = (outer_point - v0).norm() / (v1 - v0).norm();
                a[0] = 1.0 - a[1];
                b[1] = (inner_point - v2).norm() / (v3 - v2).norm();
                b[0] = 1.0 - b[1];

                // too close to an endpoint; skip it
                let skip_eps = 1e-4;
                if a[0] < skip_eps || a[0] > 1.0 - skip_eps {
                    continue;
                }
                if a[1] < skip_eps || a[1] > 1.0 - skip_eps {
                    continue;
                }
                if b[0] < skip_eps || b[0] > 1.0 - skip_eps {
                    continue;
                }
                if b[1] < skip_eps || b[1] > 1.0 - skip_eps {
                    continue;
                }

                closest_distance = distance;
                closest_edge = Some(y);
                a_closest = a;
                b_closest = b;
            }

            let Some(closest) = closest_edge else {
                continue;
            };

            // reject pairs inside each other's one rings
            let inner = self.surface_edges[closest];
            let mut inside_one_ring = false;
            for &outer_vertex in &outer {
                for &inner_vertex in &inner {
                    if self
                        .inside_surface_one_ring
                        .contains(&(outer_vertex, inner_vertex))
                    {
                        inside_one_ring = true;
                    }
                }
            }
            if inside_one_ring {
                continue;
            }

            if closest_distance < self.collision_eps {
                self.edge_edge_collisions.push((x, closest));
                self.edge_edge_coordinates.push((a_closest, b_closest));
                self.edge_edge_collision_areas
                    .push(self.rest_edge_areas[x] + self.rest_edge_areas[closest]);

                // are the adjacent faces of the other edge already pierced?
                let edge = [v0, v1];
                let mut penetrating = false;
                for neighbor in self.surface_edge_triangle_neighbors[closest]
                    .iter()
                    .flatten()
                {
                    let t = &self.surface_triangles[*neighbor];
                    let triangle = [
                        self.vertices[t[0]],
                        self.vertices[t[1]],
                        self.vertices[t[2]],
                    ];
                    penetrating = penetrating || face_edge_intersection(&triangle, &edge);
                }
                self.edge_edge_intersections.push(penetrating);
            }
        }

        debug_assert_eq!(
            self.edge_edge_collisions.len(),
            self.edge_edge_coordinates.len()
        );
        if !self.edge_edge_collisions.is_empty() {
            debug!(
                "Found {} edge-edge collisions",
                self.edge_edge_collisions.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::generate::{cube_lattice, single_tet};
    use super::*;

    #[test]
    fn construction_rejects_bad_input() {
        let (vertices, _) = single_tet();
        assert!(matches!(
            TetMesh::new(vertices.clone(), vec![[0, 1, 2, 9]]),
            Err(MeshError::VertexOutOfRange { .. })
        ));

        // swapping two vertices inverts the tet
        assert!(matches!(
            TetMesh::new(vertices, vec![[0, 2, 1, 3]]),
            Err(MeshError::NonPositiveVolume { .. })
        ));
    }

    #[test]
    fn deformation_gradient_is_identity_at_rest() {
        let (vertices, tets) = single_tet();
        let mut mesh = TetMesh::new(vertices, tets).unwrap();
        mesh.compute_fs();
        assert!((mesh.deformation_gradient(0) - Mat3::identity()).norm() < 1e-12);

        mesh.compute_svds();
        let (u, sigma, v) = mesh.svd(0);
        assert!((u * Mat3::from_diagonal(sigma) * v.transpose() - Mat3::identity()).norm() < 1e-10);
    }

    #[test]
    fn uniform_stretch_shows_up_in_f() {
        let (vertices, tets) = single_tet();
        let mut mesh = TetMesh::new(vertices, tets).unwrap();

        let mut positions = DVec::zeros(mesh.dofs());
        for i in 0..mesh.total_vertices() {
            let v = mesh.rest_vertices()[i];
            positions[3 * i] = 2.0 * v[0];
            positions[3 * i + 1] = v[1];
            positions[3 * i + 2] = v[2];
        }
        mesh.set_positions(&positions);
        mesh.compute_fs();

        let expected = Mat3::from_diagonal(&Vec3::new(2.0, 1.0, 1.0));
        assert!((mesh.deformation_gradient(0) - expected).norm() < 1e-12);
    }

    #[test]
    fn displacement_round_trips() {
        let (vertices, tets) = cube_lattice(2, 1.0, Vec3::zeros());
        let mut mesh = TetMesh::new(vertices, tets).unwrap();

        let mut delta = DVec::zeros(mesh.dofs());
        for i in 0..delta.len() {
            delta[i] = (i as Real * 0.37).sin() * 0.01;
        }
        mesh.set_displacement(&delta);
        assert!((mesh.displacement() - delta).norm() < 1e-12);
    }

    #[test]
    fn one_ring_volumes_sum_to_total() {
        let (vertices, tets) = cube_lattice(2, 1.0, Vec3::zeros());
        let mesh = TetMesh::new(vertices, tets).unwrap();
        let total: Real = mesh.rest_one_ring_volumes().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn inverted_vertices_are_flagged() {
        let (vertices, tets) = single_tet();
        let mut mesh = TetMesh::new(vertices, tets).unwrap();

        // drive the apex through the base plane
        let mut positions = DVec::zeros(mesh.dofs());
        for i in 0..mesh.total_vertices() {
            let v = mesh.rest_vertices()[i];
            positions[3 * i] = v[0];
            positions[3 * i + 1] = v[1];
            positions[3 * i + 2] = v[2];
        }
        positions[3 * 3 + 2] = -1.0;
        mesh.set_positions(&positions);
        mesh.compute_fs();
        mesh.compute_inverted_vertices();

        assert!(mesh.inverted_vertices().iter().all(|&flag| flag));
    }

    #[test]
    fn two_separated_cubes_collide_when_close() {
        // two unit/2 cubes with a gap well under the collision epsilon
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
        mesh.compute_fs();
        mesh.compute_vertex_face_collisions();
        mesh.build_vertex_face_collision_tets();
        mesh.compute_edge_edge_collisions();

        assert!(
            !mesh.vertex_face_collisions().is_empty()
                || !mesh.edge_edge_collisions().is_empty()
        );
    }

    #[test]
    fn rotation_recovers_a_rigid_motion() {
        let (vertices, tets) = cube_lattice(2, 1.0, Vec3::zeros());
        let mut mesh = TetMesh::new(vertices, tets).unwrap();

        let q = nalgebra::Rotation3::from_axis_angle(&nalgebra::Vector3::z_axis(), 0.4)
            .into_inner();
        let mut positions = DVec::zeros(mesh.dofs());
        for i in 0..mesh.total_vertices() {
            let rotated = q * mesh.rest_vertices()[i];
            positions[3 * i] = rotated[0];
            positions[3 * i + 1] = rotated[1];
            positions[3 * i + 2] = rotated[2];
        }
        mesh.set_positions(&positions);

        assert!((mesh.rotation() - q).norm() < 1e-8);
    }
}
