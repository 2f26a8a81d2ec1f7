//! Baraff-Witkin-style velocity-level backward Euler.
//!
//! Per step the integrator assembles A = M − hC − h²K and
//! b = h (f + hKv + f_ext), then solves the projected system
//! (S A S + S̄) y = S (b − A z) with a preconditioned conjugate gradient,
//! where S filters constrained vertex directions and z carries the
//! constraint targets.

use super::pcg::solve_projected;
use super::{ConstraintFilter, KinematicConstraint, PlaneConstraint};
use crate::materials::{Damping, Hyperelastic};
use crate::math::sparse::SparseMatrix;
use crate::math::{DVec, Real, Vec3};
use crate::mesh::TetMesh;
use crate::shapes::KinematicShape;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Handle to a kinematic shape registered with the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeId(usize);

/// Integrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Fixed timestep (s)
    pub dt: Real,
    /// Rayleigh mass-proportional damping
    pub rayleigh_alpha: Real,
    /// Rayleigh stiffness-proportional damping
    pub rayleigh_beta: Real,
    /// Contact spring stiffness
    pub collision_stiffness: Real,
    /// Contact damping scale on the contact Hessian
    pub collision_damping_beta: Real,
    /// Are vertex-face self-collisions active?
    pub vertex_face_self_collisions: bool,
    /// Are edge-edge self-collisions active?
    pub edge_edge_self_collisions: bool,
    /// Iteration cap for the conjugate-gradient solve
    pub pcg_max_iterations: usize,
    /// Relative residual target for the conjugate-gradient solve
    pub pcg_tolerance: Real,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            rayleigh_alpha: 0.01,
            rayleigh_beta: 0.01,
            collision_stiffness: 1.0,
            collision_damping_beta: 0.001,
            vertex_face_self_collisions: true,
            edge_edge_self_collisions: true,
            pcg_max_iterations: 1000,
            pcg_tolerance: 1e-8,
        }
    }
}

/// The implicit velocity-level integrator. It owns the solver-side state
/// (velocities, constraints, work buffers) and borrows the mesh per step.
pub struct BackwardEulerVelocity {
    dofs: usize,

    material: Box<dyn Hyperelastic>,
    damping: Option<Box<dyn Damping>>,

    config: SolverConfig,

    // diagonal mass (one-ring volumes) and its source data
    mass: DVec,
    one_ring_volumes: Vec<Real>,

    external_forces: DVec,
    position: DVec,
    position_old: DVec,
    velocity: DVec,

    constraint_targets: DVec,
    filter: ConstraintFilter,

    // rest-pose stiffness for the Rayleigh damping matrix, built once
    rest_stiffness: Option<SparseMatrix>,

    shapes: Vec<Box<dyn KinematicShape>>,
    collision_shapes: Vec<ShapeId>,
    kinematic_constraints: Vec<KinematicConstraint>,
    plane_constraints: Vec<PlaneConstraint>,

    // is the vertex already held by a plane constraint?
    in_collision: Vec<bool>,

    seen_pcg_iterations: usize,
    residual: Real,

    time: Real,
    current_timestep: usize,
}

impl BackwardEulerVelocity {
    pub fn new(mesh: &TetMesh, material: Box<dyn Hyperelastic>) -> Self {
        Self::with_config(mesh, material, SolverConfig::default())
    }

    pub fn with_config(
        mesh: &TetMesh,
        material: Box<dyn Hyperelastic>,
        config: SolverConfig,
    ) -> Self {
        let dofs = mesh.dofs();
        let one_ring_volumes = mesh.rest_one_ring_volumes().to_vec();

        // the mass matrix is diagonal, one one-ring volume per vertex
        let mut mass = DVec::zeros(dofs);
        for (vertex, &volume) in one_ring_volumes.iter().enumerate() {
            for k in 0..3 {
                mass[3 * vertex + k] = volume;
            }
        }

        Self {
            dofs,
            material,
            damping: None,
            config,
            mass,
            one_ring_volumes,
            external_forces: DVec::zeros(dofs),
            position: DVec::zeros(dofs),
            position_old: DVec::zeros(dofs),
            velocity: DVec::zeros(dofs),
            constraint_targets: DVec::zeros(dofs),
            filter: ConstraintFilter::identity(dofs / 3),
            rest_stiffness: None,
            shapes: Vec::new(),
            collision_shapes: Vec::new(),
            kinematic_constraints: Vec::new(),
            plane_constraints: Vec::new(),
            in_collision: vec![false; dofs / 3],
            seen_pcg_iterations: 0,
            residual: Real::MAX,
            time: 0.0,
            current_timestep: 0,
        }
    }

    /// Use an energy-based damping material instead of Rayleigh damping.
    pub fn with_damping(
        mesh: &TetMesh,
        material: Box<dyn Hyperelastic>,
        damping: Box<dyn Damping>,
    ) -> Self {
        let mut solver = Self::new(mesh, material);
        solver.damping = Some(damping);
        solver
    }

    // ------------------------------------------------------------------
    // configuration
    // ------------------------------------------------------------------

    pub fn set_timestep(&mut self, dt: Real) {
        self.config.dt = dt;
    }

    pub fn dt(&self) -> Real {
        self.config.dt
    }

    pub fn set_rayleigh(&mut self, alpha: Real, beta: Real) {
        self.config.rayleigh_alpha = alpha;
        self.config.rayleigh_beta = beta;
    }

    pub fn set_collision_stiffness(&mut self, stiffness: Real) {
        self.config.collision_stiffness = stiffness;
    }

    pub fn set_collision_damping_beta(&mut self, beta: Real) {
        self.config.collision_damping_beta = beta;
    }

    pub fn set_vertex_face_self_collisions(&mut self, on: bool) {
        self.config.vertex_face_self_collisions = on;
    }

    pub fn set_edge_edge_self_collisions(&mut self, on: bool) {
        self.config.edge_edge_self_collisions = on;
    }

    pub fn set_pcg_parameters(&mut self, max_iterations: usize, tolerance: Real) {
        self.config.pcg_max_iterations = max_iterations;
        self.config.pcg_tolerance = tolerance;
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Make everything lighter or heavier.
    pub fn scale_mass(&mut self, scalar: Real) {
        self.mass *= scalar;
    }

    // ------------------------------------------------------------------
    // state access
    // ------------------------------------------------------------------

    pub fn position(&self) -> &DVec {
        &self.position
    }

    pub fn position_mut(&mut self) -> &mut DVec {
        &mut self.position
    }

    pub fn position_old(&self) -> &DVec {
        &self.position_old
    }

    pub fn velocity(&self) -> &DVec {
        &self.velocity
    }

    pub fn velocity_mut(&mut self) -> &mut DVec {
        &mut self.velocity
    }

    pub fn external_forces_mut(&mut self) -> &mut DVec {
        &mut self.external_forces
    }

    pub fn vertex_velocity(&self, vertex: usize) -> Vec3 {
        Vec3::new(
            self.velocity[3 * vertex],
            self.velocity[3 * vertex + 1],
            self.velocity[3 * vertex + 2],
        )
    }

    pub fn plane_constraints(&self) -> &[PlaneConstraint] {
        &self.plane_constraints
    }

    pub fn kinematic_constraints(&self) -> &[KinematicConstraint] {
        &self.kinematic_constraints
    }

    pub fn pcg_iterations(&self) -> usize {
        self.seen_pcg_iterations
    }

    pub fn pcg_residual(&self) -> Real {
        self.residual
    }

    pub fn time(&self) -> Real {
        self.time
    }

    // ------------------------------------------------------------------
    // shapes, gravity, constraints
    // ------------------------------------------------------------------

    pub fn add_shape(&mut self, shape: Box<dyn KinematicShape>) -> ShapeId {
        self.shapes.push(shape);
        ShapeId(self.shapes.len() - 1)
    }

    pub fn shape(&self, id: ShapeId) -> &dyn KinematicShape {
        &*self.shapes[id.0]
    }

    pub fn shape_mut(&mut self, id: ShapeId) -> &mut dyn KinematicShape {
        &mut *self.shapes[id.0]
    }

    /// Register a shape for kinematic collision constraints.
    pub fn add_kinematic_collision_object(&mut self, id: ShapeId) {
        if self.collision_shapes.contains(&id) {
            warn!("Tried to add the same kinematic shape twice");
            return;
        }
        self.collision_shapes.push(id);
    }

    /// Accumulate a gravity body force, weighted by one-ring volume.
    pub fn add_gravity(&mut self, body_force: &Vec3) {
        for (vertex, &volume) in self.one_ring_volumes.iter().enumerate() {
            for k in 0..3 {
                self.external_forces[3 * vertex + k] += volume * body_force[k];
            }
        }
    }

    /// Pin a single vertex to its current location on a shape.
    pub fn add_kinematic_constraint(&mut self, constraint: KinematicConstraint) {
        self.kinematic_constraints.push(constraint);
    }

    /// Pin every vertex currently inside the shape to move along with it.
    pub fn attach_kinematic_constraints(&mut self, mesh: &TetMesh, id: ShapeId) {
        let shape = &*self.shapes[id.0];
        for (vertex, position) in mesh.vertices().iter().enumerate() {
            if !shape.inside(position) {
                continue;
            }
            self.kinematic_constraints.push(KinematicConstraint {
                shape: id,
                vertex,
                local_position: shape.world_vertex_to_local(position),
            });
        }
    }

    /// Pin the surface vertices currently inside the shape.
    pub fn attach_kinematic_surface_constraints(&mut self, mesh: &TetMesh, id: ShapeId) {
        let shape = &*self.shapes[id.0];
        for &vertex in mesh.surface_vertices() {
            let position = &mesh.vertices()[vertex];
            if !shape.inside(position) {
                continue;
            }
            self.kinematic_constraints.push(KinematicConstraint {
                shape: id,
                vertex,
                local_position: shape.world_vertex_to_local(position),
            });
        }
    }

    pub fn add_plane_constraint(&mut self, constraint: PlaneConstraint) {
        self.in_collision[constraint.vertex] = true;
        self.plane_constraints.push(constraint);
    }

    pub fn clear_plane_constraints(&mut self) {
        for constraint in &self.plane_constraints {
            self.in_collision[constraint.vertex] = false;
        }
        self.plane_constraints.clear();
    }

    /// The unique kinematically pinned vertices.
    pub fn constrained_nodes(&self) -> Vec<usize> {
        let mut nodes: Vec<usize> = self
            .kinematic_constraints
            .iter()
            .map(|c| c.vertex)
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    // ------------------------------------------------------------------
    // constraint lifecycle
    // ------------------------------------------------------------------

    // pin the positions of kinematically constrained vertices
    fn apply_kinematic_constraints(&mut self, mesh: &TetMesh) {
        for constraint in &self.kinematic_constraints {
            let shape = &*self.shapes[constraint.shape.0];
            let world = shape.local_vertex_to_world(&constraint.local_position);
            let diff = world - mesh.rest_vertices()[constraint.vertex];
            for k in 0..3 {
                self.position[3 * constraint.vertex + k] = diff[k];
            }
        }
    }

    // scan the collision shapes for surface vertices that just landed
    fn find_new_surface_constraints(&mut self, mesh: &TetMesh) {
        let mut fresh = Vec::new();
        for &id in &self.collision_shapes {
            let shape = &*self.shapes[id.0];
            for &vertex in mesh.surface_vertices() {
                if self.in_collision[vertex] {
                    continue;
                }
                let position = &mesh.vertices()[vertex];
                if !shape.inside(position) {
                    continue;
                }

                let (closest_point, local_normal) = shape.closest_point(position);

                // a velocity already pulling away should not be constrained
                let normal = shape.local_normal_to_world(&local_normal);
                let separation = self.vertex_velocity(vertex).dot(&normal);
                if separation >= -Real::EPSILON {
                    continue;
                }

                fresh.push(PlaneConstraint {
                    shape: id,
                    vertex,
                    local_closest_point: closest_point,
                    local_normal,
                    is_separating: false,
                });
            }
        }

        if !fresh.is_empty() {
            debug!("Found {} new surface constraints", fresh.len());
        }
        for constraint in fresh {
            self.add_plane_constraint(constraint);
        }
    }

    // assemble the per-vertex filter blocks; kinematic pins override planes
    fn build_constraint_filter(&mut self) {
        self.filter.clear();
        for constraint in &self.plane_constraints {
            if constraint.is_separating {
                continue;
            }
            let shape = &*self.shapes[constraint.shape.0];
            let normal = shape.local_normal_to_world(&constraint.local_normal);
            self.filter.set_plane(constraint.vertex, &normal);
        }
        for constraint in &self.kinematic_constraints {
            self.filter.set_zero(constraint.vertex);
        }
    }

    // the desired velocity change at each plane-constrained vertex: close
    // the gap to the closest point in one step
    fn update_constraint_targets(&mut self, mesh: &TetMesh) {
        self.constraint_targets.fill(0.0);
        for constraint in &self.plane_constraints {
            if constraint.is_separating {
                continue;
            }
            let shape = &*self.shapes[constraint.shape.0];
            let closest = shape.local_vertex_to_world(&constraint.local_closest_point);
            let x_delta = closest - mesh.vertices()[constraint.vertex];
            let v_delta = x_delta / self.config.dt - self.vertex_velocity(constraint.vertex);
            for k in 0..3 {
                self.constraint_targets[3 * constraint.vertex + k] = v_delta[k];
            }
        }
    }

    // refresh the closest points; separation is judged elsewhere
    fn update_surface_constraints(&mut self, mesh: &TetMesh) {
        let shapes = &self.shapes;
        for constraint in &mut self.plane_constraints {
            let shape = &*shapes[constraint.shape.0];
            let (closest_point, local_normal) =
                shape.closest_point(&mesh.vertices()[constraint.vertex]);
            constraint.local_closest_point = closest_point;
            constraint.local_normal = local_normal;
        }
    }

    // mark constraints whose vertex left the shape, or whose unfiltered
    // update points away from the surface
    fn find_separating_surface_constraints(&mut self, mesh: &TetMesh, unfiltered: &DVec) -> bool {
        let mut changed = false;
        let shapes = &self.shapes;
        for constraint in &mut self.plane_constraints {
            let shape = &*shapes[constraint.shape.0];
            let vertex = &mesh.vertices()[constraint.vertex];

            // clearly outside: let go
            if shape.signed_distance(vertex) > 1e-6 {
                constraint.is_separating = true;
                changed = true;
                continue;
            }

            let index = 3 * constraint.vertex;
            let mut direction = Vec3::new(
                unfiltered[index],
                unfiltered[index + 1],
                unfiltered[index + 2],
            );

            // direction only; a large force should not skew the threshold
            if direction.norm() > 1.0 {
                direction = direction.normalize();
            }

            let normal = shape.local_normal_to_world(&constraint.local_normal);
            if direction.dot(&normal) > 1e-6 {
                constraint.is_separating = true;
                changed = true;
            }
        }
        changed
    }

    fn delete_surface_constraints(&mut self) {
        let constraints = std::mem::take(&mut self.plane_constraints);
        let mut deleted = 0;
        for constraint in constraints {
            if constraint.is_separating {
                self.in_collision[constraint.vertex] = false;
                deleted += 1;
            } else {
                self.plane_constraints.push(constraint);
            }
        }
        if deleted > 0 {
            debug!("Deleted {} surface constraints", deleted);
        }
    }

    // ------------------------------------------------------------------
    // the step
    // ------------------------------------------------------------------

    // C = alpha M + beta K0, with the rest stiffness built once
    fn rayleigh_damping_matrix(&mut self, mesh: &mut TetMesh) -> SparseMatrix {
        if self.rest_stiffness.is_none() {
            let saved = mesh.displacement();
            mesh.set_displacement(&DVec::zeros(self.dofs));
            mesh.compute_fs();
            mesh.compute_svds();
            let k0 = mesh.hyperelastic_clamped_hessian(&*self.material);
            mesh.set_displacement(&saved);
            info!("Cached rest-pose stiffness for Rayleigh damping");
            self.rest_stiffness = Some(k0);
        }

        let k0 = self
            .rest_stiffness
            .as_ref()
            .expect("rest stiffness cached above");
        SparseMatrix::linear_combination(
            Some((self.config.rayleigh_alpha, &self.mass)),
            &[(self.config.rayleigh_beta, k0)],
        )
    }

    fn compute_collision_detection(&self, mesh: &mut TetMesh) {
        mesh.set_collision_stiffness(self.config.collision_stiffness);
        if self.config.vertex_face_self_collisions {
            mesh.compute_vertex_face_collisions();
            mesh.build_vertex_face_collision_tets();
        }
        if self.config.edge_edge_self_collisions {
            mesh.compute_edge_edge_collisions();
        }
    }

    /// Advance one timestep. Always returns true; an inaccurate PCG solve
    /// is logged and the (possibly sloppy) state advances anyway.
    pub fn solve(&mut self, mesh: &mut TetMesh) -> bool {
        debug_assert_eq!(mesh.dofs(), self.dofs);
        debug!(
            "Backward Euler velocity step {} (t = {:.4})",
            self.current_timestep, self.time
        );
        let dt = self.config.dt;

        // the Rayleigh matrix needs the rest pose, so build it before the
        // mesh moves to this step's positions
        let mut rayleigh = None;
        if self.damping.is_none() {
            rayleigh = Some(self.rayleigh_damping_matrix(mesh));
        }

        self.position_old.copy_from(&self.position);
        self.apply_kinematic_constraints(mesh);

        // new constraints are found before the solve; separating ones are
        // deleted after it, once the unfiltered right-hand side is known
        self.find_new_surface_constraints(mesh);
        self.build_constraint_filter();

        mesh.set_displacement(&self.position);
        mesh.compute_fs();
        mesh.compute_svds();
        if self.damping.is_some() {
            mesh.compute_fdots(&self.velocity);
        }

        self.compute_collision_detection(mesh);

        // z holds the desired changes at constrained directions, with the
        // kinematic part already projected off
        self.update_constraint_targets(mesh);
        let z = self.filter.apply_complement(&self.constraint_targets);

        let mut forces = mesh.internal_forces(&*self.material, self.damping.as_deref());
        let k_elastic = mesh.hyperelastic_clamped_hessian(&*self.material);
        let c_material = match &self.damping {
            Some(damping) => mesh.damping_hessian(&**damping),
            None => rayleigh.take().expect("Rayleigh matrix built above"),
        };

        // contact forces and Hessians; contacts damp through beta_c
        let collision_vf = self.config.vertex_face_self_collisions.then(|| {
            (
                mesh.vertex_face_collision_forces(),
                mesh.vertex_face_collision_clamped_hessian(),
            )
        });
        let collision_ee = self.config.edge_edge_self_collisions.then(|| {
            (
                mesh.edge_edge_collision_forces(),
                mesh.edge_edge_collision_clamped_hessian(),
            )
        });

        let beta_c = self.config.collision_damping_beta;
        let mut k_terms: Vec<(Real, &SparseMatrix)> = vec![(1.0, &k_elastic)];
        let mut c_terms: Vec<(Real, &SparseMatrix)> = vec![(1.0, &c_material)];
        if let Some((collision_forces, hessian)) = &collision_vf {
            forces += collision_forces;
            k_terms.push((1.0, hessian));
            c_terms.push((beta_c, hessian));
        }
        if let Some((collision_forces, hessian)) = &collision_ee {
            forces += collision_forces;
            k_terms.push((1.0, hessian));
            c_terms.push((beta_c, hessian));
        }
        let k = SparseMatrix::linear_combination(None, &k_terms);
        let c = SparseMatrix::linear_combination(None, &c_terms);

        // b = h (f + h K v + f_ext), Eqn. 18 in [BW98]
        let mut b = k.mul_vec(&self.velocity) * dt;
        b += &forces;
        b += &self.external_forces;
        b *= dt;

        // A = M - h C - h^2 K
        let a = SparseMatrix::linear_combination(
            Some((1.0, &self.mass)),
            &[(-dt, &c), (-dt * dt, &k)],
        );

        // from [TJM15]: solve against c = b - A z, then add z back
        let projected_rhs = self.filter.apply(&(&b - a.mul_vec(&z)));
        let (y, summary) = solve_projected(
            &a,
            &self.filter,
            &projected_rhs,
            self.config.pcg_tolerance,
            self.config.pcg_max_iterations,
        );
        self.seen_pcg_iterations = summary.iterations;
        self.residual = summary.residual;
        if summary.converged {
            debug!(
                "PCG iters: {}, err: {:.3e}",
                summary.iterations, summary.residual
            );
        } else {
            warn!(
                "PCG did not converge: {} iters, err {:.3e}; advancing anyway",
                summary.iterations, summary.residual
            );
        }

        let v_delta = y + z;
        self.velocity += &v_delta;
        self.position.axpy(dt, &self.velocity, 1.0);

        // S-projection only. The full update would also pick up the
        // kinematic object's velocity in the constrained direction; that
        // S-bar transport is a known limitation.
        self.velocity = self.filter.apply(&self.velocity);

        // deletion consults the unfiltered pre-solve right-hand side so the
        // direction-of-force information survives the filter
        let constraints_changed = self.find_separating_surface_constraints(mesh, &b);
        if constraints_changed {
            self.delete_surface_constraints();
        }
        self.update_surface_constraints(mesh);
        self.build_constraint_filter();
        self.update_constraint_targets(mesh);

        mesh.set_displacement(&self.position);

        self.time += dt;
        self.current_timestep += 1;
        true
    }
}
