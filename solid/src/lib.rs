//! Implicit FEM core for real-time deformable volumetric solids.
//!
//! This crate simulates tetrahedral meshes with isotropic hyperelastic and
//! damping materials, self- and kinematic collisions, and a velocity-level
//! backward-Euler integrator that solves a projected, preconditioned linear
//! system per step under filter constraints.

pub mod collision;
pub mod io;
pub mod materials;
pub mod math;
pub mod mesh;
pub mod shapes;
pub mod solver;

// Re-export commonly used types
pub mod prelude {
    // Math types
    pub use crate::math::{DVec, Mat3, Mat9, Mat12, Real, Vec2, Vec3, Vec9, Vec12};

    // Material types
    pub use crate::materials::{
        lame_lambda, lame_mu, Arap, Damping, GreenDamping, Hyperelastic, NeoHookeanBw, Snh,
        SnhWithBarrier, StVk,
    };

    // Collision types
    pub use crate::collision::{
        AabbTree, EdgeCollision, EdgeEdgeEnergy, EdgeHybridCollision, EdgeSqrtCollision,
        McAdamsCollision, VertexFaceCollision, VertexFaceEnergy, VertexFaceSqrtCollision,
    };

    // Mesh types
    pub use crate::mesh::{MeshError, TetMesh};

    // Kinematic shape types
    pub use crate::shapes::{Cube, Cylinder, KinematicShape, ShapeFrame, Sphere};

    // Solver types
    pub use crate::solver::{
        BackwardEulerVelocity, KinematicConstraint, PcgSummary, PlaneConstraint, ShapeId,
        SolverConfig,
    };
}

/// Initialize logging for the solver
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
