//! Contact geometry kernels, contact energies, and the bounding-volume
//! trees that accelerate proximity queries.

pub mod aabb;
pub mod edge_edge;
pub mod kernels;
pub mod vertex_face;

pub use aabb::{AabbNode, AabbTree};
pub use edge_edge::{EdgeCollision, EdgeEdgeEnergy, EdgeHybridCollision, EdgeSqrtCollision};
pub use vertex_face::{
    McAdamsCollision, VertexFaceCollision, VertexFaceEnergy, VertexFaceSqrtCollision,
};
