//! Kinematic collision shapes.
//!
//! Shape positions are defined by the frame R · S · x + t from unit local
//! geometry; the core never assumes anything about a shape beyond the
//! [`KinematicShape`] trait.

mod cube;
mod cylinder;
mod sphere;

pub use cube::Cube;
pub use cylinder::Cylinder;
pub use sphere::Sphere;

use crate::math::{Mat3, Real, Vec3};

/// The rigid frame of a kinematic shape: world = R · S · local + t.
#[derive(Debug, Clone)]
pub struct ShapeFrame {
    pub scale: Mat3,
    pub scale_inverse: Mat3,
    pub rotation: Mat3,
    pub translation: Vec3,
}

impl ShapeFrame {
    pub fn new(translation: Vec3, scale: Real) -> Self {
        let scale_matrix = Mat3::identity() * scale;
        Self {
            scale: scale_matrix,
            scale_inverse: Mat3::identity() * (1.0 / scale),
            rotation: Mat3::identity(),
            translation,
        }
    }

    pub fn set_rotation(&mut self, rotation: Mat3) {
        self.rotation = rotation;
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
    }
}

/// Interface the integrator consumes for kinematic constraints and
/// collisions.
pub trait KinematicShape: Send + Sync {
    fn name(&self) -> &'static str;

    fn frame(&self) -> &ShapeFrame;
    fn frame_mut(&mut self) -> &mut ShapeFrame;

    /// Is the world-space point inside the shape?
    fn inside(&self, point: &Vec3) -> bool;

    /// Unsigned distance to the surface.
    fn distance(&self, point: &Vec3) -> Real;

    /// Signed distance to the surface; inside is negative.
    fn signed_distance(&self, point: &Vec3) -> Real;

    /// Closest surface point and outward normal, both in local coordinates.
    fn closest_point(&self, query: &Vec3) -> (Vec3, Vec3);

    fn local_vertex_to_world(&self, local: &Vec3) -> Vec3 {
        let frame = self.frame();
        frame.rotation * frame.scale * local + frame.translation
    }

    fn world_vertex_to_local(&self, world: &Vec3) -> Vec3 {
        let frame = self.frame();
        frame.scale_inverse * frame.rotation.transpose() * (world - frame.translation)
    }

    fn local_normal_to_world(&self, normal: &Vec3) -> Vec3 {
        self.frame().rotation * normal
    }
}
