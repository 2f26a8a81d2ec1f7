//! Unit sphere under a rigid frame.

use super::{KinematicShape, ShapeFrame};
use crate::math::{Real, Vec3};

#[derive(Debug, Clone)]
pub struct Sphere {
    frame: ShapeFrame,
}

impl Sphere {
    pub fn new(center: Vec3, scale: Real) -> Self {
        Self {
            frame: ShapeFrame::new(center, scale),
        }
    }

    pub fn with_frame(frame: ShapeFrame) -> Self {
        Self { frame }
    }
}

impl KinematicShape for Sphere {
    fn name(&self) -> &'static str {
        "Sphere"
    }

    fn frame(&self) -> &ShapeFrame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut ShapeFrame {
        &mut self.frame
    }

    fn inside(&self, point: &Vec3) -> bool {
        self.world_vertex_to_local(point).norm() < 1.0
    }

    fn distance(&self, point: &Vec3) -> Real {
        let radius = self.world_vertex_to_local(point).norm();
        (radius - 1.0).abs() * self.frame.scale[(0, 0)]
    }

    fn signed_distance(&self, point: &Vec3) -> Real {
        let radius = self.world_vertex_to_local(point).norm();
        (radius - 1.0) * self.frame.scale[(0, 0)]
    }

    fn closest_point(&self, query: &Vec3) -> (Vec3, Vec3) {
        let local = self.world_vertex_to_local(query);
        let closest = local.normalize();

        // the one shape where the closest point doubles as its own normal
        (closest, closest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_and_signed_distance() {
        let sphere = Sphere::new(Vec3::new(1.0, 0.0, 0.0), 2.0);

        assert!(sphere.inside(&Vec3::new(1.0, 1.5, 0.0)));
        assert!(!sphere.inside(&Vec3::new(1.0, 2.5, 0.0)));

        assert!((sphere.signed_distance(&Vec3::new(1.0, 3.0, 0.0)) - 1.0).abs() < 1e-12);
        assert!((sphere.signed_distance(&Vec3::new(1.0, 1.0, 0.0)) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn closest_point_lies_on_the_surface() {
        let sphere = Sphere::new(Vec3::zeros(), 2.0);
        let (closest, normal) = sphere.closest_point(&Vec3::new(0.5, 0.5, 0.0));

        assert!((closest.norm() - 1.0).abs() < 1e-12);
        assert_eq!(closest, normal);

        let world = sphere.local_vertex_to_world(&closest);
        assert!((world.norm() - 2.0).abs() < 1e-12);
    }
}
