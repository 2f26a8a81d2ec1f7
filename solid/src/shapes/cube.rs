//! Axis-aligned unit cube under a rigid frame: local extents are
//! [-0.5, 0.5] along each axis.

use super::{KinematicShape, ShapeFrame};
use crate::math::{Real, Vec3};

#[derive(Debug, Clone)]
pub struct Cube {
    frame: ShapeFrame,
}

impl Cube {
    pub fn new(center: Vec3, scale: Real) -> Self {
        Self {
            frame: ShapeFrame::new(center, scale),
        }
    }

    pub fn with_frame(frame: ShapeFrame) -> Self {
        Self { frame }
    }

    // per-axis overshoot outside the local unit box
    fn outside_diff(local: &Vec3) -> Vec3 {
        let mut diff = Vec3::zeros();
        for x in 0..3 {
            if local[x] > 0.5 {
                diff[x] = local[x] - 0.5;
            } else if local[x] < -0.5 {
                diff[x] = -0.5 - local[x];
            }
        }
        diff
    }

    fn inside_depth(local: &Vec3) -> Real {
        let mut depth = Real::MAX;
        for x in 0..3 {
            depth = depth.min(0.5 - local[x]).min(local[x] + 0.5);
        }
        depth.abs()
    }
}

impl KinematicShape for Cube {
    fn name(&self) -> &'static str {
        "Cube"
    }

    fn frame(&self) -> &ShapeFrame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut ShapeFrame {
        &mut self.frame
    }

    fn inside(&self, point: &Vec3) -> bool {
        let local = self.world_vertex_to_local(point);
        local.iter().all(|&x| (-0.5..=0.5).contains(&x))
    }

    fn distance(&self, point: &Vec3) -> Real {
        let local = self.world_vertex_to_local(point);
        if self.inside(point) {
            return Self::inside_depth(&local) * self.frame.scale[(0, 0)];
        }
        Self::outside_diff(&local).norm() * self.frame.scale[(0, 0)]
    }

    fn signed_distance(&self, point: &Vec3) -> Real {
        let local = self.world_vertex_to_local(point);
        if self.inside(point) {
            return -Self::inside_depth(&local) * self.frame.scale[(0, 0)];
        }
        Self::outside_diff(&local).norm() * self.frame.scale[(0, 0)]
    }

    fn closest_point(&self, query: &Vec3) -> (Vec3, Vec3) {
        let local = self.world_vertex_to_local(query);

        // distances to all six faces; the closest wins
        let diffs = [
            0.5 + local[0],
            0.5 - local[0],
            0.5 + local[1],
            0.5 - local[1],
            0.5 + local[2],
            0.5 - local[2],
        ];

        let mut min_index = 0;
        for x in 1..6 {
            if diffs[x] < diffs[min_index] {
                min_index = x;
            }
        }

        let axis = min_index / 2;
        let positive_face = min_index % 2 == 1;

        let mut closest = local;
        closest[axis] = if positive_face { 0.5 } else { -0.5 };

        let mut normal = Vec3::zeros();
        normal[axis] = if positive_face { 1.0 } else { -1.0 };

        (closest, normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_and_distance() {
        let cube = Cube::new(Vec3::new(0.0, 0.0, 0.0), 2.0);

        assert!(cube.inside(&Vec3::new(0.0, 0.9, 0.0)));
        assert!(!cube.inside(&Vec3::new(0.0, 1.1, 0.0)));

        // world half-extent is 1.0
        assert!((cube.signed_distance(&Vec3::new(0.0, 2.0, 0.0)) - 1.0).abs() < 1e-12);
        assert!(cube.signed_distance(&Vec3::new(0.0, 0.9, 0.0)) < 0.0);
    }

    #[test]
    fn closest_point_picks_the_nearest_face() {
        let cube = Cube::new(Vec3::zeros(), 2.0);

        let (closest, normal) = cube.closest_point(&Vec3::new(0.1, 0.9, 0.0));
        assert_eq!(normal, Vec3::new(0.0, 1.0, 0.0));
        assert!((closest - Vec3::new(0.05, 0.5, 0.0)).norm() < 1e-12);

        let world = cube.local_vertex_to_world(&closest);
        assert!((world - Vec3::new(0.1, 1.0, 0.0)).norm() < 1e-12);
    }
}
