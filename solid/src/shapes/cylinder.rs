//! Capped cylinder under a rigid frame: local radius 1 in the x-z plane,
//! local height 1 along y.

use super::{KinematicShape, ShapeFrame};
use crate::math::{Real, Vec3};

#[derive(Debug, Clone)]
pub struct Cylinder {
    frame: ShapeFrame,
    radius: Real,
    height: Real,
}

impl Cylinder {
    pub fn new(center: Vec3, radius: Real, height: Real) -> Self {
        Self {
            frame: ShapeFrame::new(center, 1.0),
            radius,
            height,
        }
    }

    fn radius_xz(local: &Vec3) -> Real {
        (local[0] * local[0] + local[2] * local[2]).sqrt()
    }
}

impl KinematicShape for Cylinder {
    fn name(&self) -> &'static str {
        "Cylinder"
    }

    fn frame(&self) -> &ShapeFrame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut ShapeFrame {
        &mut self.frame
    }

    fn inside(&self, point: &Vec3) -> bool {
        let local = self.world_vertex_to_local(point);

        // above or below the endcaps means outside
        if local[1] > 0.5 * self.height || local[1] < -0.5 * self.height {
            return false;
        }
        Self::radius_xz(&local) <= self.radius
    }

    fn distance(&self, point: &Vec3) -> Real {
        let local = self.world_vertex_to_local(point);
        let radius = Self::radius_xz(&local);

        let circular = (radius - self.radius).abs();
        let top = (0.5 * self.height - local[1]).abs();
        let bottom = (local[1] + 0.5 * self.height).abs();

        // inside the endcap slabs
        if local[1] < 0.5 * self.height && local[1] > -0.5 * self.height {
            if radius > self.radius {
                return circular;
            }
            return circular.min(top).min(bottom);
        }

        // outside the slabs, within the endcap radius
        if radius <= self.radius {
            return top.min(bottom);
        }

        // outside both: distance to the endcap lip
        let top_corner = (circular * circular + top * top).sqrt();
        let bottom_corner = (circular * circular + bottom * bottom).sqrt();
        top_corner.min(bottom_corner)
    }

    fn signed_distance(&self, point: &Vec3) -> Real {
        let sign = if self.inside(point) { -1.0 } else { 1.0 };
        sign * self.distance(point)
    }

    fn closest_point(&self, query: &Vec3) -> (Vec3, Vec3) {
        let local = self.world_vertex_to_local(query);
        let radius = Self::radius_xz(&local);
        let half_height = 0.5 * self.height;

        let on_wall = |local: &Vec3| {
            let mut closest = *local;
            closest[0] *= self.radius / radius;
            closest[2] *= self.radius / radius;
            let normal = Vec3::new(closest[0], 0.0, closest[2]).normalize();
            (closest, normal)
        };

        if !self.inside(query) {
            // between the endcap slabs: project to the circular wall
            if local[1] <= half_height && local[1] >= -half_height {
                return on_wall(&local);
            }

            // above or below: clamp to the cap, or to its lip when the
            // point sits outside the cap radius
            let mut closest = local;
            if radius > self.radius {
                closest[0] *= self.radius / radius;
                closest[2] *= self.radius / radius;
            }
            if local[1] > half_height {
                closest[1] = half_height;
                return (closest, Vec3::new(0.0, 1.0, 0.0));
            }
            closest[1] = -half_height;
            return (closest, Vec3::new(0.0, -1.0, 0.0));
        }

        // inside: the wall, unless an endcap is closer
        let wall_distance = self.radius - radius;
        let top_distance = half_height - local[1];
        let bottom_distance = local[1] + half_height;

        if top_distance < wall_distance && top_distance <= bottom_distance {
            let mut closest = local;
            closest[1] = half_height;
            return (closest, Vec3::new(0.0, 1.0, 0.0));
        }
        if bottom_distance < wall_distance {
            let mut closest = local;
            closest[1] = -half_height;
            return (closest, Vec3::new(0.0, -1.0, 0.0));
        }
        on_wall(&local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_and_distance() {
        let cylinder = Cylinder::new(Vec3::zeros(), 1.0, 2.0);

        assert!(cylinder.inside(&Vec3::new(0.5, 0.5, 0.0)));
        assert!(!cylinder.inside(&Vec3::new(0.5, 1.5, 0.0)));
        assert!(!cylinder.inside(&Vec3::new(1.5, 0.0, 0.0)));

        assert!((cylinder.distance(&Vec3::new(2.0, 0.0, 0.0)) - 1.0).abs() < 1e-12);
        assert!((cylinder.distance(&Vec3::new(0.0, 2.0, 0.0)) - 1.0).abs() < 1e-12);
        assert!((cylinder.signed_distance(&Vec3::new(0.9, 0.0, 0.0)) + 0.1).abs() < 1e-12);
    }

    #[test]
    fn closest_point_on_the_wall_and_caps() {
        let cylinder = Cylinder::new(Vec3::zeros(), 1.0, 2.0);

        let (closest, normal) = cylinder.closest_point(&Vec3::new(2.0, 0.0, 0.0));
        assert!((closest - Vec3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
        assert!((normal - Vec3::new(1.0, 0.0, 0.0)).norm() < 1e-12);

        let (closest, normal) = cylinder.closest_point(&Vec3::new(0.2, 3.0, 0.0));
        assert!((closest - Vec3::new(0.2, 1.0, 0.0)).norm() < 1e-12);
        assert!((normal - Vec3::new(0.0, 1.0, 0.0)).norm() < 1e-12);

        // just inside the wall
        let (closest, _) = cylinder.closest_point(&Vec3::new(0.9, 0.0, 0.0));
        assert!((closest - Vec3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
    }
}
