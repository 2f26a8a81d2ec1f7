//! Closed-form geometry kernels shared by the contact energies and the
//! narrow-phase collision tests.
//!
//! Vertex-face quantities operate on a packed 12-vector of four vertices
//! where slot 0 is the colliding vertex and slots 1-3 are the face in
//! reversed orientation. Edge-edge quantities pack the first edge into
//! slots 0-1 and the second into slots 2-3.

use crate::math::{Mat12, Mat3, Mat3x12, Real, Vec2, Vec3, Vec12};

/// Pack four vertices into a 12-vector.
pub fn flatten_vertices(v: &[Vec3; 4]) -> Vec12 {
    let mut x = Vec12::zeros();
    for i in 0..4 {
        x[3 * i] = v[i][0];
        x[3 * i + 1] = v[i][1];
        x[3 * i + 2] = v[i][2];
    }
    x
}

/// Unpack a 12-vector into four vertices.
pub fn unflatten_vertices(x: &Vec12) -> [Vec3; 4] {
    let mut v = [Vec3::zeros(); 4];
    for i in 0..4 {
        v[i] = Vec3::new(x[3 * i], x[3 * i + 1], x[3 * i + 2]);
    }
    v
}

/// The edge vectors of the vertex-face configuration:
/// e₀ = v₃ − v₂, e₁ = v₀ − v₂ (points at the colliding vertex), e₂ = v₁ − v₂.
pub fn vf_edges(v: &[Vec3; 4]) -> [Vec3; 3] {
    [v[3] - v[2], v[0] - v[2], v[1] - v[2]]
}

/// The edge vectors of the edge-edge configuration:
/// e₀ = v₁ − v₀, e₁ = v₃ − v₂.
pub fn ee_edges(v: &[Vec3; 4]) -> [Vec3; 2] {
    [v[1] - v[0], v[3] - v[2]]
}

fn skew(a: &Vec3) -> Mat3 {
    Mat3::new(0.0, -a[2], a[1], a[2], 0.0, -a[0], -a[1], a[0], 0.0)
}

// ∂e/∂xᵢ for an edge e = v_plus − v_minus of the packed 12-vector.
fn edge_partial(plus_vertex: usize, minus_vertex: usize, i: usize) -> Vec3 {
    let vertex = i / 3;
    let mut partial = Vec3::zeros();
    if vertex == plus_vertex {
        partial[i % 3] = 1.0;
    } else if vertex == minus_vertex {
        partial[i % 3] = -1.0;
    }
    partial
}

/// Gradient of the unnormalised cross product z = e₂ × e₀, vertex-face case.
pub fn cross_gradient_vf(e: &[Vec3; 3]) -> Mat3x12 {
    let mut grad = Mat3x12::zeros();
    // z depends on e2 = v1 - v2 and e0 = v3 - v2; v0 does not appear
    grad.fixed_view_mut::<3, 3>(0, 3).copy_from(&(-skew(&e[0])));
    grad.fixed_view_mut::<3, 3>(0, 6)
        .copy_from(&(skew(&e[0]) - skew(&e[2])));
    grad.fixed_view_mut::<3, 3>(0, 9).copy_from(&skew(&e[2]));
    grad
}

/// Gradient of the unnormalised cross product z = e₁ × e₀, edge-edge case.
pub fn cross_gradient_ee(e: &[Vec3; 2]) -> Mat3x12 {
    let mut grad = Mat3x12::zeros();
    grad.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-skew(&e[1])));
    grad.fixed_view_mut::<3, 3>(0, 3).copy_from(&skew(&e[1]));
    grad.fixed_view_mut::<3, 3>(0, 6).copy_from(&skew(&e[0]));
    grad.fixed_view_mut::<3, 3>(0, 9).copy_from(&(-skew(&e[0])));
    grad
}

/// One entry of the constant rank-3 Hessian of the vertex-face cross
/// product; all entries lie in {-1, 0, +1}.
pub fn cross_hessian_vf(i: usize, j: usize) -> Vec3 {
    // z = e2 × e0 with e2 = v1 - v2 and e0 = v3 - v2
    edge_partial(1, 2, i).cross(&edge_partial(3, 2, j))
        + edge_partial(1, 2, j).cross(&edge_partial(3, 2, i))
}

/// One entry of the constant rank-3 Hessian of the edge-edge cross product.
pub fn cross_hessian_ee(i: usize, j: usize) -> Vec3 {
    // z = e1 × e0 with e1 = v3 - v2 and e0 = v1 - v0
    edge_partial(3, 2, i).cross(&edge_partial(1, 0, j))
        + edge_partial(3, 2, j).cross(&edge_partial(1, 0, i))
}

fn normalized_gradient(z: &Vec3, z_grad: &Mat3x12) -> Mat3x12 {
    let norm = z.norm();
    let inv_norm = 1.0 / norm;
    let inv_norm3 = inv_norm * inv_norm * inv_norm;

    let mut result = Mat3x12::zeros();
    for i in 0..12 {
        let column: Vec3 = z_grad.column(i).into();
        result.set_column(i, &(inv_norm * column - (z.dot(&column) * inv_norm3) * z));
    }
    result
}

/// Gradient of the unit triangle normal n = (e₂ × e₀)/‖e₂ × e₀‖.
pub fn normal_gradient_vf(e: &[Vec3; 3]) -> Mat3x12 {
    let z = e[2].cross(&e[0]);
    normalized_gradient(&z, &cross_gradient_vf(e))
}

/// Gradient of the unit edge-edge normal n = (e₁ × e₀)/‖e₁ × e₀‖.
pub fn normal_gradient_ee(e: &[Vec3; 2]) -> Mat3x12 {
    let z = e[1].cross(&e[0]);
    normalized_gradient(&z, &cross_gradient_ee(e))
}

fn normalized_hessian(
    z: &Vec3,
    z_grad: &Mat3x12,
    z_hessian: impl Fn(usize, usize) -> Vec3,
) -> [Mat12; 3] {
    let norm_sq = z.dot(z);
    let inv_norm = 1.0 / norm_sq.sqrt();
    let denom15 = norm_sq.powf(1.5);
    let denom25 = norm_sq.powf(2.5);

    let mut h = [Mat12::zeros(); 3];
    for j in 0..12 {
        let z_grad_j: Vec3 = z_grad.column(j).into();
        let b = z.dot(&z_grad_j);
        for i in 0..12 {
            let z_grad_i: Vec3 = z_grad.column(i).into();
            let z_hess_ij = z_hessian(i, j);

            let a = z.dot(&z_grad_i);
            let c = z_grad_i.dot(&z_grad_j) + z.dot(&z_hess_ij);

            let entry = inv_norm * z_hess_ij
                - (a * z_grad_j + b * z_grad_i + c * z) / denom15
                + 3.0 * a * b / denom25 * z;

            for k in 0..3 {
                h[k][(i, j)] = entry[k];
            }
        }
    }
    h
}

/// Rank-3 Hessian of the unit triangle normal, one 12×12 per component.
pub fn normal_hessian_vf(e: &[Vec3; 3]) -> [Mat12; 3] {
    let z = e[2].cross(&e[0]);
    normalized_hessian(&z, &cross_gradient_vf(e), cross_hessian_vf)
}

/// Rank-3 Hessian of the unit edge-edge normal, one 12×12 per component.
pub fn normal_hessian_ee(e: &[Vec3; 2]) -> [Mat12; 3] {
    let z = e[1].cross(&e[0]);
    normalized_hessian(&z, &cross_gradient_ee(e), cross_hessian_ee)
}

/// Jacobian of t = v₀ − (b₀v₁ + b₁v₂ + b₂v₃) with the barycentric weights
/// held fixed.
pub fn t_diff_partial(bary: &Vec3) -> Mat3x12 {
    let mut partial = Mat3x12::zeros();
    for k in 0..3 {
        partial[(k, k)] = 1.0;
        partial[(k, 3 + k)] = -bary[0];
        partial[(k, 6 + k)] = -bary[1];
        partial[(k, 9 + k)] = -bary[2];
    }
    partial
}

/// Jacobian of the interpolated difference v_b − v_a for the edge-edge case.
pub fn v_diff_partial(a: &Vec2, b: &Vec2) -> Mat3x12 {
    let mut partial = Mat3x12::zeros();
    for k in 0..3 {
        partial[(k, k)] = -a[0];
        partial[(k, 3 + k)] = -a[1];
        partial[(k, 6 + k)] = b[0];
        partial[(k, 9 + k)] = b[1];
    }
    partial
}

/// Barycentric coordinates of the projection of v₀ onto the triangle formed
/// by v₁, v₂, v₃.
pub fn barycentric_coordinates(v: &[Vec3; 4]) -> Vec3 {
    let v0 = v[1];
    let v1 = v[2];
    let v2 = v[3];

    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let n = e1.cross(&e2);
    let n_hat = n / n.norm();
    let projected = v[0] - n_hat.dot(&(v[0] - v0)) * n_hat;

    let na = (v2 - v1).cross(&(projected - v1));
    let nb = (v0 - v2).cross(&(projected - v2));
    let nc = (v1 - v0).cross(&(projected - v0));
    let n_norm_sq = n.norm_squared();
    Vec3::new(
        n.dot(&na) / n_norm_sq,
        n.dot(&nb) / n_norm_sq,
        n.dot(&nc) / n_norm_sq,
    )
}

/// Does the projection of `point` onto the plane of the triangle land inside
/// the triangle?
pub fn point_projects_inside_triangle(v0: &Vec3, v1: &Vec3, v2: &Vec3, point: &Vec3) -> bool {
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let n = e1.cross(&e2);
    let na = (v2 - v1).cross(&(point - v1));
    let nb = (v0 - v2).cross(&(point - v2));
    let nc = (v1 - v0).cross(&(point - v0));
    let n_norm_sq = n.norm_squared();
    let bary = Vec3::new(
        n.dot(&na) / n_norm_sq,
        n.dot(&nb) / n_norm_sq,
        n.dot(&nc) / n_norm_sq,
    );

    // inside iff no coordinate went negative, so the absolute sum stays 1
    let bary_sum = bary[0].abs() + bary[1].abs() + bary[2].abs();
    bary_sum - 1.0 < 1e-8
}

/// Euclidean distance from a point to the closest point of a triangle.
pub fn point_triangle_distance(v0: &Vec3, v1: &Vec3, v2: &Vec3, point: &Vec3) -> Real {
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let n = e1.cross(&e2);
    let na = (v2 - v1).cross(&(point - v1));
    let nb = (v0 - v2).cross(&(point - v2));
    let nc = (v1 - v0).cross(&(point - v0));
    let n_norm_sq = n.norm_squared();
    let bary = Vec3::new(
        n.dot(&na) / n_norm_sq,
        n.dot(&nb) / n_norm_sq,
        n.dot(&nc) / n_norm_sq,
    );

    let bary_sum = bary[0].abs() + bary[1].abs() + bary[2].abs();
    if bary_sum - 1.0 < 1e-8 {
        let n_hat = n / n.norm();
        return n_hat.dot(&(point - v0)).abs();
    }

    // project onto each edge; if the projection falls outside the interval,
    // a vertex distance will be smaller anyway
    let e3 = v2 - v1;
    let ev = point - v0;
    let ev3 = point - v1;
    let e1_hat = e1 / e1.norm();
    let e2_hat = e2 / e2.norm();
    let e3_hat = e3 / e3.norm();
    let mut edge_distances = Vec3::new(Real::MAX, Real::MAX, Real::MAX);

    let e1_dot = e1_hat.dot(&ev);
    if e1_dot > 0.0 && e1_dot < e1.norm() {
        let projected = v0 + e1_hat * e1_dot;
        edge_distances[0] = (point - projected).norm();
    }
    let e2_dot = e2_hat.dot(&ev);
    if e2_dot > 0.0 && e2_dot < e2.norm() {
        let projected = v0 + e2_hat * e2_dot;
        edge_distances[1] = (point - projected).norm();
    }
    let e3_dot = e3_hat.dot(&ev3);
    if e3_dot > 0.0 && e3_dot < e3.norm() {
        let projected = v1 + e3_hat * e3_dot;
        edge_distances[2] = (point - projected).norm();
    }

    let vertex_distances = Vec3::new(
        (point - v0).norm(),
        (point - v1).norm(),
        (point - v2).norm(),
    );

    edge_distances.min().min(vertex_distances.min())
}

/// Closest points between two segments. Near-parallel configurations fall
/// back to the segment midpoints; exact treatment is the hybrid energy's job.
pub fn segment_segment_closest_points(
    a0: &Vec3,
    a1: &Vec3,
    b0: &Vec3,
    b1: &Vec3,
) -> (Vec3, Vec3) {
    let d1 = a1 - a0;
    let d2 = b1 - b0;
    let r = a0 - b0;

    let a = d1.dot(&d1);
    let e = d2.dot(&d2);
    let b = d1.dot(&d2);
    let c = d1.dot(&r);
    let f = d2.dot(&r);

    let denom = a * e - b * b;
    if denom <= 1e-10 * a * e {
        return (a0 + 0.5 * d1, b0 + 0.5 * d2);
    }

    let mut s = ((b * f - c * e) / denom).clamp(0.0, 1.0);
    let mut t = (b * s + f) / e;
    if t < 0.0 {
        t = 0.0;
        s = (-c / a).clamp(0.0, 1.0);
    } else if t > 1.0 {
        t = 1.0;
        s = ((b - c) / a).clamp(0.0, 1.0);
    }

    (a0 + s * d1, b0 + t * d2)
}

/// Does this edge pass through the triangle?
pub fn face_edge_intersection(triangle: &[Vec3; 3], edge: &[Vec3; 2]) -> bool {
    let a = triangle[0];
    let b = triangle[1];
    let c = triangle[2];

    let origin = edge[0];
    let edge_diff = edge[1] - edge[0];
    let edge_length = edge_diff.norm();
    if edge_length < 1e-12 {
        return false;
    }
    let direction = edge_diff / edge_length;

    let raw_normal = (b - a).cross(&(c - a));
    if raw_normal.norm() < 1e-12 {
        return false;
    }
    let normal = raw_normal / raw_normal.norm();

    let denom = direction.dot(&normal);
    if denom.abs() <= 0.0 {
        return false;
    }

    let t = (a - origin).dot(&normal) / denom;
    if t < 0.0 || t > edge_length {
        return false;
    }

    let hit = origin + direction * t;
    if normal.dot(&(b - a).cross(&(hit - a))) < 0.0 {
        return false;
    }
    if normal.dot(&(c - b).cross(&(hit - b))) < 0.0 {
        return false;
    }
    if normal.dot(&(a - c).cross(&(hit - c))) < 0.0 {
        return false;
    }

    true
}
