//! Surface extraction and connectivity tables, built once at construction.
//!
//! All hashing goes through ordered maps so the extracted tables come out
//! in a deterministic order for a given tet table.

use crate::math::{Real, Vec3};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

// The four faces of a tet, each wound counter-clockwise facing outwards
// (for a positive-volume tet).
pub(crate) fn tet_faces(tet: &[usize; 4]) -> [[usize; 3]; 4] {
    [
        [tet[0], tet[1], tet[3]],
        [tet[0], tet[2], tet[1]],
        [tet[0], tet[3], tet[2]],
        [tet[1], tet[2], tet[3]],
    ]
}

fn sorted3(face: &[usize; 3]) -> [usize; 3] {
    let mut key = *face;
    key.sort_unstable();
    key
}

fn sorted2(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Triangles appearing on exactly one tet face, in outward-facing
/// counter-clockwise order.
pub(crate) fn extract_surface_triangles(tets: &[[usize; 4]]) -> Vec<[usize; 3]> {
    let mut face_counts: BTreeMap<[usize; 3], usize> = BTreeMap::new();
    for tet in tets {
        for face in tet_faces(tet) {
            *face_counts.entry(sorted3(&face)).or_insert(0) += 1;
        }
    }

    // a face without a dual must face outside
    let mut surface = Vec::new();
    for tet in tets {
        for face in tet_faces(tet) {
            if face_counts[&sorted3(&face)] < 2 {
                surface.push(face);
            }
        }
    }
    surface
}

/// Surface vertex list (sorted) and the volume-to-surface index map.
pub(crate) fn compute_surface_vertices(
    surface_triangles: &[[usize; 3]],
) -> (Vec<usize>, HashMap<usize, usize>) {
    let mut found: BTreeSet<usize> = BTreeSet::new();
    for triangle in surface_triangles {
        for &v in triangle {
            found.insert(v);
        }
    }

    let surface_vertices: Vec<usize> = found.into_iter().collect();
    let volume_to_surface = surface_vertices
        .iter()
        .enumerate()
        .map(|(surface_id, &volume_id)| (volume_id, surface_id))
        .collect();
    (surface_vertices, volume_to_surface)
}

/// Deduplicated surface edges, each pair in sorted order.
pub(crate) fn compute_surface_edges(surface_triangles: &[[usize; 3]]) -> Vec<[usize; 2]> {
    let mut edge_set: BTreeSet<(usize, usize)> = BTreeSet::new();
    for triangle in surface_triangles {
        for y in 0..3 {
            let (a, b) = sorted2(triangle[y], triangle[(y + 1) % 3]);
            edge_set.insert((a, b));
        }
    }
    edge_set.into_iter().map(|(a, b)| [a, b]).collect()
}

/// For each surface triangle, the indices of its three edge-neighbours,
/// one per edge in triangle order.
pub(crate) fn compute_triangle_neighbors(
    surface_triangles: &[[usize; 3]],
) -> Vec<[Option<usize>; 3]> {
    let mut edge_triangles: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (i, triangle) in surface_triangles.iter().enumerate() {
        for y in 0..3 {
            let edge = sorted2(triangle[y], triangle[(y + 1) % 3]);
            edge_triangles.entry(edge).or_default().push(i);
        }
    }

    let mut neighbors = Vec::with_capacity(surface_triangles.len());
    for (i, triangle) in surface_triangles.iter().enumerate() {
        let mut entry = [None; 3];
        for y in 0..3 {
            let edge = sorted2(triangle[y], triangle[(y + 1) % 3]);
            if let Some(sharing) = edge_triangles.get(&edge) {
                for &other in sharing {
                    if other != i {
                        entry[y] = Some(other);
                    }
                }
            }
        }
        neighbors.push(entry);
    }
    neighbors
}

/// For each surface edge, the one or two adjacent surface triangles.
pub(crate) fn compute_edge_triangle_neighbors(
    surface_triangles: &[[usize; 3]],
    surface_edges: &[[usize; 2]],
) -> Vec<[Option<usize>; 2]> {
    let edge_to_index: HashMap<(usize, usize), usize> = surface_edges
        .iter()
        .enumerate()
        .map(|(i, e)| ((e[0], e[1]), i))
        .collect();

    let mut adjacent: Vec<Vec<usize>> = vec![Vec::new(); surface_edges.len()];
    for (i, triangle) in surface_triangles.iter().enumerate() {
        for y in 0..3 {
            let edge = sorted2(triangle[y], triangle[(y + 1) % 3]);
            if let Some(&index) = edge_to_index.get(&edge) {
                adjacent[index].push(i);
            }
        }
    }

    adjacent
        .into_iter()
        .map(|sharing| {
            debug_assert!(!sharing.is_empty());
            [sharing.first().copied(), sharing.get(1).copied()]
        })
        .collect()
}

/// Membership set for the "within each other's one ring" rejection test:
/// surface vertex pairs joined by a surface edge, in both orders.
pub(crate) fn compute_one_ring_pairs(surface_edges: &[[usize; 2]]) -> HashSet<(usize, usize)> {
    let mut pairs = HashSet::new();
    for edge in surface_edges {
        pairs.insert((edge[0], edge[1]));
        pairs.insert((edge[1], edge[0]));
    }
    pairs
}

pub(crate) fn triangle_area(v0: &Vec3, v1: &Vec3, v2: &Vec3) -> Real {
    0.5 * (v1 - v0).cross(&(v2 - v0)).norm()
}

/// Rest areas: per surface triangle, per surface-vertex one ring (third
/// shares), and per surface edge (third shares of both flanking triangles).
pub(crate) fn compute_surface_areas(
    rest_vertices: &[Vec3],
    surface_triangles: &[[usize; 3]],
    surface_vertices: &[usize],
    volume_to_surface: &HashMap<usize, usize>,
    surface_edges: &[[usize; 2]],
) -> (Vec<Real>, Vec<Real>, Vec<Real>) {
    let triangle_areas: Vec<Real> = surface_triangles
        .iter()
        .map(|t| {
            triangle_area(
                &rest_vertices[t[0]],
                &rest_vertices[t[1]],
                &rest_vertices[t[2]],
            )
        })
        .collect();

    let mut one_ring_areas = vec![0.0; surface_vertices.len()];
    for (i, triangle) in surface_triangles.iter().enumerate() {
        for &v in triangle {
            if let Some(&surface_id) = volume_to_surface.get(&v) {
                one_ring_areas[surface_id] += triangle_areas[i] / 3.0;
            }
        }
    }

    let edge_to_index: HashMap<(usize, usize), usize> = surface_edges
        .iter()
        .enumerate()
        .map(|(i, e)| ((e[0], e[1]), i))
        .collect();

    let mut edge_areas = vec![0.0; surface_edges.len()];
    for (i, triangle) in surface_triangles.iter().enumerate() {
        for y in 0..3 {
            let edge = sorted2(triangle[y], triangle[(y + 1) % 3]);
            if let Some(&index) = edge_to_index.get(&edge) {
                edge_areas[index] += triangle_areas[i] / 3.0;
            }
        }
    }

    (triangle_areas, one_ring_areas, edge_areas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::generate::cube_lattice;

    #[test]
    fn single_tet_has_four_surface_faces() {
        let tets = vec![[0usize, 1, 2, 3]];
        let surface = extract_surface_triangles(&tets);
        assert_eq!(surface.len(), 4);

        let edges = compute_surface_edges(&surface);
        assert_eq!(edges.len(), 6);

        let (vertices, map) = compute_surface_vertices(&surface);
        assert_eq!(vertices, vec![0, 1, 2, 3]);
        assert_eq!(map[&2], 2);
    }

    #[test]
    fn extraction_is_deterministic() {
        let (_, tets) = cube_lattice(2, 1.0, Vec3::zeros());
        let first = extract_surface_triangles(&tets);
        let second = extract_surface_triangles(&tets);
        assert_eq!(first, second);
    }

    #[test]
    fn cube_surface_winding_faces_outward() {
        let (vertices, tets) = cube_lattice(2, 1.0, Vec3::zeros());
        let surface = extract_surface_triangles(&tets);
        assert!(!surface.is_empty());

        let center = Vec3::new(0.5, 0.5, 0.5);
        for triangle in &surface {
            let v0 = vertices[triangle[0]];
            let v1 = vertices[triangle[1]];
            let v2 = vertices[triangle[2]];
            let normal = (v1 - v0).cross(&(v2 - v0));
            let centroid = (v0 + v1 + v2) / 3.0;
            assert!(
                normal.dot(&(centroid - center)) > 0.0,
                "inward-facing surface triangle {:?}",
                triangle
            );
        }
    }

    #[test]
    fn closed_surface_has_two_triangles_per_edge() {
        let (_, tets) = cube_lattice(1, 1.0, Vec3::zeros());
        let surface = extract_surface_triangles(&tets);
        let edges = compute_surface_edges(&surface);

        let neighbors = compute_edge_triangle_neighbors(&surface, &edges);
        for entry in &neighbors {
            assert!(entry[0].is_some());
            assert!(entry[1].is_some());
        }

        let triangle_neighbors = compute_triangle_neighbors(&surface);
        for entry in &triangle_neighbors {
            for slot in entry {
                assert!(slot.is_some());
            }
        }
    }
}
