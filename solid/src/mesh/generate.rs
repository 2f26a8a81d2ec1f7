//! Procedural tet lattices for scenes and tests.

use crate::math::{Real, Vec3};

/// The canonical single-tet fixture with unit legs along each axis.
pub fn single_tet() -> (Vec<Vec3>, Vec<[usize; 4]>) {
    (
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ],
        vec![[0, 1, 2, 3]],
    )
}

fn tet_volume(vertices: &[Vec3], tet: &[usize; 4]) -> Real {
    let d1 = vertices[tet[1]] - vertices[tet[0]];
    let d2 = vertices[tet[2]] - vertices[tet[0]];
    let d3 = vertices[tet[3]] - vertices[tet[0]];
    d3.dot(&d1.cross(&d2)) / 6.0
}

/// A cube of side `scale` at `origin`, cut into `res`³ cells of six tets
/// each (the Kuhn split along the main diagonal). Every tet comes out with
/// positive orientation.
pub fn cube_lattice(res: usize, scale: Real, origin: Vec3) -> (Vec<Vec3>, Vec<[usize; 4]>) {
    assert!(res > 0);
    let stride = res + 1;
    let spacing = scale / res as Real;

    let mut vertices = Vec::with_capacity(stride * stride * stride);
    for k in 0..stride {
        for j in 0..stride {
            for i in 0..stride {
                vertices.push(
                    origin
                        + Vec3::new(
                            i as Real * spacing,
                            j as Real * spacing,
                            k as Real * spacing,
                        ),
                );
            }
        }
    }

    let index = |i: usize, j: usize, k: usize| k * stride * stride + j * stride + i;

    // each permutation of the three axis steps is one tet along the
    // cell diagonal from corner 000 to corner 111
    const PERMUTATIONS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    let mut tets = Vec::with_capacity(res * res * res * 6);
    for k in 0..res {
        for j in 0..res {
            for i in 0..res {
                for permutation in &PERMUTATIONS {
                    let mut corner = [i, j, k];
                    let mut tet = [index(i, j, k), 0, 0, 0];
                    for (slot, &axis) in permutation.iter().enumerate() {
                        corner[axis] += 1;
                        tet[slot + 1] = index(corner[0], corner[1], corner[2]);
                    }

                    // flip any tet the permutation parity left inverted
                    if tet_volume(&vertices, &tet) < 0.0 {
                        tet.swap(2, 3);
                    }
                    tets.push(tet);
                }
            }
        }
    }

    (vertices, tets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tet_has_positive_volume() {
        let (vertices, tets) = single_tet();
        assert!((tet_volume(&vertices, &tets[0]) - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn lattice_tets_are_positive_and_fill_the_cube() {
        let (vertices, tets) = cube_lattice(2, 1.0, Vec3::zeros());
        assert_eq!(vertices.len(), 27);
        assert_eq!(tets.len(), 48);

        let mut total = 0.0;
        for tet in &tets {
            let volume = tet_volume(&vertices, tet);
            assert!(volume > 0.0);
            total += volume;
        }
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lattice_respects_origin_and_scale() {
        let origin = Vec3::new(1.0, 2.0, 3.0);
        let (vertices, _) = cube_lattice(1, 0.5, origin);
        let mut mins = vertices[0];
        let mut maxs = vertices[0];
        for v in &vertices {
            mins = mins.inf(v);
            maxs = maxs.sup(v);
        }
        assert!((mins - origin).norm() < 1e-12);
        assert!((maxs - (origin + Vec3::new(0.5, 0.5, 0.5))).norm() < 1e-12);
    }
}
