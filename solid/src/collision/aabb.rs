//! Static-topology bounding-volume hierarchy over surface primitives.
//!
//! The tree is built once from rest geometry by recursive longest-axis
//! midpoint splits; only the node bounds are refit as the mesh deforms.
//! `N` is the number of vertices per primitive: 3 for surface triangles,
//! 2 for surface edges.

use crate::math::{Real, Vec3};

/// One node of the tree. Interior nodes own their children; only leaves
/// keep a primitive-index list.
#[derive(Debug)]
pub struct AabbNode {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub children: [Option<Box<AabbNode>>; 2],
    pub primitives: Vec<usize>,
    pub depth: usize,
}

impl AabbNode {
    fn is_leaf(&self) -> bool {
        self.children[0].is_none() || self.children[1].is_none()
    }
}

/// Bounding-volume tree over primitives indexing `N` mesh vertices each.
#[derive(Debug)]
pub struct AabbTree<const N: usize> {
    prims: Vec<[usize; N]>,
    root: AabbNode,
}

fn bounds_of<const N: usize>(
    vertices: &[Vec3],
    prims: &[[usize; N]],
    indices: &[usize],
) -> (Vec3, Vec3) {
    let first = vertices[prims[indices[0]][0]];
    let mut mins = first;
    let mut maxs = first;
    for &index in indices {
        for &vertex in &prims[index] {
            let v = vertices[vertex];
            mins = mins.inf(&v);
            maxs = maxs.sup(&v);
        }
    }
    (mins, maxs)
}

fn centroid<const N: usize>(vertices: &[Vec3], prim: &[usize; N]) -> Vec3 {
    let mut sum = Vec3::zeros();
    for &vertex in prim {
        sum += vertices[vertex];
    }
    sum / N as Real
}

impl<const N: usize> AabbTree<N> {
    /// Build the tree over the given primitives at the given (rest) vertex
    /// positions. Topology is immutable afterwards.
    pub fn new(vertices: &[Vec3], prims: Vec<[usize; N]>) -> Self {
        assert!(!vertices.is_empty());
        assert!(!prims.is_empty());

        let all: Vec<usize> = (0..prims.len()).collect();
        let (mins, maxs) = bounds_of(vertices, &prims, &all);
        let mut root = AabbNode {
            mins,
            maxs,
            children: [None, None],
            primitives: all,
            depth: 0,
        };
        Self::build_children(vertices, &prims, &mut root, 1);

        Self { prims, root }
    }

    fn build_children(
        vertices: &[Vec3],
        prims: &[[usize; N]],
        node: &mut AabbNode,
        depth: usize,
    ) {
        if node.primitives.len() == 1 {
            return;
        }

        // cut halfway along the longest axis of the current box
        let interval = node.maxs - node.mins;
        let mut axis = 0;
        for x in 1..3 {
            if interval[x] > interval[axis] {
                axis = x;
            }
        }
        let cutting_plane = node.mins[axis] + interval[axis] * 0.5;

        let mut child_list0 = Vec::new();
        let mut child_list1 = Vec::new();
        for &index in &node.primitives {
            if centroid(vertices, &prims[index])[axis] < cutting_plane {
                child_list0.push(index);
            } else {
                child_list1.push(index);
            }
        }

        // a degenerate split leaves this as a leaf node
        if child_list0.is_empty() || child_list1.is_empty() {
            return;
        }

        let (mins0, maxs0) = bounds_of(vertices, prims, &child_list0);
        let (mins1, maxs1) = bounds_of(vertices, prims, &child_list1);
        let mut left = Box::new(AabbNode {
            mins: mins0,
            maxs: maxs0,
            children: [None, None],
            primitives: child_list0,
            depth,
        });
        let mut right = Box::new(AabbNode {
            mins: mins1,
            maxs: maxs1,
            children: [None, None],
            primitives: child_list1,
            depth,
        });

        Self::build_children(vertices, prims, &mut left, depth + 1);
        Self::build_children(vertices, prims, &mut right, depth + 1);

        // interior nodes don't keep the index list around
        node.primitives.clear();
        node.children = [Some(left), Some(right)];
    }

    pub fn root(&self) -> &AabbNode {
        &self.root
    }

    pub fn primitives(&self) -> &[[usize; N]] {
        &self.prims
    }

    /// Refit the bounds bottom-up against the current vertex positions.
    pub fn refit(&mut self, vertices: &[Vec3]) {
        Self::refit_node(vertices, &self.prims, &mut self.root);
    }

    fn refit_node(vertices: &[Vec3], prims: &[[usize; N]], node: &mut AabbNode) {
        if node.is_leaf() {
            let (mins, maxs) = bounds_of(vertices, prims, &node.primitives);
            node.mins = mins;
            node.maxs = maxs;
            return;
        }

        for child in node.children.iter_mut().flatten() {
            Self::refit_node(vertices, prims, child);
        }

        let left = node.children[0].as_ref().map(|c| (c.mins, c.maxs));
        let right = node.children[1].as_ref().map(|c| (c.mins, c.maxs));
        if let (Some((lmin, lmax)), Some((rmin, rmax))) = (left, right) {
            node.mins = lmin.inf(&rmin);
            node.maxs = lmax.sup(&rmax);
        }
    }

    /// Candidate primitives within `eps` of a point, by inflate-and-test.
    pub fn nearby_point(&self, point: &Vec3, eps: Real, out: &mut Vec<usize>) {
        out.clear();
        Self::query_point(&self.root, point, eps, out);
    }

    fn query_point(node: &AabbNode, point: &Vec3, eps: Real, out: &mut Vec<usize>) {
        let inside = (0..3).all(|x| {
            point[x] > node.mins[x] - eps && point[x] < node.maxs[x] + eps
        });
        if !inside {
            return;
        }

        for child in node.children.iter().flatten() {
            Self::query_point(child, point, eps, out);
        }

        out.extend_from_slice(&node.primitives);
    }

    /// Candidate primitives whose inflated bounds overlap the box
    /// [mins, maxs]; the point-pair box of an edge goes through here.
    pub fn nearby_box(&self, mins: &Vec3, maxs: &Vec3, eps: Real, out: &mut Vec<usize>) {
        out.clear();
        Self::query_box(&self.root, mins, maxs, eps, out);
    }

    fn query_box(node: &AabbNode, mins: &Vec3, maxs: &Vec3, eps: Real, out: &mut Vec<usize>) {
        let overlap = (0..3).all(|x| {
            mins[x] <= node.maxs[x] + eps && maxs[x] >= node.mins[x] - eps
        });
        if !overlap {
            return;
        }

        for child in node.children.iter().flatten() {
            Self::query_box(child, mins, maxs, eps, out);
        }

        out.extend_from_slice(&node.primitives);
    }

    /// Candidate primitives near the segment between two mesh vertices.
    pub fn nearby_edge(
        &self,
        vertices: &[Vec3],
        edge: &[usize; 2],
        eps: Real,
        out: &mut Vec<usize>,
    ) {
        let v0 = vertices[edge[0]];
        let v1 = vertices[edge[1]];
        let mins = v0.inf(&v1);
        let maxs = v0.sup(&v1);
        self.nearby_box(&mins, &maxs, eps, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // a small triangle grid in the z = 0 plane
    fn grid(n: usize) -> (Vec<Vec3>, Vec<[usize; 3]>) {
        let mut vertices = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                vertices.push(Vec3::new(i as Real, j as Real, 0.0));
            }
        }
        let mut triangles = Vec::new();
        let stride = n + 1;
        for j in 0..n {
            for i in 0..n {
                let v00 = j * stride + i;
                let v10 = v00 + 1;
                let v01 = v00 + stride;
                let v11 = v01 + 1;
                triangles.push([v00, v10, v11]);
                triangles.push([v00, v11, v01]);
            }
        }
        (vertices, triangles)
    }

    fn check_containment(vertices: &[Vec3], prims: &[[usize; 3]], node: &AabbNode) {
        if node.children[0].is_none() {
            for &index in &node.primitives {
                for &vertex in &prims[index] {
                    let v = vertices[vertex];
                    for x in 0..3 {
                        assert!(v[x] >= node.mins[x] - 1e-12);
                        assert!(v[x] <= node.maxs[x] + 1e-12);
                    }
                }
            }
        }
        for child in node.children.iter().flatten() {
            for x in 0..3 {
                assert!(child.mins[x] >= node.mins[x] - 1e-12);
                assert!(child.maxs[x] <= node.maxs[x] + 1e-12);
            }
            check_containment(vertices, prims, child);
        }
    }

    #[test]
    fn primitives_stay_inside_their_nodes_after_refit() {
        let (mut vertices, triangles) = grid(22); // nearly a thousand triangles
        let mut tree = AabbTree::new(&vertices, triangles.clone());
        check_containment(&vertices, tree.primitives(), tree.root());

        for v in &mut vertices {
            v.x += 0.3;
            v.y -= 0.1;
            v.z += (v.x * 0.7).sin() * 0.25;
        }
        tree.refit(&vertices);
        check_containment(&vertices, tree.primitives(), tree.root());
    }

    #[test]
    fn translation_shifts_root_bounds_exactly() {
        let (mut vertices, triangles) = grid(22);
        let mut tree = AabbTree::new(&vertices, triangles);

        let before_mins = tree.root().mins;
        let before_maxs = tree.root().maxs;

        let shift = Vec3::new(1.0, 0.0, 0.0);
        for v in &mut vertices {
            *v += shift;
        }
        tree.refit(&vertices);

        assert!((tree.root().mins - (before_mins + shift)).norm() < 1e-12);
        assert!((tree.root().maxs - (before_maxs + shift)).norm() < 1e-12);
    }

    #[test]
    fn point_query_finds_the_containing_triangle() {
        let (vertices, triangles) = grid(8);
        let tree = AabbTree::new(&vertices, triangles.clone());

        let query = Vec3::new(3.4, 5.6, 0.0);
        let mut candidates = Vec::new();
        tree.nearby_point(&query, 0.1, &mut candidates);

        // at least the two triangles of the containing cell show up
        assert!(!candidates.is_empty());
        for &c in &candidates {
            let centroid: Vec3 = triangles[c]
                .iter()
                .map(|&v| vertices[v])
                .sum::<Vec3>()
                / 3.0;
            assert!((centroid - query).norm() < 3.0);
        }
    }

    #[test]
    fn edge_tree_queries_work() {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(5.0, 5.0, 5.0),
            Vec3::new(6.0, 5.0, 5.0),
        ];
        let edges = vec![[0usize, 1], [2, 3]];
        let tree = AabbTree::new(&vertices, edges);

        let mut out = Vec::new();
        tree.nearby_edge(&vertices, &[0, 1], 0.5, &mut out);
        assert!(out.contains(&0));
        assert!(!out.contains(&1));
    }
}
