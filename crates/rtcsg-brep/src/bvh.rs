//! Bounding volume hierarchy over the faces of one B-rep.
//!
//! Built top-down with a bucketed surface area heuristic. Each face enters
//! with the root box of its own [`SurfaceTree`](crate::tree::SurfaceTree).

use rtcsg_math::{Aabb3, Point3};
use rtcsg_prim::Ray;

/// Faces per leaf before splitting is attempted.
const MAX_LEAF_FACES: usize = 4;
/// SAH buckets per axis.
const NUM_BUCKETS: usize = 12;
/// Relative cost of visiting an internal node.
const TRAVERSAL_COST: f64 = 0.125;

/// Either a leaf listing faces or an internal node with two children.
#[derive(Debug, Clone)]
pub enum BvhNode {
    /// Leaf holding face indices.
    Leaf {
        /// Bounds of the listed faces.
        aabb: Aabb3,
        /// Face indices.
        faces: Vec<usize>,
    },
    /// Internal node.
    Internal {
        /// Bounds of both children.
        aabb: Aabb3,
        /// Left child.
        left: Box<BvhNode>,
        /// Right child.
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn aabb(&self) -> &Aabb3 {
        match self {
            BvhNode::Leaf { aabb, .. } | BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

type FaceEntry = (usize, Aabb3, Point3);

/// Face-level hierarchy of one B-rep.
#[derive(Debug, Clone, Default)]
pub struct SceneBvh {
    root: Option<BvhNode>,
}

impl SceneBvh {
    /// Build over `(face index, bounds)` pairs.
    pub fn build(faces: impl IntoIterator<Item = (usize, Aabb3)>) -> Self {
        let mut data: Vec<FaceEntry> = faces
            .into_iter()
            .map(|(idx, aabb)| (idx, aabb, aabb.center()))
            .collect();
        let root = (!data.is_empty()).then(|| build_node(&mut data));
        Self { root }
    }

    /// Root node, if any face survived.
    pub fn root(&self) -> Option<&BvhNode> {
        self.root.as_ref()
    }

    /// Bounds of every face.
    pub fn bounds(&self) -> Option<Aabb3> {
        self.root.as_ref().map(|r| *r.aabb())
    }

    /// Indices of faces whose box the ray's line passes through.
    pub fn candidates(&self, ray: &Ray) -> Vec<usize> {
        let mut out = Vec::new();
        let Some(root) = &self.root else {
            return out;
        };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if ray.slab(node.aabb()).is_none() {
                continue;
            }
            match node {
                BvhNode::Leaf { faces, .. } => out.extend_from_slice(faces),
                BvhNode::Internal { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        out
    }
}

fn build_node(data: &mut [FaceEntry]) -> BvhNode {
    let bounds = data
        .iter()
        .fold(Aabb3::empty(), |acc, (_, aabb, _)| acc.union(aabb));

    if data.len() <= MAX_LEAF_FACES {
        return BvhNode::Leaf {
            aabb: bounds,
            faces: data.iter().map(|(idx, _, _)| *idx).collect(),
        };
    }

    let mid = match find_best_split(data, &bounds) {
        Some((axis, pos)) => partition(data, axis, pos),
        None => 0,
    };
    // no useful split: halve the list
    let mid = if mid == 0 || mid == data.len() {
        data.len() / 2
    } else {
        mid
    };

    let (left, right) = data.split_at_mut(mid);
    BvhNode::Internal {
        aabb: bounds,
        left: Box::new(build_node(left)),
        right: Box::new(build_node(right)),
    }
}

/// Cheapest `(axis, position)` split by centroid, if any axis has extent.
fn find_best_split(data: &[FaceEntry], bounds: &Aabb3) -> Option<(usize, f64)> {
    let extent = bounds.extent();
    let total_area = bounds.surface_area();
    let mut best: Option<(f64, usize, f64)> = None;

    for axis in 0..3 {
        let axis_extent = extent[axis];
        if axis_extent < 1e-10 {
            continue;
        }
        let axis_min = bounds.min[axis];

        let mut counts = [0usize; NUM_BUCKETS];
        let mut boxes = [Aabb3::empty(); NUM_BUCKETS];
        for (_, aabb, centroid) in data {
            let b = ((centroid[axis] - axis_min) / axis_extent * NUM_BUCKETS as f64) as usize;
            let b = b.min(NUM_BUCKETS - 1);
            counts[b] += 1;
            boxes[b] = boxes[b].union(aabb);
        }

        for split in 1..NUM_BUCKETS {
            let (left_count, left_box) = gather(&counts[..split], &boxes[..split]);
            let (right_count, right_box) = gather(&counts[split..], &boxes[split..]);
            if left_count == 0 || right_count == 0 {
                continue;
            }
            let cost = TRAVERSAL_COST
                + left_box.surface_area() / total_area * left_count as f64
                + right_box.surface_area() / total_area * right_count as f64;
            if best.map_or(true, |(c, _, _)| cost < c) {
                let pos = axis_min + split as f64 / NUM_BUCKETS as f64 * axis_extent;
                best = Some((cost, axis, pos));
            }
        }
    }

    best.map(|(_, axis, pos)| (axis, pos))
}

fn gather(counts: &[usize], boxes: &[Aabb3]) -> (usize, Aabb3) {
    counts
        .iter()
        .zip(boxes)
        .filter(|(n, _)| **n > 0)
        .fold((0, Aabb3::empty()), |(n, acc), (c, b)| (n + c, acc.union(b)))
}

/// Move entries with centroid below `pos` to the front; returns their count.
fn partition(data: &mut [FaceEntry], axis: usize, pos: f64) -> usize {
    let mut left = 0;
    let mut right = data.len();
    while left < right {
        if data[left].2[axis] < pos {
            left += 1;
        } else {
            right -= 1;
            data.swap(left, right);
        }
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtcsg_math::Vec3;

    fn unit_box_at(x: f64) -> Aabb3 {
        Aabb3::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 1.0, 1.0, 1.0))
    }

    fn count_leaves(node: &BvhNode) -> usize {
        match node {
            BvhNode::Leaf { .. } => 1,
            BvhNode::Internal { left, right, .. } => count_leaves(left) + count_leaves(right),
        }
    }

    #[test]
    fn test_empty() {
        let bvh = SceneBvh::build(Vec::new());
        assert!(bvh.root().is_none());
        let ray = Ray::new(Point3::origin(), Vec3::x());
        assert!(bvh.candidates(&ray).is_empty());
    }

    #[test]
    fn test_small_set_is_one_leaf() {
        let bvh = SceneBvh::build((0..3).map(|i| (i, unit_box_at(i as f64 * 2.0))));
        assert_eq!(count_leaves(bvh.root().unwrap()), 1);
    }

    #[test]
    fn test_candidates_prune_far_faces() {
        let bvh = SceneBvh::build((0..32).map(|i| (i, unit_box_at(i as f64 * 3.0))));
        assert!(count_leaves(bvh.root().unwrap()) > 1);
        let bounds = bvh.bounds().unwrap();
        assert_eq!(bounds.min.x, 0.0);
        assert_eq!(bounds.max.x, 94.0);

        // vertical ray through box 5 only
        let ray = Ray::new(Point3::new(15.5, 0.5, 10.0), -Vec3::z());
        let hits = bvh.candidates(&ray);
        assert!(hits.contains(&5));
        assert!(hits.len() <= MAX_LEAF_FACES);

        // a ray along the row sees every face
        let ray = Ray::new(Point3::new(-5.0, 0.5, 0.5), Vec3::x());
        let mut all = bvh.candidates(&ray);
        all.sort_unstable();
        assert_eq!(all, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn test_coincident_boxes_still_split() {
        let bvh = SceneBvh::build((0..10).map(|i| (i, unit_box_at(0.0))));
        let ray = Ray::new(Point3::new(0.5, 0.5, 5.0), -Vec3::z());
        assert_eq!(bvh.candidates(&ray).len(), 10);
    }
}
