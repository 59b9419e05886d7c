//! Per-face bounding-box hierarchy over sub-patches.
//!
//! A face surface is split recursively (along whichever direction has the
//! longer control net) until each piece is flat or the depth limit is hit.
//! Leaves keep the piece's parameter rectangle and the box of its control
//! hull; pieces entirely outside the trim are dropped.

use rtcsg_math::{Aabb3, Vec3};
use rtcsg_nurbs::{BSplineSurface, NurbsError, ParamDir};
use rtcsg_prim::{Ray, SubdivisionPolicy};

use crate::trim::{RectClass, TrimRegion};

/// One sub-patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchLeaf {
    /// Control-hull box, slightly padded.
    pub aabb: Aabb3,
    /// Parameter range in u.
    pub u_range: (f64, f64),
    /// Parameter range in v.
    pub v_range: (f64, f64),
}

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf(PatchLeaf),
    Internal { aabb: Aabb3, left: usize, right: usize },
}

impl TreeNode {
    fn aabb(&self) -> &Aabb3 {
        match self {
            TreeNode::Leaf(leaf) => &leaf.aabb,
            TreeNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// Bounding-box tree of one face.
#[derive(Debug, Clone, Default)]
pub struct SurfaceTree {
    nodes: Vec<TreeNode>,
    root: Option<usize>,
}

impl SurfaceTree {
    /// Subdivide `surface` under `policy`, discarding pieces `trim` removes.
    pub fn build(
        surface: &BSplineSurface,
        trim: &TrimRegion,
        policy: &SubdivisionPolicy,
    ) -> Result<Self, NurbsError> {
        let mut tree = SurfaceTree::default();
        tree.root = tree.subdivide(surface.clone(), 0, trim, policy)?;
        Ok(tree)
    }

    fn subdivide(
        &mut self,
        patch: BSplineSurface,
        depth: usize,
        trim: &TrimRegion,
        policy: &SubdivisionPolicy,
    ) -> Result<Option<usize>, NurbsError> {
        let (u_range, v_range) = patch.parameter_domain();
        if trim.classify_rect(u_range, v_range) == RectClass::Outside {
            return Ok(None);
        }
        if depth >= policy.max_depth || is_flat(&patch, policy.flatness) {
            let mut aabb = patch.bounds();
            aabb.expand(1e-9 * (1.0 + aabb.extent().norm()));
            return Ok(Some(self.push(TreeNode::Leaf(PatchLeaf {
                aabb,
                u_range,
                v_range,
            }))));
        }
        let (a, b) = patch.split(longer_direction(&patch))?;
        let left = self.subdivide(a, depth + 1, trim, policy)?;
        let right = self.subdivide(b, depth + 1, trim, policy)?;
        Ok(match (left, right) {
            (Some(l), Some(r)) => {
                let aabb = self.nodes[l].aabb().union(self.nodes[r].aabb());
                Some(self.push(TreeNode::Internal {
                    aabb,
                    left: l,
                    right: r,
                }))
            }
            (one, None) | (None, one) => one,
        })
    }

    fn push(&mut self, node: TreeNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Box of the whole face, or `None` when every piece was trimmed away.
    pub fn bounds(&self) -> Option<Aabb3> {
        self.root.map(|r| *self.nodes[r].aabb())
    }

    /// Every leaf, in build order.
    pub fn leaves(&self) -> impl Iterator<Item = &PatchLeaf> {
        self.nodes.iter().filter_map(|n| match n {
            TreeNode::Leaf(leaf) => Some(leaf),
            TreeNode::Internal { .. } => None,
        })
    }

    /// Call `visit` for each leaf whose box the ray's line meets.
    pub fn visit_leaves(&self, ray: &Ray, mut visit: impl FnMut(&PatchLeaf)) {
        let Some(root) = self.root else {
            return;
        };
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if ray.slab(node.aabb()).is_none() {
                continue;
            }
            match node {
                TreeNode::Leaf(leaf) => visit(leaf),
                TreeNode::Internal { left, right, .. } => {
                    stack.push(*right);
                    stack.push(*left);
                }
            }
        }
    }
}

/// Control points all lie within `flatness * diagonal` of the plane
/// through the corner points.
fn is_flat(patch: &BSplineSurface, flatness: f64) -> bool {
    let (nu, nv) = (patch.n_u - 1, patch.n_v - 1);
    let c00 = patch.cp(0, 0);
    let c10 = patch.cp(nu, 0);
    let c01 = patch.cp(0, nv);
    let c11 = patch.cp(nu, nv);
    let diag = patch.bounds().extent().norm();
    if diag <= 0.0 {
        return true;
    }
    let normal = (c11 - c00).cross(&(c01 - c10));
    let Some(normal) = normal.try_normalize(1e-300) else {
        return false;
    };
    let center = (c00.coords + c10.coords + c01.coords + c11.coords) / 4.0;
    let limit = flatness * diag;
    let planar = patch
        .control_points
        .iter()
        .all(|p| (p.coords - center).dot(&normal).abs() <= limit);
    // a curved but planar net still needs splitting if its edges bow
    planar && edges_straight(patch, limit)
}

fn edges_straight(patch: &BSplineSurface, limit: f64) -> bool {
    let (nu, nv) = (patch.n_u - 1, patch.n_v - 1);
    let deviation = |a: Vec3, b: Vec3, p: Vec3| -> f64 {
        let ab = b - a;
        let len = ab.norm();
        if len <= 0.0 {
            return (p - a).norm();
        }
        (p - a).cross(&ab).norm() / len
    };
    let row_ok = [0, nv].iter().all(|&v| {
        let (a, b) = (patch.cp(0, v).coords, patch.cp(nu, v).coords);
        (0..=nu).all(|u| deviation(a, b, patch.cp(u, v).coords) <= limit)
    });
    let col_ok = [0, nu].iter().all(|&u| {
        let (a, b) = (patch.cp(u, 0).coords, patch.cp(u, nv).coords);
        (0..=nv).all(|v| deviation(a, b, patch.cp(u, v).coords) <= limit)
    });
    row_ok && col_ok
}

/// Direction along which the control net is longer.
fn longer_direction(patch: &BSplineSurface) -> ParamDir {
    let (nu, nv) = (patch.n_u - 1, patch.n_v - 1);
    let u_len = (0..=nv)
        .map(|v| (patch.cp(nu, v) - patch.cp(0, v)).norm())
        .fold(0.0, f64::max);
    let v_len = (0..=nu)
        .map(|u| (patch.cp(u, nv) - patch.cp(u, 0)).norm())
        .fold(0.0, f64::max);
    if u_len >= v_len {
        ParamDir::U
    } else {
        ParamDir::V
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{parabolic_trough, square_face, unit_square_loop};
    use rtcsg_math::Point3;
    use rtcsg_prim::LoopOrientation;

    #[test]
    fn test_flat_face_is_one_leaf() {
        let face = square_face(Point3::origin(), Vec3::x(), Vec3::y());
        let tree =
            SurfaceTree::build(&face, &TrimRegion::default(), &SubdivisionPolicy::default())
                .unwrap();
        assert_eq!(tree.leaves().count(), 1);
        let leaf = tree.leaves().next().unwrap();
        assert_eq!(leaf.u_range, (0.0, 1.0));
    }

    #[test]
    fn test_curved_face_subdivides() {
        let trough = parabolic_trough();
        let policy = SubdivisionPolicy::default();
        let tree = SurfaceTree::build(&trough, &TrimRegion::default(), &policy).unwrap();
        let leaves: Vec<_> = tree.leaves().collect();
        assert!(leaves.len() > 1);
        // leaves tile the domain
        let area: f64 = leaves
            .iter()
            .map(|l| (l.u_range.1 - l.u_range.0) * (l.v_range.1 - l.v_range.0))
            .sum();
        assert!((area - 1.0).abs() < 1e-12);
        // and their boxes hold the surface
        let bounds = tree.bounds().unwrap();
        for i in 0..=10 {
            let p = trough.eval(i as f64 / 10.0, 0.3);
            assert!(bounds.contains(&p));
            assert!(leaves.iter().any(|l| l.aabb.contains(&p)));
        }
    }

    #[test]
    fn test_depth_limit() {
        let policy = SubdivisionPolicy {
            max_depth: 2,
            flatness: 0.0,
        };
        let tree = SurfaceTree::build(&parabolic_trough(), &TrimRegion::default(), &policy)
            .unwrap();
        assert_eq!(tree.leaves().count(), 4);
    }

    #[test]
    fn test_trimmed_leaves_are_dropped() {
        let trough = parabolic_trough();
        let policy = SubdivisionPolicy::default();
        let full = SurfaceTree::build(&trough, &TrimRegion::default(), &policy).unwrap();
        // keep only u, v in [0, 0.25]
        let trim = TrimRegion::new(
            &[unit_square_loop(0.0, 0.25, LoopOrientation::Same)],
            1e-9,
        )
        .unwrap();
        let trimmed = SurfaceTree::build(&trough, &trim, &policy).unwrap();
        assert!(trimmed.leaves().count() < full.leaves().count());
        for leaf in trimmed.leaves() {
            assert!(leaf.u_range.0 <= 0.25 && leaf.v_range.0 <= 0.25);
        }
    }

    #[test]
    fn test_visit_prunes_by_box() {
        let trough = parabolic_trough();
        let tree =
            SurfaceTree::build(&trough, &TrimRegion::default(), &SubdivisionPolicy::default())
                .unwrap();
        let ray = Ray::new(Point3::new(0.5, 0.2, 5.0), -Vec3::z());
        let mut visited = Vec::new();
        tree.visit_leaves(&ray, |leaf| visited.push(leaf.clone()));
        assert!(!visited.is_empty());
        assert!(visited.len() < tree.leaves().count());
        assert!(visited
            .iter()
            .any(|l| l.u_range.0 <= 0.75 && 0.75 <= l.u_range.1));
    }
}
