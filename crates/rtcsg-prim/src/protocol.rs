//! The primitive intersection protocol.
//!
//! Every solid type goes through the same lifecycle: a
//! [`GeometryRecord`] is imported (with its placement matrix) into a
//! [`SolidInternal`], which is prepared into a [`Primitive`] that answers
//! ray queries. Dropping the boxed primitive releases its private state.

use std::fmt::Debug;

use rtcsg_math::{Aabb3, Point2, Tolerance};
use serde::{Deserialize, Serialize};

use crate::{
    BoundingSphere, Curvature, GeometryRecord, Hit, LineSegment, PlotTolerances, PrepError,
    PrimitiveKind, Ray, Segment, SurfacePoint, TriangleMesh,
};

/// Thresholds deciding which shape a particle degenerates to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticlePolicy {
    /// `|H|^2 < ratio * maxRadius^2` makes the particle a sphere.
    pub sphere_height_ratio: f64,
    /// `(maxR - minR) / maxR < ratio` makes the particle a cylinder.
    pub cylinder_radius_ratio: f64,
}

impl Default for ParticlePolicy {
    fn default() -> Self {
        Self {
            sphere_height_ratio: 1e-6,
            cylinder_radius_ratio: 0.001,
        }
    }
}

/// Refinement limits for free-form surface trees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubdivisionPolicy {
    /// Deepest split level.
    pub max_depth: usize,
    /// A patch is flat when its control points lie within this fraction of
    /// its diagonal from the corner plane.
    pub flatness: f64,
}

impl Default for SubdivisionPolicy {
    fn default() -> Self {
        Self {
            max_depth: 8,
            flatness: 1e-3,
        }
    }
}

/// Everything `prep` may consult.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepOptions {
    /// Distance and perpendicularity tolerances.
    pub tolerance: Tolerance,
    /// Particle classification thresholds.
    pub particle: ParticlePolicy,
    /// Free-form subdivision limits.
    pub subdivision: SubdivisionPolicy,
}

/// The imported, placed form of a solid.
pub trait SolidInternal: Send + Sync + Debug {
    /// Primitive type tag.
    fn kind(&self) -> PrimitiveKind;

    /// Precompute everything `shot` needs.
    fn prep(&self, opts: &PrepOptions) -> Result<Box<dyn Primitive>, PrepError>;

    /// Wireframe, generated lazily.
    fn plot(&self, tol: &PlotTolerances) -> Box<dyn Iterator<Item = LineSegment> + '_>;

    /// Triangle approximation.
    fn tessellate(&self, tol: &PlotTolerances) -> TriangleMesh;

    /// Serialize back into a record in world coordinates.
    fn export(&self) -> GeometryRecord;
}

/// A prepared solid that answers ray queries.
///
/// Instances are immutable once prepared, so every query takes `&self`
/// and may run concurrently.
pub trait Primitive: Send + Sync + Debug {
    /// Primitive type tag.
    fn kind(&self) -> PrimitiveKind;

    /// Axis-aligned bounds.
    fn bounds(&self) -> &Aabb3;

    /// Enclosing sphere.
    fn bounding_sphere(&self) -> BoundingSphere;

    /// All entry/exit pairs along `ray`, in increasing distance. Hits
    /// behind the origin are kept.
    fn shot(&self, ray: &Ray) -> Vec<Segment>;

    /// Batched `shot`; same results as calling `shot` per ray.
    fn vshot(&self, rays: &[Ray]) -> Vec<Vec<Segment>> {
        rays.iter().map(|r| self.shot(r)).collect()
    }

    /// Hit point and outward normal.
    fn norm(&self, hit: &Hit, ray: &Ray) -> SurfacePoint;

    /// Principal curvatures at the hit.
    fn curvature(&self, hit: &Hit, ray: &Ray) -> Curvature;

    /// Surface parameters of the hit, each in `[0, 1]`.
    fn uv(&self, hit: &Hit, ray: &Ray) -> Point2;
}

/// Shoot `rays[i]` at `instances[i]` for every `i`.
///
/// Runs of consecutive pairs sharing one instance are handed to that
/// instance's [`Primitive::vshot`] together.
pub fn vshot(instances: &[&dyn Primitive], rays: &[Ray]) -> Vec<Vec<Segment>> {
    let n = instances.len().min(rays.len());
    let mut out = Vec::with_capacity(n);
    let mut start = 0;
    while start < n {
        let inst = instances[start];
        let key = inst as *const dyn Primitive as *const ();
        let mut end = start + 1;
        while end < n && instances[end] as *const dyn Primitive as *const () == key {
            end += 1;
        }
        out.extend(inst.vshot(&rays[start..end]));
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ell::EllInternal;
    use rtcsg_math::{Point3, Vec3};

    #[test]
    fn test_vshot_matches_shot() {
        let a = EllInternal::sphere(Point3::origin(), 1.0)
            .prep(&PrepOptions::default())
            .unwrap();
        let b = EllInternal::sphere(Point3::new(5.0, 0.0, 0.0), 2.0)
            .prep(&PrepOptions::default())
            .unwrap();
        let rays = vec![
            Ray::new(Point3::new(-5.0, 0.0, 0.0), Vec3::x()),
            Ray::new(Point3::new(-5.0, 0.5, 0.0), Vec3::x()),
            Ray::new(Point3::new(-5.0, 0.0, 0.0), Vec3::x()),
            Ray::new(Point3::new(0.0, 5.0, 0.0), Vec3::y()),
        ];
        let instances: Vec<&dyn Primitive> = vec![a.as_ref(), a.as_ref(), b.as_ref(), b.as_ref()];
        let batched = vshot(&instances, &rays);
        assert_eq!(batched.len(), 4);
        for (i, segs) in batched.iter().enumerate() {
            assert_eq!(segs, &instances[i].shot(&rays[i]));
        }
        assert!(batched[3].is_empty());
    }
}
