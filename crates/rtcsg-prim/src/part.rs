//! Particle: the convex hull of two spheres.
//!
//! A sphere of radius `base_radius` sits at `base` and one of
//! `top_radius` at `base + height`; the body between them is the cone
//! tangent to both. Depending on the proportions the particle collapses
//! to a plain sphere or a capsule, see [`classify`].

use std::f64::consts::{FRAC_PI_2, PI};

use rtcsg_math::{any_perpendicular, Aabb3, Point2, Point3, Transform, Vec3};
use serde::{Deserialize, Serialize};

use crate::plot::{arc_segments, ellipse_segments, revolve_profile, ProfilePoint, TriangleMesh};
use crate::table::check_transform;
use crate::{
    BoundingSphere, Curvature, GeometryRecord, Hit, ImportError, LineSegment, ParticlePolicy,
    PlotTolerances, PrepError, PrepOptions, Primitive, PrimitiveKind, Ray, Segment, SolidInternal,
    SurfacePoint,
};

const BASE_SPHERE: u32 = 0;
const TOP_SPHERE: u32 = 1;
const BODY: u32 = 2;

/// Shape a particle degenerates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleKind {
    /// Height negligible next to the radii.
    Sphere,
    /// Equal radii: a capsule.
    Cylinder,
    /// Distinct radii.
    Cone,
}

/// Decide which shape a particle takes.
pub fn classify(
    height: &Vec3,
    base_radius: f64,
    top_radius: f64,
    policy: &ParticlePolicy,
) -> ParticleKind {
    let max_r = base_radius.max(top_radius);
    let min_r = base_radius.min(top_radius);
    if height.norm_squared() < policy.sphere_height_ratio * max_r * max_r {
        ParticleKind::Sphere
    } else if (max_r - min_r) / max_r < policy.cylinder_radius_ratio {
        ParticleKind::Cylinder
    } else {
        ParticleKind::Cone
    }
}

/// Imported particle in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PartInternal {
    /// Center of the base sphere.
    pub base: Point3,
    /// Base center to top center.
    pub height: Vec3,
    /// Base sphere radius.
    pub base_radius: f64,
    /// Top sphere radius.
    pub top_radius: f64,
}

impl PartInternal {
    /// Validated particle.
    pub fn new(
        base: Point3,
        height: Vec3,
        base_radius: f64,
        top_radius: f64,
    ) -> Result<Self, ImportError> {
        let finite = base.coords.iter().chain(height.iter()).all(|c| c.is_finite())
            && base_radius.is_finite()
            && top_radius.is_finite();
        if !finite {
            return Err(ImportError::NonFinite(PrimitiveKind::Part));
        }
        for (what, value) in [("base_radius", base_radius), ("top_radius", top_radius)] {
            if value < 0.0 {
                return Err(ImportError::NegativeRadius { what, value });
            }
        }
        let max_r = base_radius.max(top_radius);
        if max_r <= 0.0 {
            return Err(ImportError::NegativeRadius {
                what: "radius",
                value: max_r,
            });
        }
        Ok(Self {
            base,
            height,
            base_radius,
            top_radius,
        })
    }

    fn hull(&self, policy: &ParticlePolicy) -> Hull {
        let kind = classify(&self.height, self.base_radius, self.top_radius, policy);
        let length = self.height.norm();
        let axis = self.height.try_normalize(0.0).unwrap_or_else(Vec3::z);
        let u = any_perpendicular(&axis);
        let w = axis.cross(&u);
        let max_r = self.base_radius.max(self.top_radius);
        let (r0, r1) = match kind {
            ParticleKind::Cylinder => (max_r, max_r),
            _ => (self.base_radius, self.top_radius),
        };
        let shape = match kind {
            ParticleKind::Sphere => HullShape::Sphere {
                center_z: 0.0,
                radius: max_r,
            },
            // one sphere swallows the other
            _ if length + r0.min(r1) <= r0.max(r1) => HullShape::Sphere {
                center_z: if r0 >= r1 { 0.0 } else { length },
                radius: max_r,
            },
            _ => {
                let sin_a = (r0 - r1) / length;
                HullShape::Capped {
                    sin_a,
                    cos_a: (1.0 - sin_a * sin_a).max(0.0).sqrt(),
                }
            }
        };
        Hull {
            kind,
            origin: self.base,
            u,
            w,
            axis,
            length,
            r0,
            r1,
            shape,
        }
    }
}

/// Importer registered for [`PrimitiveKind::Part`].
pub fn import(
    record: &GeometryRecord,
    xform: &Transform,
) -> Result<Box<dyn SolidInternal>, ImportError> {
    let GeometryRecord::Part {
        base,
        height,
        base_radius,
        top_radius,
    } = record
    else {
        return Err(ImportError::BadRecordType {
            expected: PrimitiveKind::Part,
            found: record.kind(),
        });
    };
    check_transform(xform)?;
    let scale = xform
        .uniform_scale()
        .ok_or(ImportError::NonUniformScale(PrimitiveKind::Part))?;
    let part = PartInternal::new(
        xform.apply_point(base),
        xform.apply_vec(height),
        base_radius * scale,
        top_radius * scale,
    )?;
    Ok(Box::new(part))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum HullShape {
    /// A single sphere on the axis.
    Sphere { center_z: f64, radius: f64 },
    /// Two spherical caps joined by a tangent cone whose half-angle has
    /// sine `sin_a` (positive when the base is larger).
    Capped { sin_a: f64, cos_a: f64 },
}

/// Particle geometry in the axial frame `(u, w, axis)` at the base center.
#[derive(Debug, Clone, Copy)]
struct Hull {
    kind: ParticleKind,
    origin: Point3,
    u: Vec3,
    w: Vec3,
    axis: Vec3,
    length: f64,
    r0: f64,
    r1: f64,
    shape: HullShape,
}

impl Hull {
    fn to_world(&self, local: &Vec3) -> Vec3 {
        self.u * local.x + self.w * local.y + self.axis * local.z
    }

    fn to_local(&self, v: &Vec3) -> Vec3 {
        Vec3::new(v.dot(&self.u), v.dot(&self.w), v.dot(&self.axis))
    }

    fn bounds(&self) -> Aabb3 {
        let sphere_box = |c: Point3, r: f64| {
            let h = Vec3::repeat(r);
            Aabb3::new(c - h, c + h)
        };
        match self.shape {
            HullShape::Sphere { center_z, radius } => {
                sphere_box(self.origin + self.axis * center_z, radius)
            }
            HullShape::Capped { .. } => sphere_box(self.origin, self.r0).union(&sphere_box(
                self.origin + self.axis * self.length,
                self.r1,
            )),
        }
    }

    /// Axial extent `(zmin, zmax)`.
    fn extent(&self) -> (f64, f64) {
        match self.shape {
            HullShape::Sphere { center_z, radius } => (center_z - radius, center_z + radius),
            HullShape::Capped { .. } => (-self.r0, self.length + self.r1),
        }
    }
}

impl SolidInternal for PartInternal {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Part
    }

    fn prep(&self, opts: &PrepOptions) -> Result<Box<dyn Primitive>, PrepError> {
        let hull = self.hull(&opts.particle);
        if let HullShape::Capped { cos_a, .. } = hull.shape {
            if !(cos_a > 0.0) {
                return Err(PrepError::degenerate("particle body has no tangent cone"));
            }
        }
        let bounds = hull.bounds();
        log::trace!("particle prepared as {:?}", hull.kind);
        Ok(Box::new(PartPrimitive {
            hull,
            bounds,
            sphere: BoundingSphere {
                center: bounds.center(),
                radius: bounds.bounding_radius(),
            },
        }))
    }

    fn plot(&self, tol: &PlotTolerances) -> Box<dyn Iterator<Item = LineSegment> + '_> {
        let hull = self.hull(&ParticlePolicy::default());
        let n = tol.segments_for_radius(hull.r0.max(hull.r1));
        let half = (n / 2).max(2);
        let (u, w, axis) = (hull.u, hull.w, hull.axis);
        match hull.shape {
            HullShape::Sphere { center_z, radius } => {
                let c = hull.origin + axis * center_z;
                Box::new(
                    ellipse_segments(c, u * radius, w * radius, n)
                        .chain(ellipse_segments(c, u * radius, axis * radius, n))
                        .chain(ellipse_segments(c, w * radius, axis * radius, n)),
                )
            }
            HullShape::Capped { sin_a, cos_a } => {
                let alpha = sin_a.asin();
                let (r0, r1) = (hull.r0, hull.r1);
                let c0 = hull.origin;
                let c1 = hull.origin + axis * hull.length;
                let ring0 = c0 + axis * (r0 * sin_a);
                let ring1 = c1 + axis * (r1 * sin_a);
                let (rho0, rho1) = (r0 * cos_a, r1 * cos_a);
                let generators = [u, w, -u, -w]
                    .into_iter()
                    .map(move |e| LineSegment::new(ring0 + e * rho0, ring1 + e * rho1));
                let caps = [u, w].into_iter().flat_map(move |e| {
                    arc_segments(c0, e * r0, axis * r0, alpha, -PI - alpha, half)
                        .chain(arc_segments(c1, e * r1, axis * r1, alpha, PI - alpha, half))
                });
                Box::new(
                    ellipse_segments(ring0, u * rho0, w * rho0, n)
                        .chain(ellipse_segments(ring1, u * rho1, w * rho1, n))
                        .chain(generators)
                        .chain(caps),
                )
            }
        }
    }

    fn tessellate(&self, tol: &PlotTolerances) -> TriangleMesh {
        let hull = self.hull(&ParticlePolicy::default());
        let n = tol.segments_for_radius(hull.r0.max(hull.r1));
        let steps = (n / 4).max(2);
        let arc = |center_z: f64, r: f64, from: f64, to: f64, count: usize| {
            (0..=count).map(move |k| {
                let theta = from + (to - from) * k as f64 / count as f64;
                let (sin, cos) = theta.sin_cos();
                ProfilePoint {
                    radial: r * cos,
                    axial: center_z + r * sin,
                    n_radial: cos,
                    n_axial: sin,
                }
            })
        };
        let profile: Vec<ProfilePoint> = match hull.shape {
            HullShape::Sphere { center_z, radius } => {
                arc(center_z, radius, -FRAC_PI_2, FRAC_PI_2, 2 * steps).collect()
            }
            HullShape::Capped { sin_a, .. } => {
                let alpha = sin_a.asin();
                arc(0.0, hull.r0, -FRAC_PI_2, alpha, steps)
                    .chain(arc(hull.length, hull.r1, alpha, FRAC_PI_2, steps))
                    .collect()
            }
        };
        revolve_profile(&hull.origin, &hull.u, &hull.w, &hull.axis, &profile, n)
    }

    fn export(&self) -> GeometryRecord {
        GeometryRecord::Part {
            base: self.base,
            height: self.height,
            base_radius: self.base_radius,
            top_radius: self.top_radius,
        }
    }
}

/// Prepared particle.
#[derive(Debug, Clone)]
pub struct PartPrimitive {
    hull: Hull,
    bounds: Aabb3,
    sphere: BoundingSphere,
}

impl PartPrimitive {
    /// Shape chosen at prep time.
    pub fn particle_kind(&self) -> ParticleKind {
        self.hull.kind
    }

    fn param(&self, local: &Vec3) -> Point2 {
        let (z_min, z_max) = self.hull.extent();
        let u = local.y.atan2(local.x) / (2.0 * PI) + 0.5;
        let v = (local.z - z_min) / (z_max - z_min);
        Point2::new(u.clamp(0.0, 1.0), v.clamp(0.0, 1.0))
    }

    /// Hits of the sphere `(center_z, radius, surface)` centered on the
    /// axis, keeping those whose axial coordinate `keep` accepts.
    fn sphere_hits(
        &self,
        o: &Vec3,
        d: &Vec3,
        (center_z, r, surface): (f64, f64, u32),
        keep: impl Fn(f64) -> bool,
        out: &mut Vec<Hit>,
    ) {
        let rel = o - Vec3::new(0.0, 0.0, center_z);
        let b = rel.dot(d);
        let disc = b * b - (rel.norm_squared() - r * r);
        if r <= 0.0 || disc <= 0.0 {
            return;
        }
        let root = disc.sqrt();
        for t in [-b - root, -b + root] {
            let p = o + d * t;
            if keep(p.z) {
                let normal = (p - Vec3::new(0.0, 0.0, center_z)) / r;
                out.push(
                    Hit::new(t, surface)
                        .with_vpriv(self.hull.to_world(&normal))
                        .with_param(self.param(&p)),
                );
            }
        }
    }

    fn body_hits(&self, o: &Vec3, d: &Vec3, sin_a: f64, cos_a: f64, out: &mut Vec<Hit>) {
        let h = &self.hull;
        let (z0, z1) = (h.r0 * sin_a, h.length + h.r1 * sin_a);
        let rho0 = h.r0 * cos_a;
        let m = -sin_a / cos_a;
        let r_at_o = rho0 + m * (o.z - z0);
        let rd = m * d.z;
        let qa = d.x * d.x + d.y * d.y - rd * rd;
        let qb = 2.0 * (o.x * d.x + o.y * d.y - r_at_o * rd);
        let qc = o.x * o.x + o.y * o.y - r_at_o * r_at_o;
        let mut roots = Vec::with_capacity(2);
        if qa.abs() > 1e-14 {
            let disc = qb * qb - 4.0 * qa * qc;
            if disc > 0.0 {
                let root = disc.sqrt();
                roots.extend([(-qb - root) / (2.0 * qa), (-qb + root) / (2.0 * qa)]);
            }
        } else if qb.abs() > 1e-14 {
            roots.push(-qc / qb);
        }
        for t in roots {
            let p = o + d * t;
            if p.z < z0 || p.z > z1 || r_at_o + rd * t < 0.0 {
                continue;
            }
            let radial = Vec3::new(p.x, p.y, 0.0)
                .try_normalize(0.0)
                .unwrap_or_else(Vec3::x);
            let normal = radial * cos_a + Vec3::z() * sin_a;
            out.push(
                Hit::new(t, BODY)
                    .with_vpriv(h.to_world(&normal))
                    .with_param(self.param(&p)),
            );
        }
    }
}

impl Primitive for PartPrimitive {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Part
    }

    fn bounds(&self) -> &Aabb3 {
        &self.bounds
    }

    fn bounding_sphere(&self) -> BoundingSphere {
        self.sphere
    }

    fn shot(&self, ray: &Ray) -> Vec<Segment> {
        let h = &self.hull;
        let o = h.to_local(&(ray.origin - h.origin));
        let d = h.to_local(&ray.dir());
        let mut hits = Vec::with_capacity(6);
        match h.shape {
            HullShape::Sphere { center_z, radius } => {
                let surface = if center_z > 0.0 { TOP_SPHERE } else { BASE_SPHERE };
                self.sphere_hits(&o, &d, (center_z, radius, surface), |_| true, &mut hits);
            }
            HullShape::Capped { sin_a, cos_a } => {
                let z0 = h.r0 * sin_a;
                let z1 = h.length + h.r1 * sin_a;
                self.sphere_hits(&o, &d, (0.0, h.r0, BASE_SPHERE), |z| z <= z0, &mut hits);
                self.sphere_hits(&o, &d, (h.length, h.r1, TOP_SPHERE), |z| z >= z1, &mut hits);
                self.body_hits(&o, &d, sin_a, cos_a, &mut hits);
            }
        }
        if hits.len() < 2 {
            return Vec::new();
        }
        hits.sort_by(|a, b| a.dist.total_cmp(&b.dist));
        let (entry, exit) = (hits[0], hits[hits.len() - 1]);
        if exit.dist <= entry.dist {
            return Vec::new();
        }
        vec![Segment::new(entry, exit)]
    }

    fn norm(&self, hit: &Hit, ray: &Ray) -> SurfacePoint {
        SurfacePoint {
            point: ray.at(hit.dist),
            normal: hit.vpriv,
        }
    }

    fn curvature(&self, hit: &Hit, ray: &Ray) -> Curvature {
        let h = &self.hull;
        let n = hit.vpriv;
        match (hit.surface, h.shape) {
            (_, HullShape::Sphere { radius, .. }) => Curvature::spherical(&n, radius),
            (BASE_SPHERE, _) => Curvature::spherical(&n, h.r0),
            (TOP_SPHERE, _) => Curvature::spherical(&n, h.r1),
            (_, HullShape::Capped { cos_a, .. }) => {
                let p = h.to_local(&(ray.at(hit.dist) - h.origin));
                let rho = p.x.hypot(p.y);
                let around = h.axis.cross(&n).try_normalize(0.0);
                match around {
                    Some(direction) if rho > 0.0 => Curvature {
                        c1: -cos_a / rho,
                        c2: 0.0,
                        direction,
                    },
                    _ => Curvature::flat(&n),
                }
            }
        }
    }

    fn uv(&self, hit: &Hit, _ray: &Ray) -> Point2 {
        hit.param
    }
}
