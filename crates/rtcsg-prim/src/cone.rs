//! Truncated elliptical cone.
//!
//! In the local frame `p = base + x a + y b + z h` the solid is
//! `x^2 + y^2 <= (1 + s z)^2` for `0 <= z <= 1`, where `s = top_ratio - 1`.
//! A cylinder has `s = 0` and a cone closing to a point has `s = -1`.

use std::f64::consts::PI;

use nalgebra::Matrix3;
use rtcsg_math::{any_perpendicular, Aabb3, Point2, Point3, Tolerance, Transform, Vec3};

use crate::plot::{ellipse_segments, TriangleMesh};
use crate::table::check_transform;
use crate::{
    BoundingSphere, Curvature, GeometryRecord, Hit, ImportError, LineSegment, PlotTolerances,
    PrepError, PrepOptions, Primitive, PrimitiveKind, Ray, Segment, SolidInternal, SurfacePoint,
};

const SIDE: u32 = 0;
const BASE_CAP: u32 = 1;
const TOP_CAP: u32 = 2;

/// Imported cone in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ConeInternal {
    /// Center of the base ellipse.
    pub base: Point3,
    /// Base to top.
    pub height: Vec3,
    /// First base semi-axis.
    pub a: Vec3,
    /// Second base semi-axis.
    pub b: Vec3,
    /// Top semi-axes are the base ones scaled by this.
    pub top_ratio: f64,
}

impl ConeInternal {
    /// Validated cone.
    pub fn new(
        base: Point3,
        height: Vec3,
        a: Vec3,
        b: Vec3,
        top_ratio: f64,
    ) -> Result<Self, ImportError> {
        let finite = [base.coords, height, a, b]
            .iter()
            .all(|v| v.iter().all(|c| c.is_finite()))
            && top_ratio.is_finite();
        if !finite {
            return Err(ImportError::NonFinite(PrimitiveKind::Cone));
        }
        let tol = Tolerance::DEFAULT;
        for (what, v) in [("a", &a), ("b", &b)] {
            if !(v.norm() > tol.linear) {
                return Err(ImportError::NegativeRadius {
                    what,
                    value: v.norm(),
                });
            }
        }
        if top_ratio < 0.0 {
            return Err(ImportError::NegativeRadius {
                what: "top_ratio",
                value: top_ratio,
            });
        }
        if !(height.norm() > tol.linear) {
            return Err(ImportError::degenerate("cone height has zero length"));
        }
        let volume = a.cross(&b).dot(&height).abs();
        if volume <= tol.perp * a.norm() * b.norm() * height.norm() {
            return Err(ImportError::degenerate("cone axes are dependent"));
        }
        Ok(Self {
            base,
            height,
            a,
            b,
            top_ratio,
        })
    }

    fn frame(&self) -> Matrix3<f64> {
        Matrix3::from_columns(&[self.a, self.b, self.height])
    }

    fn max_radius(&self) -> f64 {
        self.a.norm().max(self.b.norm()) * self.top_ratio.max(1.0)
    }

    fn slope(&self) -> f64 {
        self.top_ratio - 1.0
    }
}

/// Importer registered for [`PrimitiveKind::Cone`].
pub fn import(
    record: &GeometryRecord,
    xform: &Transform,
) -> Result<Box<dyn SolidInternal>, ImportError> {
    let GeometryRecord::Cone {
        base,
        height,
        a,
        b,
        top_ratio,
    } = record
    else {
        return Err(ImportError::BadRecordType {
            expected: PrimitiveKind::Cone,
            found: record.kind(),
        });
    };
    check_transform(xform)?;
    let cone = ConeInternal::new(
        xform.apply_point(base),
        xform.apply_vec(height),
        xform.apply_vec(a),
        xform.apply_vec(b),
        *top_ratio,
    )?;
    Ok(Box::new(cone))
}

impl SolidInternal for ConeInternal {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Cone
    }

    fn prep(&self, _opts: &PrepOptions) -> Result<Box<dyn Primitive>, PrepError> {
        let frame = self.frame();
        let inv = frame
            .try_inverse()
            .ok_or_else(|| PrepError::degenerate("cone frame is singular"))?;

        let half = Vec3::new(
            self.a.x.hypot(self.b.x),
            self.a.y.hypot(self.b.y),
            self.a.z.hypot(self.b.z),
        );
        let top = self.base + self.height;
        let bounds = Aabb3::new(self.base - half, self.base + half).union(&Aabb3::new(
            top - half * self.top_ratio,
            top + half * self.top_ratio,
        ));
        let center = bounds.center();

        Ok(Box::new(ConePrimitive {
            base: self.base,
            inv,
            slope: self.slope(),
            top_ratio: self.top_ratio,
            bounds,
            sphere: BoundingSphere {
                center,
                radius: bounds.bounding_radius(),
            },
        }))
    }

    fn plot(&self, tol: &PlotTolerances) -> Box<dyn Iterator<Item = LineSegment> + '_> {
        let n = tol.segments_for_radius(self.max_radius());
        let top = self.base + self.height;
        let k = self.top_ratio;
        let generators = [self.a, self.b, -self.a, -self.b]
            .into_iter()
            .map(move |v| LineSegment::new(self.base + v, top + v * k));
        let top_ring = (k > 0.0)
            .then(|| ellipse_segments(top, self.a * k, self.b * k, n))
            .into_iter()
            .flatten();
        Box::new(
            ellipse_segments(self.base, self.a, self.b, n)
                .chain(top_ring)
                .chain(generators),
        )
    }

    fn tessellate(&self, tol: &PlotTolerances) -> TriangleMesh {
        let n = tol.segments_for_radius(self.max_radius());
        let inv_t = self
            .frame()
            .try_inverse()
            .map(|m| m.transpose())
            .unwrap_or_else(Matrix3::zeros);
        let flip = self.frame().determinant() < 0.0;
        let s = self.slope();
        let k = self.top_ratio;
        let top = self.base + self.height;

        let mut mesh = TriangleMesh::new();
        let tri = |mesh: &mut TriangleMesh, a: u32, b: u32, c: u32| {
            if flip {
                mesh.push_triangle(a, c, b);
            } else {
                mesh.push_triangle(a, b, c);
            }
        };

        // side: two rings sharing normals along each generator
        let ring = n + 1;
        for (z, r) in [(0.0, 1.0), (1.0, k)] {
            for i in 0..ring {
                let phi = 2.0 * PI * i as f64 / n as f64;
                let (sin, cos) = phi.sin_cos();
                let p = self.base + self.height * z + (self.a * cos + self.b * sin) * r;
                let normal = (inv_t * Vec3::new(cos, sin, -s)).normalize();
                mesh.push_vertex(&p, &normal);
            }
        }
        for i in 0..n as u32 {
            let (b0, b1) = (i, i + 1);
            let (t0, t1) = (i + ring as u32, i + 1 + ring as u32);
            tri(&mut mesh, b0, b1, t1);
            if k > 0.0 {
                tri(&mut mesh, b0, t1, t0);
            }
        }

        // caps
        let base_normal = (inv_t * -Vec3::z()).normalize();
        let c = mesh.push_vertex(&self.base, &base_normal);
        let first = mesh.num_vertices() as u32;
        for i in 0..ring {
            let phi = 2.0 * PI * i as f64 / n as f64;
            let p = self.base + self.a * phi.cos() + self.b * phi.sin();
            mesh.push_vertex(&p, &base_normal);
        }
        for i in 0..n as u32 {
            tri(&mut mesh, c, first + i + 1, first + i);
        }
        if k > 0.0 {
            let top_normal = -base_normal;
            let c = mesh.push_vertex(&top, &top_normal);
            let first = mesh.num_vertices() as u32;
            for i in 0..ring {
                let phi = 2.0 * PI * i as f64 / n as f64;
                let p = top + (self.a * phi.cos() + self.b * phi.sin()) * k;
                mesh.push_vertex(&p, &top_normal);
            }
            for i in 0..n as u32 {
                tri(&mut mesh, c, first + i, first + i + 1);
            }
        }
        mesh
    }

    fn export(&self) -> GeometryRecord {
        GeometryRecord::Cone {
            base: self.base,
            height: self.height,
            a: self.a,
            b: self.b,
            top_ratio: self.top_ratio,
        }
    }
}

/// Prepared cone.
#[derive(Debug, Clone)]
pub struct ConePrimitive {
    base: Point3,
    /// World to local.
    inv: Matrix3<f64>,
    slope: f64,
    top_ratio: f64,
    bounds: Aabb3,
    sphere: BoundingSphere,
}

impl ConePrimitive {
    fn local_normal(&self, hit: &Hit) -> Vec3 {
        match hit.surface {
            BASE_CAP => -Vec3::z(),
            TOP_CAP => Vec3::z(),
            _ => {
                let p = hit.vpriv;
                Vec3::new(p.x, p.y, -self.slope * (1.0 + self.slope * p.z))
            }
        }
    }
}

impl Primitive for ConePrimitive {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Cone
    }

    fn bounds(&self) -> &Aabb3 {
        &self.bounds
    }

    fn bounding_sphere(&self) -> BoundingSphere {
        self.sphere
    }

    fn shot(&self, ray: &Ray) -> Vec<Segment> {
        let o = self.inv * (ray.origin - self.base);
        let d = self.inv * ray.dir();
        let s = self.slope;
        let mut hits: Vec<Hit> = Vec::with_capacity(4);
        let local = |t: f64| o + d * t;

        // side
        let r0 = 1.0 + s * o.z;
        let rd = s * d.z;
        let qa = d.x * d.x + d.y * d.y - rd * rd;
        let qb = 2.0 * (o.x * d.x + o.y * d.y - r0 * rd);
        let qc = o.x * o.x + o.y * o.y - r0 * r0;
        let mut side_roots = Vec::with_capacity(2);
        if qa.abs() > 1e-14 {
            let disc = qb * qb - 4.0 * qa * qc;
            if disc > 0.0 {
                let root = disc.sqrt();
                side_roots.push((-qb - root) / (2.0 * qa));
                side_roots.push((-qb + root) / (2.0 * qa));
            }
        } else if qb.abs() > 1e-14 {
            side_roots.push(-qc / qb);
        }
        for t in side_roots {
            let p = local(t);
            if (0.0..=1.0).contains(&p.z) && r0 + rd * t >= 0.0 {
                hits.push(Hit::new(t, SIDE).with_vpriv(p));
            }
        }

        // caps
        if d.z.abs() > 1e-14 {
            for (z, r, surface) in [(0.0, 1.0, BASE_CAP), (1.0, self.top_ratio, TOP_CAP)] {
                if r <= 0.0 {
                    continue;
                }
                let t = (z - o.z) / d.z;
                let p = local(t);
                if p.x * p.x + p.y * p.y <= r * r {
                    hits.push(Hit::new(t, surface).with_vpriv(p));
                }
            }
        }

        if hits.len() < 2 {
            return Vec::new();
        }
        hits.sort_by(|x, y| x.dist.total_cmp(&y.dist));
        let (entry, exit) = (hits[0], hits[hits.len() - 1]);
        if exit.dist - entry.dist <= 0.0 {
            return Vec::new();
        }
        vec![Segment::new(entry, exit)]
    }

    fn norm(&self, hit: &Hit, ray: &Ray) -> SurfacePoint {
        let normal = (self.inv.transpose() * self.local_normal(hit)).normalize();
        SurfacePoint {
            point: ray.at(hit.dist),
            normal,
        }
    }

    fn curvature(&self, hit: &Hit, ray: &Ray) -> Curvature {
        let inv_t = self.inv.transpose();
        if hit.surface != SIDE {
            let n = (inv_t * self.local_normal(hit)).normalize();
            return Curvature {
                c1: 0.0,
                c2: 0.0,
                direction: any_perpendicular(&n),
            };
        }
        let grad = inv_t * self.local_normal(hit);
        let local_hess = Matrix3::from_diagonal(&Vec3::new(1.0, 1.0, -self.slope * self.slope));
        let hess = inv_t * local_hess * self.inv;
        if grad.norm() <= 0.0 {
            // apex
            let n = self.norm(hit, ray).normal;
            return Curvature::flat(&n);
        }
        Curvature::from_implicit(&grad, &hess)
    }

    fn uv(&self, hit: &Hit, _ray: &Ray) -> Point2 {
        let p = hit.vpriv;
        let u = (p.y.atan2(p.x) / (2.0 * PI) + 0.5).clamp(0.0, 1.0);
        let rho = p.x.hypot(p.y);
        let v = match hit.surface {
            BASE_CAP => rho,
            TOP_CAP if self.top_ratio > 0.0 => rho / self.top_ratio,
            TOP_CAP => 0.0,
            _ => p.z,
        };
        Point2::new(u, v.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn prepped(rec: GeometryRecord) -> Box<dyn Primitive> {
        import(&rec, &Transform::identity())
            .unwrap()
            .prep(&PrepOptions::default())
            .unwrap()
    }

    fn cylinder() -> Box<dyn Primitive> {
        prepped(GeometryRecord::rcc(
            Point3::origin(),
            Vec3::new(0.0, 0.0, 2.0),
            1.0,
        ))
    }

    #[test]
    fn test_cylinder_side_shot() {
        let prim = cylinder();
        let ray = Ray::new(Point3::new(-5.0, 0.0, 1.0), Vec3::x());
        let segs = prim.shot(&ray);
        assert_eq!(segs.len(), 1);
        assert_relative_eq!(segs[0].entry.dist, 4.0, epsilon = 1e-12);
        assert_relative_eq!(segs[0].exit.dist, 6.0, epsilon = 1e-12);
        assert_eq!(segs[0].entry.surface, SIDE);
        let n = prim.norm(&segs[0].entry, &ray).normal;
        assert!((n + Vec3::x()).norm() < 1e-9);
    }

    #[test]
    fn test_cylinder_cap_shot() {
        let prim = cylinder();
        let ray = Ray::new(Point3::new(0.5, 0.0, -5.0), Vec3::z());
        let segs = prim.shot(&ray);
        assert_relative_eq!(segs[0].entry.dist, 5.0, epsilon = 1e-12);
        assert_relative_eq!(segs[0].exit.dist, 7.0, epsilon = 1e-12);
        assert_eq!(segs[0].entry.surface, BASE_CAP);
        assert_eq!(segs[0].exit.surface, TOP_CAP);
        assert!((prim.norm(&segs[0].entry, &ray).normal + Vec3::z()).norm() < 1e-12);
        assert!((prim.norm(&segs[0].exit, &ray).normal - Vec3::z()).norm() < 1e-12);
    }

    #[test]
    fn test_truncated_cone_shot() {
        let prim = prepped(GeometryRecord::trc(
            Point3::origin(),
            Vec3::new(0.0, 0.0, 1.0),
            1.0,
            0.5,
        ));
        let segs = prim.shot(&Ray::new(Point3::new(-5.0, 0.0, 0.5), Vec3::x()));
        assert_relative_eq!(segs[0].entry.dist, 4.25, epsilon = 1e-12);
        assert_relative_eq!(segs[0].exit.dist, 5.75, epsilon = 1e-12);
    }

    #[test]
    fn test_miss_above_top() {
        let prim = cylinder();
        assert!(prim
            .shot(&Ray::new(Point3::new(-5.0, 0.0, 2.5), Vec3::x()))
            .is_empty());
        assert!(prim
            .shot(&Ray::new(Point3::new(3.0, 0.0, -5.0), Vec3::z()))
            .is_empty());
    }

    #[test]
    fn test_cylinder_curvature() {
        let prim = cylinder();
        let ray = Ray::new(Point3::new(-5.0, 0.0, 1.0), Vec3::x());
        let segs = prim.shot(&ray);
        let c = prim.curvature(&segs[0].entry, &ray);
        assert_relative_eq!(c.c1, -1.0, epsilon = 1e-9);
        assert_relative_eq!(c.c2, 0.0, epsilon = 1e-9);
        // the curved direction runs around the axis
        assert!(c.direction.z.abs() < 1e-9);
    }

    #[test]
    fn test_uv_in_range() {
        let prim = cylinder();
        let ray = Ray::new(Point3::new(-5.0, 0.3, 0.4), Vec3::x());
        for seg in prim.shot(&ray) {
            for hit in [seg.entry, seg.exit] {
                let uv = prim.uv(&hit, &ray);
                assert!((0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y));
                assert_relative_eq!(uv.y, 0.2, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_validation() {
        let rec = GeometryRecord::Cone {
            base: Point3::origin(),
            height: Vec3::z(),
            a: Vec3::x(),
            b: Vec3::y(),
            top_ratio: -1.0,
        };
        assert!(matches!(
            import(&rec, &Transform::identity()),
            Err(ImportError::NegativeRadius { what: "top_ratio", .. })
        ));
        let flat = GeometryRecord::Cone {
            base: Point3::origin(),
            height: Vec3::x(),
            a: Vec3::x(),
            b: Vec3::y(),
            top_ratio: 1.0,
        };
        assert!(matches!(
            import(&flat, &Transform::identity()),
            Err(ImportError::DegenerateAxis(_))
        ));
        let sphere = GeometryRecord::sphere(Point3::origin(), 1.0);
        assert!(matches!(
            import(&sphere, &Transform::identity()),
            Err(ImportError::BadRecordType { .. })
        ));
    }

    #[test]
    fn test_plot_counts() {
        let tol = PlotTolerances::default();
        let trc = ConeInternal::new(Point3::origin(), Vec3::z(), Vec3::x(), Vec3::y(), 0.5).unwrap();
        let n = tol.segments_for_radius(1.0);
        assert_eq!(trc.plot(&tol).count(), 2 * n + 4);
        let pointed =
            ConeInternal::new(Point3::origin(), Vec3::z(), Vec3::x(), Vec3::y(), 0.0).unwrap();
        assert_eq!(pointed.plot(&tol).count(), n + 4);
    }

    #[test]
    fn test_tessellation_faces_outward() {
        let tol = PlotTolerances::default();
        for ratio in [1.0, 0.5, 0.0] {
            let cone =
                ConeInternal::new(Point3::origin(), Vec3::new(0.0, 0.0, 2.0), Vec3::x(), Vec3::y(), ratio)
                    .unwrap();
            let mesh = cone.tessellate(&tol);
            let inside = Point3::new(0.0, 0.0, 0.5);
            for t in mesh.indices.chunks(3) {
                let (a, b, c) = (mesh.vertex(t[0]), mesh.vertex(t[1]), mesh.vertex(t[2]));
                let n = (b - a).cross(&(c - a));
                let centroid = Point3::from((a.coords + b.coords + c.coords) / 3.0);
                assert!(n.dot(&(centroid - inside)) > 0.0);
            }
        }
    }

    #[test]
    fn test_import_follows_transform() {
        let rec = GeometryRecord::rcc(Point3::origin(), Vec3::z(), 1.0);
        let moved = import(&rec, &Transform::translation(0.0, 0.0, 10.0)).unwrap();
        let GeometryRecord::Cone { base, .. } = moved.export() else {
            panic!("wrong record kind");
        };
        assert_eq!(base, Point3::new(0.0, 0.0, 10.0));
    }
}
