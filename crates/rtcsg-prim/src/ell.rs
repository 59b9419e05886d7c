//! Ellipsoid.
//!
//! Rays are mapped into the frame where the ellipsoid is the unit sphere
//! (`SoR = S * R`: rotate onto the semi-axes, then scale each by its
//! inverse length) and intersected there. Distances survive the map
//! because it is linear in `t`.

use std::f64::consts::PI;

use nalgebra::Matrix3;
use rtcsg_math::{Aabb3, Point2, Point3, Tolerance, Transform, Vec3};

use crate::plot::{ellipse_segments, TriangleMesh};
use crate::table::check_transform;
use crate::{
    BoundingSphere, Curvature, GeometryRecord, Hit, ImportError, LineSegment, PlotTolerances,
    PrepError, PrepOptions, Primitive, PrimitiveKind, Ray, Segment, SolidInternal, SurfacePoint,
};

/// Imported ellipsoid in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct EllInternal {
    /// Center.
    pub center: Point3,
    /// First semi-axis.
    pub a: Vec3,
    /// Second semi-axis.
    pub b: Vec3,
    /// Third semi-axis.
    pub c: Vec3,
}

impl EllInternal {
    /// Validated ellipsoid.
    pub fn new(center: Point3, a: Vec3, b: Vec3, c: Vec3) -> Result<Self, ImportError> {
        let tol = Tolerance::DEFAULT;
        for (name, v) in [("a", &a), ("b", &b), ("c", &c)] {
            if !(v.norm() > tol.linear) {
                return Err(ImportError::degenerate(format!(
                    "semi-axis {} has zero length",
                    name
                )));
            }
        }
        if !tol.perpendicular(&a, &b) || !tol.perpendicular(&b, &c) || !tol.perpendicular(&a, &c)
        {
            return Err(ImportError::degenerate("semi-axes are not perpendicular"));
        }
        Ok(Self { center, a, b, c })
    }

    /// Sphere of radius `r`.
    pub fn sphere(center: Point3, r: f64) -> Self {
        Self {
            center,
            a: Vec3::x() * r,
            b: Vec3::y() * r,
            c: Vec3::z() * r,
        }
    }

    fn max_radius(&self) -> f64 {
        self.a.norm().max(self.b.norm()).max(self.c.norm())
    }
}

/// Importer registered for [`PrimitiveKind::Ell`].
pub fn import(
    record: &GeometryRecord,
    xform: &Transform,
) -> Result<Box<dyn SolidInternal>, ImportError> {
    let GeometryRecord::Ell { center, a, b, c } = record else {
        return Err(ImportError::BadRecordType {
            expected: PrimitiveKind::Ell,
            found: record.kind(),
        });
    };
    check_transform(xform)?;
    let ell = EllInternal::new(
        xform.apply_point(center),
        xform.apply_vec(a),
        xform.apply_vec(b),
        xform.apply_vec(c),
    )?;
    Ok(Box::new(ell))
}

impl SolidInternal for EllInternal {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Ell
    }

    fn prep(&self, _opts: &PrepOptions) -> Result<Box<dyn Primitive>, PrepError> {
        let (ma, mb, mc) = (self.a.norm(), self.b.norm(), self.c.norm());
        if ma <= 0.0 || mb <= 0.0 || mc <= 0.0 {
            return Err(PrepError::degenerate("zero-length semi-axis"));
        }
        let rot = Matrix3::from_rows(&[
            (self.a / ma).transpose(),
            (self.b / mb).transpose(),
            (self.c / mc).transpose(),
        ]);
        let scale = Matrix3::from_diagonal(&Vec3::new(1.0 / ma, 1.0 / mb, 1.0 / mc));
        let sor = scale * rot;

        let half = Vec3::new(
            (self.a.x.powi(2) + self.b.x.powi(2) + self.c.x.powi(2)).sqrt(),
            (self.a.y.powi(2) + self.b.y.powi(2) + self.c.y.powi(2)).sqrt(),
            (self.a.z.powi(2) + self.b.z.powi(2) + self.c.z.powi(2)).sqrt(),
        );
        let bounds = Aabb3::new(self.center - half, self.center + half);

        Ok(Box::new(EllPrimitive {
            center: self.center,
            sor,
            metric: sor.transpose() * sor,
            bounds,
            radius: self.max_radius(),
        }))
    }

    fn plot(&self, tol: &PlotTolerances) -> Box<dyn Iterator<Item = LineSegment> + '_> {
        let n = tol.segments_for_radius(self.max_radius());
        Box::new(
            ellipse_segments(self.center, self.a, self.b, n)
                .chain(ellipse_segments(self.center, self.b, self.c, n))
                .chain(ellipse_segments(self.center, self.a, self.c, n)),
        )
    }

    fn tessellate(&self, tol: &PlotTolerances) -> TriangleMesh {
        let n_u = tol.segments_for_radius(self.max_radius());
        let n_v = (n_u / 2).max(3);
        // parametrize right-handed so triangle winding faces outward
        let c = if self.a.cross(&self.b).dot(&self.c) < 0.0 {
            -self.c
        } else {
            self.c
        };
        let metric = {
            let (ma, mb, mc) = (self.a.norm(), self.b.norm(), self.c.norm());
            self.a * self.a.transpose() / ma.powi(4)
                + self.b * self.b.transpose() / mb.powi(4)
                + self.c * self.c.transpose() / mc.powi(4)
        };

        let mut mesh = TriangleMesh::new();
        let ring = n_u + 1;
        for j in 0..=n_v {
            let theta = PI * j as f64 / n_v as f64;
            for i in 0..ring {
                let phi = 2.0 * PI * i as f64 / n_u as f64;
                let offset = self.a * (phi.cos() * theta.sin())
                    + self.b * (phi.sin() * theta.sin())
                    + c * theta.cos();
                let normal = (metric * offset).normalize();
                mesh.push_vertex(&(self.center + offset), &normal);
            }
        }
        for j in 0..n_v {
            for i in 0..n_u {
                let a = (j * ring + i) as u32;
                let b = a + 1;
                let lower = a + ring as u32;
                let lower_next = lower + 1;
                if j != 0 {
                    mesh.push_triangle(a, lower, b);
                }
                if j != n_v - 1 {
                    mesh.push_triangle(b, lower, lower_next);
                }
            }
        }
        mesh
    }

    fn export(&self) -> GeometryRecord {
        GeometryRecord::Ell {
            center: self.center,
            a: self.a,
            b: self.b,
            c: self.c,
        }
    }
}

/// Prepared ellipsoid.
#[derive(Debug, Clone)]
pub struct EllPrimitive {
    center: Point3,
    sor: Matrix3<f64>,
    /// `SoR^T * SoR`; the ellipsoid is `x^T M x = 1` around the center.
    metric: Matrix3<f64>,
    bounds: Aabb3,
    radius: f64,
}

impl Primitive for EllPrimitive {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Ell
    }

    fn bounds(&self) -> &Aabb3 {
        &self.bounds
    }

    fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere {
            center: self.center,
            radius: self.radius,
        }
    }

    fn shot(&self, ray: &Ray) -> Vec<Segment> {
        let p = self.sor * (ray.origin - self.center);
        let d = self.sor * ray.dir();
        let dd = d.dot(&d);
        if dd <= 0.0 {
            return Vec::new();
        }
        let pd = p.dot(&d);
        let disc = pd * pd - dd * (p.dot(&p) - 1.0);
        if disc <= 0.0 {
            // tangent rays are misses
            return Vec::new();
        }
        let root = disc.sqrt();
        let t_in = (-pd - root) / dd;
        let t_out = (-pd + root) / dd;
        vec![Segment::new(
            Hit::new(t_in, 0).with_vpriv(p + d * t_in),
            Hit::new(t_out, 0).with_vpriv(p + d * t_out),
        )]
    }

    fn norm(&self, hit: &Hit, ray: &Ray) -> SurfacePoint {
        let normal = (self.sor.transpose() * hit.vpriv).normalize();
        SurfacePoint {
            point: ray.at(hit.dist),
            normal,
        }
    }

    fn curvature(&self, hit: &Hit, ray: &Ray) -> Curvature {
        let offset = ray.at(hit.dist) - self.center;
        let grad = self.metric * offset * 2.0;
        Curvature::from_implicit(&grad, &(self.metric * 2.0))
    }

    fn uv(&self, hit: &Hit, _ray: &Ray) -> Point2 {
        let p = hit.vpriv.normalize();
        let u = p.y.atan2(p.x) / (2.0 * PI) + 0.5;
        let v = 1.0 - p.z.clamp(-1.0, 1.0).acos() / PI;
        Point2::new(u.clamp(0.0, 1.0), v.clamp(0.0, 1.0))
    }
}
