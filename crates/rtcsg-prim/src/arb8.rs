//! Convex eight-vertex polyhedron.
//!
//! Vertices 0-3 form one loop and 4-7 the opposite loop, with `i` and
//! `i + 4` joined by an edge. Coincident vertices collapse faces, so the
//! same record describes wedges and tetrahedra.

use rtcsg_math::{any_perpendicular, Aabb3, Point2, Point3, Transform, Vec3};

use crate::plot::TriangleMesh;
use crate::table::check_transform;
use crate::{
    BoundingSphere, Curvature, GeometryRecord, Hit, ImportError, LineSegment, PlotTolerances,
    PrepError, PrepOptions, Primitive, PrimitiveKind, Ray, Segment, SolidInternal, SurfacePoint,
};

const FACES: [[usize; 4]; 6] = [
    [0, 1, 2, 3],
    [4, 5, 6, 7],
    [0, 4, 5, 1],
    [1, 5, 6, 2],
    [2, 6, 7, 3],
    [3, 7, 4, 0],
];

const EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

/// Imported polyhedron in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Arb8Internal {
    /// Vertices.
    pub points: [Point3; 8],
}

impl Arb8Internal {
    /// Axis-aligned box.
    pub fn from_box(min: Point3, max: Point3) -> Self {
        let points = [
            Point3::new(min.x, min.y, min.z),
            Point3::new(max.x, min.y, min.z),
            Point3::new(max.x, max.y, min.z),
            Point3::new(min.x, max.y, min.z),
            Point3::new(min.x, min.y, max.z),
            Point3::new(max.x, min.y, max.z),
            Point3::new(max.x, max.y, max.z),
            Point3::new(min.x, max.y, max.z),
        ];
        Self { points }
    }

    fn centroid(&self) -> Point3 {
        let sum = self
            .points
            .iter()
            .fold(Vec3::zeros(), |acc, p| acc + p.coords);
        Point3::from(sum / 8.0)
    }

    /// Distinct vertices of face `f`, in loop order.
    fn face_loop(&self, f: usize, eps: f64) -> Vec<Point3> {
        let mut out: Vec<Point3> = Vec::with_capacity(4);
        for &i in &FACES[f] {
            let p = self.points[i];
            if out.last().map_or(true, |q| (p - q).norm() > eps) {
                out.push(p);
            }
        }
        while out.len() > 1 && (out[0] - out[out.len() - 1]).norm() <= eps {
            out.pop();
        }
        out
    }
}

/// Importer registered for [`PrimitiveKind::Arb8`].
pub fn import(
    record: &GeometryRecord,
    xform: &Transform,
) -> Result<Box<dyn SolidInternal>, ImportError> {
    let GeometryRecord::Arb8 { points } = record else {
        return Err(ImportError::BadRecordType {
            expected: PrimitiveKind::Arb8,
            found: record.kind(),
        });
    };
    check_transform(xform)?;
    if points
        .iter()
        .any(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
    {
        return Err(ImportError::NonFinite(PrimitiveKind::Arb8));
    }
    let points = (*points).map(|p| xform.apply_point(&p));
    Ok(Box::new(Arb8Internal { points }))
}

/// Newell normal of a polygon; zero for degenerate loops.
fn newell_normal(pts: &[Point3]) -> Vec3 {
    let mut n = Vec3::zeros();
    for i in 0..pts.len() {
        let a = pts[i];
        let b = pts[(i + 1) % pts.len()];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    n
}

#[derive(Debug, Clone)]
struct FacePlane {
    normal: Vec3,
    dist: f64,
    origin: Point3,
    u_dir: Vec3,
    v_dir: Vec3,
    u_range: (f64, f64),
    v_range: (f64, f64),
}

impl SolidInternal for Arb8Internal {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Arb8
    }

    fn prep(&self, opts: &PrepOptions) -> Result<Box<dyn Primitive>, PrepError> {
        let eps = opts.tolerance.linear;
        let centroid = self.centroid();
        let mut planes: Vec<FacePlane> = Vec::with_capacity(6);
        for f in 0..FACES.len() {
            let pts = self.face_loop(f, eps);
            if pts.len() < 3 {
                continue;
            }
            let n = newell_normal(&pts);
            let len = n.norm();
            if len <= eps * eps {
                continue;
            }
            let mut normal = n / len;
            let mean = Point3::from(
                pts.iter().fold(Vec3::zeros(), |a, p| a + p.coords) / pts.len() as f64,
            );
            if normal.dot(&(centroid - mean)) > 0.0 {
                normal = -normal;
            }
            let dist = normal.dot(&mean.coords);
            let duplicate = planes.iter().any(|q| {
                (q.normal - normal).norm() < opts.tolerance.perp && (q.dist - dist).abs() < eps
            });
            if duplicate {
                continue;
            }
            let u_dir = (pts[1] - pts[0]).normalize();
            let v_dir = normal.cross(&u_dir);
            let (mut u_range, mut v_range) = ((f64::MAX, f64::MIN), (f64::MAX, f64::MIN));
            for p in &pts {
                let (u, v) = ((p - pts[0]).dot(&u_dir), (p - pts[0]).dot(&v_dir));
                u_range = (u_range.0.min(u), u_range.1.max(u));
                v_range = (v_range.0.min(v), v_range.1.max(v));
            }
            planes.push(FacePlane {
                normal,
                dist,
                origin: pts[0],
                u_dir,
                v_dir,
                u_range,
                v_range,
            });
        }
        if planes.len() < 4 {
            return Err(PrepError::degenerate(format!(
                "arb8 has only {} distinct faces",
                planes.len()
            )));
        }
        if planes
            .iter()
            .any(|p| p.normal.dot(&centroid.coords) - p.dist > -eps)
        {
            return Err(PrepError::degenerate("arb8 has no interior"));
        }

        let bounds = Aabb3::from_points(&self.points);
        let center = bounds.center();
        let radius = self
            .points
            .iter()
            .map(|p| (p - center).norm())
            .fold(0.0, f64::max);
        Ok(Box::new(Arb8Primitive {
            planes,
            bounds,
            sphere: BoundingSphere { center, radius },
        }))
    }

    fn plot(&self, _tol: &PlotTolerances) -> Box<dyn Iterator<Item = LineSegment> + '_> {
        Box::new(
            EDGES
                .iter()
                .map(|&[a, b]| LineSegment::new(self.points[a], self.points[b]))
                .filter(|s| s.start != s.end),
        )
    }

    fn tessellate(&self, _tol: &PlotTolerances) -> TriangleMesh {
        let eps = rtcsg_math::Tolerance::DEFAULT.linear;
        let centroid = self.centroid();
        let mut mesh = TriangleMesh::new();
        for f in 0..FACES.len() {
            let pts = self.face_loop(f, eps);
            if pts.len() < 3 {
                continue;
            }
            let n = newell_normal(&pts);
            if n.norm() <= eps * eps {
                continue;
            }
            let mut normal = n.normalize();
            let flip = normal.dot(&(centroid - pts[0])) > 0.0;
            if flip {
                normal = -normal;
            }
            let idx: Vec<u32> = pts.iter().map(|p| mesh.push_vertex(p, &normal)).collect();
            for k in 1..idx.len() - 1 {
                if flip {
                    mesh.push_triangle(idx[0], idx[k + 1], idx[k]);
                } else {
                    mesh.push_triangle(idx[0], idx[k], idx[k + 1]);
                }
            }
        }
        mesh
    }

    fn export(&self) -> GeometryRecord {
        GeometryRecord::Arb8 {
            points: self.points,
        }
    }
}

/// Prepared polyhedron: one outward plane per distinct face.
#[derive(Debug, Clone)]
pub struct Arb8Primitive {
    planes: Vec<FacePlane>,
    bounds: Aabb3,
    sphere: BoundingSphere,
}

impl Primitive for Arb8Primitive {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Arb8
    }

    fn bounds(&self) -> &Aabb3 {
        &self.bounds
    }

    fn bounding_sphere(&self) -> BoundingSphere {
        self.sphere
    }

    fn shot(&self, ray: &Ray) -> Vec<Segment> {
        let dir = ray.dir();
        let (mut t_in, mut t_out) = (f64::NEG_INFINITY, f64::INFINITY);
        let (mut s_in, mut s_out) = (0u32, 0u32);
        for (i, plane) in self.planes.iter().enumerate() {
            let dn = plane.normal.dot(&dir);
            let above = plane.normal.dot(&ray.origin.coords) - plane.dist;
            if dn.abs() < 1e-15 {
                if above > 0.0 {
                    return Vec::new();
                }
                continue;
            }
            let t = -above / dn;
            if dn < 0.0 {
                if t > t_in {
                    t_in = t;
                    s_in = i as u32;
                }
            } else if t < t_out {
                t_out = t;
                s_out = i as u32;
            }
        }
        if !(t_in.is_finite() && t_out.is_finite()) || t_in >= t_out {
            return Vec::new();
        }
        vec![Segment::new(Hit::new(t_in, s_in), Hit::new(t_out, s_out))]
    }

    fn norm(&self, hit: &Hit, ray: &Ray) -> SurfacePoint {
        SurfacePoint {
            point: ray.at(hit.dist),
            normal: self.planes[hit.surface as usize].normal,
        }
    }

    fn curvature(&self, hit: &Hit, _ray: &Ray) -> Curvature {
        let n = self.planes[hit.surface as usize].normal;
        Curvature {
            c1: 0.0,
            c2: 0.0,
            direction: any_perpendicular(&n),
        }
    }

    fn uv(&self, hit: &Hit, ray: &Ray) -> Point2 {
        let plane = &self.planes[hit.surface as usize];
        let d = ray.at(hit.dist) - plane.origin;
        let frac = |x: f64, (lo, hi): (f64, f64)| {
            if hi > lo {
                ((x - lo) / (hi - lo)).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        Point2::new(
            frac(d.dot(&plane.u_dir), plane.u_range),
            frac(d.dot(&plane.v_dir), plane.v_range),
        )
    }
}
