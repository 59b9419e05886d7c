//! The B-rep primitive: import, prep and the ray queries.

use log::debug;
use rtcsg_math::{any_perpendicular, Aabb3, Point2, Transform, Vec3};
use rtcsg_nurbs::{BSplineSurface, NurbsError};
use rtcsg_prim::{
    check_transform, plot::polyline_segments, BoundingSphere, BrepRecord, Curvature, FaceRecord,
    GeometryRecord, Hit, ImportError, LineSegment, PlotTolerances, PrepError, PrepOptions,
    Primitive, PrimitiveKind, PrimitiveTable, Ray, Segment, SolidInternal, SurfacePoint,
    TriangleMesh,
};

use crate::bvh::SceneBvh;
use crate::newton::{self, SurfaceJet};
use crate::tree::SurfaceTree;
use crate::trim::TrimRegion;

/// Trim flattening tolerance as a fraction of the larger parameter range.
const TRIM_FLATTEN_FRACTION: f64 = 1e-4;

/// Imported B-rep: faces in world coordinates, trims in parameter space.
#[derive(Debug, Clone)]
pub struct BrepInternal {
    faces: Vec<FaceRecord>,
}

impl BrepInternal {
    /// Validate every surface and trim curve.
    pub fn new(record: BrepRecord) -> Result<Self, ImportError> {
        for face in &record.faces {
            face.surface.validate()?;
            if face
                .surface
                .control_points
                .iter()
                .any(|p| !p.coords.iter().all(|c| c.is_finite()))
            {
                return Err(ImportError::NonFinite(PrimitiveKind::Brep));
            }
            for curve in face.loops.iter().flat_map(|lp| &lp.curves) {
                curve.validate()?;
            }
        }
        Ok(Self {
            faces: record.faces,
        })
    }

    /// The faces.
    pub fn faces(&self) -> &[FaceRecord] {
        &self.faces
    }
}

/// Importer registered for [`PrimitiveKind::Brep`].
pub fn import(
    record: &GeometryRecord,
    xform: &Transform,
) -> Result<Box<dyn SolidInternal>, ImportError> {
    let GeometryRecord::Brep(brep) = record else {
        return Err(ImportError::BadRecordType {
            expected: PrimitiveKind::Brep,
            found: record.kind(),
        });
    };
    check_transform(xform)?;
    let mut internal = BrepInternal::new(brep.clone())?;
    // a mirroring placement turns du x dv inward
    let mirrored = xform.linear_part().determinant() < 0.0;
    for face in &mut internal.faces {
        face.surface = face.surface.transform(xform);
        face.reversed ^= mirrored;
    }
    Ok(Box::new(internal))
}

/// Add the B-rep importer to `table`.
pub fn register(table: &mut PrimitiveTable) {
    table.register(PrimitiveKind::Brep, "brep", import);
}

fn trim_region(face: &FaceRecord) -> Result<TrimRegion, NurbsError> {
    let ((u0, u1), (v0, v1)) = face.surface.parameter_domain();
    TrimRegion::new(&face.loops, TRIM_FLATTEN_FRACTION * (u1 - u0).max(v1 - v0))
}

fn outward(surface_normal: Vec3, reversed: bool) -> Vec3 {
    if reversed {
        -surface_normal
    } else {
        surface_normal
    }
}

impl SolidInternal for BrepInternal {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Brep
    }

    fn prep(&self, opts: &PrepOptions) -> Result<Box<dyn Primitive>, PrepError> {
        if self.faces.is_empty() {
            return Err(PrepError::EmptyBrep);
        }
        let mut faces = Vec::with_capacity(self.faces.len());
        for (idx, face) in self.faces.iter().enumerate() {
            let trim = trim_region(face)?;
            let tree = SurfaceTree::build(&face.surface, &trim, &opts.subdivision)?;
            let Some(aabb) = tree.bounds() else {
                debug!("brep face {idx} is trimmed away entirely");
                continue;
            };
            faces.push(PreparedFace {
                jet: SurfaceJet::new(face.surface.clone()),
                domain: face.surface.parameter_domain(),
                trim,
                tree,
                aabb,
                reversed: face.reversed,
            });
        }
        if faces.is_empty() {
            return Err(PrepError::EmptyBrep);
        }

        let bvh = SceneBvh::build(faces.iter().enumerate().map(|(i, f)| (i, f.aabb)));
        let bounds = faces
            .iter()
            .fold(Aabb3::empty(), |acc, f| acc.union(&f.aabb));
        Ok(Box::new(BrepPrimitive {
            faces,
            bvh,
            bounds,
            tol: opts.tolerance.linear,
            grazing: opts.tolerance.perp,
        }))
    }

    fn plot(&self, tol: &PlotTolerances) -> Box<dyn Iterator<Item = LineSegment> + '_> {
        let tol = *tol;
        Box::new(self.faces.iter().flat_map(move |face| face_wire(face, &tol)))
    }

    fn tessellate(&self, tol: &PlotTolerances) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        for (idx, face) in self.faces.iter().enumerate() {
            match trim_region(face) {
                Ok(trim) => mesh.merge(&face_mesh(face, &trim, tol)),
                Err(e) => debug!("brep face {idx} not tessellated: {e}"),
            }
        }
        mesh
    }

    fn export(&self) -> GeometryRecord {
        GeometryRecord::Brep(BrepRecord {
            faces: self.faces.clone(),
        })
    }
}

/// Segments along one boundary or trim curve of a face.
fn curve_count(tol: &PlotTolerances, surface: &BSplineSurface) -> usize {
    (tol.segments_for_radius(surface.bounds().bounding_radius()) / 4).clamp(2, 64)
}

fn face_wire(face: &FaceRecord, tol: &PlotTolerances) -> Vec<LineSegment> {
    let surface = &face.surface;
    let n = curve_count(tol, surface);
    let mut out = Vec::new();
    if face.loops.is_empty() {
        let ((u0, u1), (v0, v1)) = surface.parameter_domain();
        let nu = if surface.degree_u == 1 { surface.n_u - 1 } else { n };
        let nv = if surface.degree_v == 1 { surface.n_v - 1 } else { n };
        let along_u = |v: f64| {
            (0..=nu)
                .map(|i| surface.eval(u0 + (u1 - u0) * i as f64 / nu as f64, v))
                .collect::<Vec<_>>()
        };
        let along_v = |u: f64| {
            (0..=nv)
                .map(|j| surface.eval(u, v0 + (v1 - v0) * j as f64 / nv as f64))
                .collect::<Vec<_>>()
        };
        out.extend(polyline_segments(along_u(v0), false));
        out.extend(polyline_segments(along_u(v1), false));
        out.extend(polyline_segments(along_v(u0), false));
        out.extend(polyline_segments(along_v(u1), false));
        return out;
    }
    for curve in face.loops.iter().flat_map(|lp| &lp.curves) {
        let points = curve
            .sample(n)
            .iter()
            .map(|uv| surface.eval(uv.x, uv.y))
            .collect();
        out.extend(polyline_segments(points, false));
    }
    out
}

fn face_mesh(face: &FaceRecord, trim: &TrimRegion, tol: &PlotTolerances) -> TriangleMesh {
    let surface = &face.surface;
    let n = curve_count(tol, surface);
    let ((u0, u1), (v0, v1)) = surface.parameter_domain();
    let uv_at = |i: usize, j: usize| {
        Point2::new(
            u0 + (u1 - u0) * i as f64 / n as f64,
            v0 + (v1 - v0) * j as f64 / n as f64,
        )
    };

    let mut mesh = TriangleMesh::new();
    let ring = n + 1;
    for j in 0..=n {
        for i in 0..=n {
            let uv = uv_at(i, j);
            let d = surface.derivatives(uv.x, uv.y);
            let normal = outward(d.du.cross(&d.dv), face.reversed)
                .try_normalize(0.0)
                .unwrap_or_else(Vec3::zeros);
            mesh.push_vertex(&d.point, &normal);
        }
    }
    let mut tri = |a: (usize, usize), b: (usize, usize), c: (usize, usize)| {
        let centroid = Point2::from(
            (uv_at(a.0, a.1).coords + uv_at(b.0, b.1).coords + uv_at(c.0, c.1).coords) / 3.0,
        );
        if !trim.contains(&centroid) {
            return;
        }
        let idx = |(i, j): (usize, usize)| (j * ring + i) as u32;
        if face.reversed {
            mesh.push_triangle(idx(a), idx(c), idx(b));
        } else {
            mesh.push_triangle(idx(a), idx(b), idx(c));
        }
    };
    for j in 0..n {
        for i in 0..n {
            tri((i, j), (i + 1, j), (i + 1, j + 1));
            tri((i, j), (i + 1, j + 1), (i, j + 1));
        }
    }
    mesh
}

#[derive(Debug, Clone)]
struct PreparedFace {
    jet: SurfaceJet,
    domain: ((f64, f64), (f64, f64)),
    trim: TrimRegion,
    tree: SurfaceTree,
    aabb: Aabb3,
    reversed: bool,
}

impl PreparedFace {
    fn normal(&self, uv: &Point2) -> Option<Vec3> {
        outward(self.jet.raw_normal(uv), self.reversed).try_normalize(0.0)
    }
}

/// Prepared B-rep.
#[derive(Debug, Clone)]
pub struct BrepPrimitive {
    faces: Vec<PreparedFace>,
    bvh: SceneBvh,
    bounds: Aabb3,
    tol: f64,
    grazing: f64,
}

impl BrepPrimitive {
    /// Every trimmed root on face `fi`, without repeats.
    fn face_roots(&self, fi: usize, ray: &Ray) -> Vec<newton::Root> {
        let face = &self.faces[fi];
        let mut roots: Vec<newton::Root> = Vec::new();
        face.tree.visit_leaves(ray, |leaf| {
            for seed in newton::seeds(leaf.u_range, leaf.v_range) {
                let Some(root) =
                    newton::solve(&face.jet, ray, seed, leaf.u_range, leaf.v_range, self.tol)
                else {
                    continue;
                };
                if !face.trim.contains(&root.uv) {
                    continue;
                }
                if roots.iter().all(|r| (r.t - root.t).abs() > self.tol) {
                    roots.push(root);
                }
            }
        });
        roots
    }
}

impl Primitive for BrepPrimitive {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Brep
    }

    fn bounds(&self) -> &Aabb3 {
        &self.bounds
    }

    fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere {
            center: self.bounds.center(),
            radius: self.bounds.bounding_radius(),
        }
    }

    fn shot(&self, ray: &Ray) -> Vec<Segment> {
        let d = ray.dir();
        // (hit, normal . direction)
        let mut hits: Vec<(Hit, f64)> = Vec::new();
        for fi in self.bvh.candidates(ray) {
            for root in self.face_roots(fi, ray) {
                let Some(n) = self.faces[fi].normal(&root.uv) else {
                    continue;
                };
                let cos = n.dot(&d);
                if cos.abs() < self.grazing {
                    debug!("grazing brep hit at {} dropped", root.t);
                    continue;
                }
                hits.push((
                    Hit::new(root.t, fi as u32)
                        .with_vpriv(n)
                        .with_param(root.uv),
                    cos,
                ));
            }
        }
        hits.sort_by(|a, b| a.0.dist.total_cmp(&b.0.dist));

        // hits on a shared edge show up once per face
        let mut merged: Vec<(Hit, f64)> = Vec::with_capacity(hits.len());
        for (hit, cos) in hits {
            let duplicate = merged.last().is_some_and(|(prev, prev_cos)| {
                (hit.dist - prev.dist).abs() <= self.tol && (cos < 0.0) == (*prev_cos < 0.0)
            });
            if !duplicate {
                merged.push((hit, cos));
            }
        }

        let mut segs = Vec::new();
        let mut open: Option<Hit> = None;
        for (hit, cos) in merged {
            let entering = cos < 0.0;
            match open {
                None if entering => open = Some(hit),
                None => debug!("brep exit at {} without entry", hit.dist),
                Some(_) if entering => debug!("brep entry at {} while inside", hit.dist),
                Some(entry) => {
                    segs.push(Segment::new(entry, hit));
                    open = None;
                }
            }
        }
        if let Some(entry) = open {
            debug!("brep entry at {} never exits", entry.dist);
        }
        segs
    }

    fn norm(&self, hit: &Hit, ray: &Ray) -> SurfacePoint {
        let normal = self
            .faces
            .get(hit.surface as usize)
            .and_then(|f| f.normal(&hit.param))
            .unwrap_or(hit.vpriv);
        SurfacePoint {
            point: ray.at(hit.dist),
            normal,
        }
    }

    fn curvature(&self, hit: &Hit, ray: &Ray) -> Curvature {
        let Some(face) = self.faces.get(hit.surface as usize) else {
            return Curvature::flat(&ray.dir());
        };
        let uv = hit.param;
        let (su, sv) = face.jet.partials(&uv);
        let Some(n) = face.normal(&uv) else {
            return Curvature::flat(&ray.dir());
        };
        let (suu, suv, svv) = face.jet.second_partials(&uv);

        let (e, f, g) = (su.dot(&su), su.dot(&sv), sv.dot(&sv));
        let (l, m, nn) = (suu.dot(&n), suv.dot(&n), svv.dot(&n));
        let det = e * g - f * f;
        if det <= 0.0 {
            return Curvature::flat(&n);
        }
        let gauss = (l * nn - m * m) / det;
        let mean = (e * nn - 2.0 * f * m + g * l) / (2.0 * det);
        let root = (mean * mean - gauss).max(0.0).sqrt();
        let (c1, c2) = (mean - root, mean + root);

        // (II - c1 I) [du dv] = 0, from whichever row is better conditioned
        let row1 = (m - c1 * f, -(l - c1 * e));
        let row2 = (nn - c1 * g, -(m - c1 * f));
        let (du, dv) = if row1.0.hypot(row1.1) >= row2.0.hypot(row2.1) {
            row1
        } else {
            row2
        };
        let direction = (su * du + sv * dv)
            .try_normalize(1e-14)
            .or_else(|| su.try_normalize(0.0))
            .unwrap_or_else(|| any_perpendicular(&n));
        Curvature { c1, c2, direction }
    }

    fn uv(&self, hit: &Hit, _ray: &Ray) -> Point2 {
        let Some(face) = self.faces.get(hit.surface as usize) else {
            return Point2::origin();
        };
        let ((u0, u1), (v0, v1)) = face.domain;
        let norm = |x: f64, a: f64, b: f64| {
            if b > a {
                ((x - a) / (b - a)).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        Point2::new(norm(hit.param.x, u0, u1), norm(hit.param.y, v0, v1))
    }
}
