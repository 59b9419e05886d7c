//! Torus.
//!
//! Rays are mapped into the frame where the torus axis is +z and the major
//! radius is 1, with the origin moved to the point of closest approach to
//! the center. The quartic is solved there; distances are scaled back by
//! the major radius.

use std::f64::consts::PI;

use nalgebra::Matrix3;
use rtcsg_math::{any_perpendicular, Aabb3, Point2, Point3, Tolerance, Transform, Vec3};

use crate::plot::{ellipse_segments, revolve_profile, ProfilePoint, TriangleMesh};
use crate::table::check_transform;
use crate::{
    BoundingSphere, Curvature, GeometryRecord, Hit, ImportError, LineSegment, PlotTolerances,
    PrepError, PrepOptions, Primitive, PrimitiveKind, Ray, Segment, SolidInternal, SurfacePoint,
};

/// Newton steps applied to every quartic root.
const POLISH_STEPS: usize = 4;

/// Imported torus in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct TorInternal {
    /// Center.
    pub center: Point3,
    /// Unit axis of revolution.
    pub axis: Vec3,
    /// Distance from the center to the middle of the tube.
    pub r_major: f64,
    /// Tube radius.
    pub r_minor: f64,
}

impl TorInternal {
    /// Validated torus; `axis` need not be unit length.
    pub fn new(center: Point3, axis: Vec3, r_major: f64, r_minor: f64) -> Result<Self, ImportError> {
        let finite = center.coords.iter().chain(axis.iter()).all(|c| c.is_finite())
            && r_major.is_finite()
            && r_minor.is_finite();
        if !finite {
            return Err(ImportError::NonFinite(PrimitiveKind::Tor));
        }
        for (what, value) in [("r_major", r_major), ("r_minor", r_minor)] {
            if !(value > 0.0) {
                return Err(ImportError::NegativeRadius { what, value });
            }
        }
        if r_minor > r_major {
            return Err(ImportError::MinorExceedsMajor {
                minor: r_minor,
                major: r_major,
            });
        }
        let axis = axis
            .try_normalize(Tolerance::DEFAULT.linear)
            .ok_or_else(|| ImportError::degenerate("torus axis has zero length"))?;
        Ok(Self {
            center,
            axis,
            r_major,
            r_minor,
        })
    }

    /// `(u, w)` completing a right-handed frame with the axis.
    fn frame(&self) -> (Vec3, Vec3) {
        let u = any_perpendicular(&self.axis);
        (u, self.axis.cross(&u))
    }
}

/// Importer registered for [`PrimitiveKind::Tor`].
pub fn import(
    record: &GeometryRecord,
    xform: &Transform,
) -> Result<Box<dyn SolidInternal>, ImportError> {
    let GeometryRecord::Tor {
        center,
        axis,
        r_major,
        r_minor,
    } = record
    else {
        return Err(ImportError::BadRecordType {
            expected: PrimitiveKind::Tor,
            found: record.kind(),
        });
    };
    check_transform(xform)?;
    let scale = xform
        .uniform_scale()
        .ok_or(ImportError::NonUniformScale(PrimitiveKind::Tor))?;
    let tor = TorInternal::new(
        xform.apply_point(center),
        xform.apply_vec(axis),
        r_major * scale,
        r_minor * scale,
    )?;
    Ok(Box::new(tor))
}

impl SolidInternal for TorInternal {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Tor
    }

    fn prep(&self, opts: &PrepOptions) -> Result<Box<dyn Primitive>, PrepError> {
        if !(self.r_major > 0.0 && self.r_minor > 0.0) {
            return Err(PrepError::degenerate("torus radius is not positive"));
        }
        let (u, w) = self.frame();
        let rot = Matrix3::from_rows(&[u.transpose(), w.transpose(), self.axis.transpose()]);

        let half = Vec3::from_fn(|i, _| {
            let across = (1.0 - self.axis[i] * self.axis[i]).max(0.0).sqrt();
            self.r_minor + self.r_major * across
        });
        Ok(Box::new(TorPrimitive {
            center: self.center,
            rot,
            r_major: self.r_major,
            alpha: self.r_minor / self.r_major,
            bounds: Aabb3::new(self.center - half, self.center + half),
            grazing: opts.tolerance.perp,
        }))
    }

    fn plot(&self, tol: &PlotTolerances) -> Box<dyn Iterator<Item = LineSegment> + '_> {
        let (u, w) = self.frame();
        let (big, small) = (self.r_major, self.r_minor);
        let n = tol.segments_for_radius(big + small);
        let m = tol.segments_for_radius(small);
        let rings = [
            (self.center, big + small),
            (self.center, big - small),
            (self.center + self.axis * small, big),
            (self.center - self.axis * small, big),
        ]
        .into_iter()
        .flat_map(move |(c, r)| ellipse_segments(c, u * r, w * r, n));
        let axis = self.axis;
        let center = self.center;
        let sections = [u, w, -u, -w]
            .into_iter()
            .flat_map(move |e| ellipse_segments(center + e * big, e * small, axis * small, m));
        Box::new(rings.chain(sections))
    }

    fn tessellate(&self, tol: &PlotTolerances) -> TriangleMesh {
        let (u, w) = self.frame();
        let n = tol.segments_for_radius(self.r_major + self.r_minor);
        let m = tol.segments_for_radius(self.r_minor);
        // counter-clockwise around the tube so the outer side climbs the axis
        let profile: Vec<ProfilePoint> = (0..=m)
            .map(|j| {
                let theta = 2.0 * PI * j as f64 / m as f64;
                ProfilePoint {
                    radial: self.r_major + self.r_minor * theta.cos(),
                    axial: self.r_minor * theta.sin(),
                    n_radial: theta.cos(),
                    n_axial: theta.sin(),
                }
            })
            .collect();
        revolve_profile(&self.center, &u, &w, &self.axis, &profile, n)
    }

    fn export(&self) -> GeometryRecord {
        GeometryRecord::Tor {
            center: self.center,
            axis: self.axis,
            r_major: self.r_major,
            r_minor: self.r_minor,
        }
    }
}

/// Prepared torus.
#[derive(Debug, Clone)]
pub struct TorPrimitive {
    center: Point3,
    /// World to local rotation; rows are `u`, `w`, axis.
    rot: Matrix3<f64>,
    r_major: f64,
    /// `r_minor / r_major`, the tube radius in the local frame.
    alpha: f64,
    bounds: Aabb3,
    grazing: f64,
}

impl TorPrimitive {
    /// Gradient of `(|x|^2 - 1 - a^2)^2 - 4 a^2 + 4 z^2`, outward on the
    /// surface, in local coordinates.
    fn gradient(&self, x: &Vec3) -> Vec3 {
        let g = x.norm_squared() - 1.0 - self.alpha * self.alpha;
        x * (4.0 * g) + Vec3::z() * (8.0 * x.z)
    }

    fn hessian(&self, x: &Vec3) -> Matrix3<f64> {
        let g = x.norm_squared() - 1.0 - self.alpha * self.alpha;
        Matrix3::identity() * (4.0 * g)
            + x * x.transpose() * 8.0
            + Matrix3::from_diagonal(&Vec3::new(0.0, 0.0, 8.0))
    }
}

impl Primitive for TorPrimitive {
    fn kind(&self) -> PrimitiveKind {
        PrimitiveKind::Tor
    }

    fn bounds(&self) -> &Aabb3 {
        &self.bounds
    }

    fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere {
            center: self.center,
            radius: self.r_major * (1.0 + self.alpha),
        }
    }

    fn shot(&self, ray: &Ray) -> Vec<Segment> {
        let d = self.rot * ray.dir();
        let p0 = self.rot * (ray.origin - self.center) / self.r_major;
        let s0 = -p0.dot(&d);
        let p = p0 + d * s0;

        let a2 = self.alpha * self.alpha;
        let (pd, pz, dz) = (p.dot(&d), p.z, d.z);
        let k = p.norm_squared() - 1.0 - a2;
        let coeffs = [
            1.0,
            4.0 * pd,
            2.0 * k + 4.0 * pd * pd + 4.0 * dz * dz,
            4.0 * k * pd + 8.0 * pz * dz,
            k * k - 4.0 * (a2 - pz * pz),
        ];

        let mut segments = Vec::new();
        let mut entry: Option<Hit> = None;
        for s in solve_quartic(coeffs) {
            let x = p + d * s;
            let cos = self.gradient(&x).normalize().dot(&d);
            if !(cos.abs() > self.grazing) {
                continue;
            }
            let hit = Hit::new((s0 + s) * self.r_major, 0).with_vpriv(x);
            match (entry.take(), cos < 0.0) {
                (None, true) => entry = Some(hit),
                (Some(inn), false) => segments.push(Segment::new(inn, hit)),
                (pending, _) => entry = pending,
            }
        }
        segments
    }

    fn norm(&self, hit: &Hit, ray: &Ray) -> SurfacePoint {
        let normal = (self.rot.transpose() * self.gradient(&hit.vpriv)).normalize();
        SurfacePoint {
            point: ray.at(hit.dist),
            normal,
        }
    }

    fn curvature(&self, hit: &Hit, _ray: &Ray) -> Curvature {
        let x = hit.vpriv;
        let grad = self.rot.transpose() * self.gradient(&x);
        let hess = self.rot.transpose() * self.hessian(&x) * self.rot / self.r_major;
        Curvature::from_implicit(&grad, &hess)
    }

    fn uv(&self, hit: &Hit, _ray: &Ray) -> Point2 {
        let x = hit.vpriv;
        let turn = |a: f64| a.rem_euclid(2.0 * PI) / (2.0 * PI);
        let u = turn(x.y.atan2(x.x));
        let v = turn(x.z.atan2(x.x.hypot(x.y) - 1.0));
        Point2::new(u.clamp(0.0, 1.0), v.clamp(0.0, 1.0))
    }
}

/// Real roots of `c[0] x^4 + c[1] x^3 + c[2] x^2 + c[3] x + c[4] = 0` in
/// ascending order, by Ferrari's resolvent cubic followed by Newton
/// polishing. Double roots come back once.
pub(crate) fn solve_quartic(c: [f64; 5]) -> Vec<f64> {
    if c[0] == 0.0 {
        return solve_cubic(c[1], c[2], c[3], c[4]);
    }
    let (b, cc, d, e) = (c[1] / c[0], c[2] / c[0], c[3] / c[0], c[4] / c[0]);

    // x = y - b/4 gives y^4 + p y^2 + q y + r = 0
    let shift = b / 4.0;
    let b2 = b * b;
    let p = cc - 3.0 * b2 / 8.0;
    let q = d - b * cc / 2.0 + b2 * b / 8.0;
    let r = e - b * d / 4.0 + b2 * cc / 16.0 - 3.0 * b2 * b2 / 256.0;

    let mut ys = Vec::with_capacity(4);
    // 8m^3 + 8p m^2 + (2p^2 - 8r) m - q^2 = 0 has a root m >= 0
    let m = solve_cubic(8.0, 8.0 * p, 2.0 * p * p - 8.0 * r, -q * q)
        .into_iter()
        .fold(0.0_f64, f64::max);
    let s = (2.0 * m).sqrt();
    if s > 1e-12 {
        // (y^2 + p/2 + m)^2 = (s y - q / (2s))^2
        let half = p / 2.0 + m;
        let lean = q / (2.0 * s);
        ys.extend(solve_quadratic(1.0, -s, half + lean));
        ys.extend(solve_quadratic(1.0, s, half - lean));
    } else {
        // biquadratic
        for y2 in solve_quadratic(1.0, p, r) {
            if y2 >= 0.0 {
                let y = y2.sqrt();
                ys.push(y);
                ys.push(-y);
            }
        }
    }

    let f = |x: f64| (((c[0] * x + c[1]) * x + c[2]) * x + c[3]) * x + c[4];
    let df = |x: f64| ((4.0 * c[0] * x + 3.0 * c[1]) * x + 2.0 * c[2]) * x + c[3];
    let mut roots: Vec<f64> = ys
        .into_iter()
        .map(|y| {
            let mut x = y - shift;
            for _ in 0..POLISH_STEPS {
                let slope = df(x);
                if slope == 0.0 {
                    break;
                }
                let next = x - f(x) / slope;
                if !next.is_finite() {
                    break;
                }
                x = next;
            }
            x
        })
        .collect();
    roots.sort_by(|a, b| a.total_cmp(b));
    roots.dedup_by(|a, b| (*a - *b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0));
    roots
}

/// Real roots of `a x^3 + b x^2 + c x + d = 0`.
fn solve_cubic(a: f64, b: f64, c: f64, d: f64) -> Vec<f64> {
    if a == 0.0 {
        return solve_quadratic(b, c, d);
    }
    let (b, c, d) = (b / a, c / a, d / a);
    // x = t - b/3 gives t^3 + p t + q = 0
    let shift = b / 3.0;
    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;
    let disc = q * q / 4.0 + p * p * p / 27.0;

    if p == 0.0 && q == 0.0 {
        vec![-shift]
    } else if disc > 0.0 {
        let root = disc.sqrt();
        vec![(-q / 2.0 + root).cbrt() + (-q / 2.0 - root).cbrt() - shift]
    } else {
        // three real roots, trigonometric form
        let m = 2.0 * (-p / 3.0).max(0.0).sqrt();
        if m == 0.0 {
            return vec![-shift];
        }
        let theta = (3.0 * q / (p * m)).clamp(-1.0, 1.0).acos() / 3.0;
        (0..3)
            .map(|k| m * (theta - 2.0 * PI * k as f64 / 3.0).cos() - shift)
            .collect()
    }
}

/// Real roots of `a x^2 + b x + c = 0`.
fn solve_quadratic(a: f64, b: f64, c: f64) -> Vec<f64> {
    if a == 0.0 {
        return if b != 0.0 { vec![-c / b] } else { Vec::new() };
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    // avoid cancellation in the smaller root
    let root = disc.sqrt();
    let big = -0.5 * (b + b.signum() * root);
    if big == 0.0 {
        return vec![0.0, 0.0];
    }
    vec![big / a, c / big]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ring() -> TorInternal {
        TorInternal::new(Point3::origin(), Vec3::z(), 10.0, 3.0).unwrap()
    }

    fn prep(tor: &TorInternal) -> Box<dyn Primitive> {
        tor.prep(&PrepOptions::default()).unwrap()
    }

    #[test]
    fn test_ray_through_hole_along_axis_misses() {
        let prim = prep(&ring());
        let ray = Ray::new(Point3::new(0.0, 0.0, -20.0), Vec3::z());
        assert!(prim.shot(&ray).is_empty());
        // also misses when tilted but still inside the hole
        let tilted = Ray::new(Point3::new(2.0, 1.0, -20.0), Vec3::new(0.05, 0.0, 1.0));
        assert!(prim.shot(&tilted).is_empty());
    }

    #[test]
    fn test_ray_across_hole_hits_tube_twice() {
        let prim = prep(&ring());
        let ray = Ray::new(Point3::new(-20.0, 0.0, 0.0), Vec3::x());
        let segs = prim.shot(&ray);
        assert_eq!(segs.len(), 2);
        assert_relative_eq!(segs[0].entry.dist, 7.0, epsilon = 1e-9);
        assert_relative_eq!(segs[0].exit.dist, 13.0, epsilon = 1e-9);
        assert_relative_eq!(segs[1].entry.dist, 27.0, epsilon = 1e-9);
        assert_relative_eq!(segs[1].exit.dist, 33.0, epsilon = 1e-9);

        let outer = prim.norm(&segs[0].entry, &ray);
        assert!((outer.normal + Vec3::x()).norm() < 1e-9);
        assert!((outer.point - Point3::new(-13.0, 0.0, 0.0)).norm() < 1e-9);
        let inner = prim.norm(&segs[0].exit, &ray);
        assert!((inner.normal - Vec3::x()).norm() < 1e-9);
    }

    #[test]
    fn test_ray_through_tube_parallel_to_axis() {
        let prim = prep(&ring());
        let ray = Ray::new(Point3::new(0.0, 10.0, 5.0), -Vec3::z());
        let segs = prim.shot(&ray);
        assert_eq!(segs.len(), 1);
        assert_relative_eq!(segs[0].entry.dist, 2.0, epsilon = 1e-9);
        assert_relative_eq!(segs[0].length(), 6.0, epsilon = 1e-9);
        let top = prim.norm(&segs[0].entry, &ray);
        assert!((top.normal - Vec3::z()).norm() < 1e-9);

        // origin inside the tube keeps the entry behind it
        let inside = Ray::new(Point3::new(0.0, 10.0, 1.0), Vec3::z());
        let segs = prim.shot(&inside);
        assert_eq!(segs.len(), 1);
        assert_relative_eq!(segs[0].entry.dist, -4.0, epsilon = 1e-9);
        assert_relative_eq!(segs[0].exit.dist, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_oblique_hits_lie_on_surface() {
        let tor = TorInternal::new(Point3::new(1.0, -2.0, 3.0), Vec3::new(1.0, 1.0, 0.5), 4.0, 1.5)
            .unwrap();
        let prim = prep(&tor);
        let axis = tor.axis;
        let on_surface = |q: Point3| {
            let v = q - tor.center;
            let h = v.dot(&axis);
            let rho = (v - axis * h).norm();
            ((rho - 4.0).hypot(h) - 1.5).abs()
        };
        let mut hits = 0;
        for k in 0..40 {
            let a = k as f64 * 0.37;
            let origin = tor.center + Vec3::new(a.cos(), a.sin(), 0.3 * a.sin()) * 15.0;
            let target = tor.center + Vec3::new(0.2 * a.sin(), 3.0 * a.cos(), 1.0);
            let ray = Ray::new(origin, target - origin);
            for seg in prim.shot(&ray) {
                assert!(seg.is_well_formed());
                assert!(seg.entry.dist < seg.exit.dist);
                for hit in [seg.entry, seg.exit] {
                    assert!(on_surface(ray.at(hit.dist)) < 1e-8);
                    let uv = prim.uv(&hit, &ray);
                    assert!((0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y));
                    hits += 1;
                }
                let n = prim.norm(&seg.entry, &ray).normal;
                assert!(n.dot(&ray.dir()) < 0.0);
            }
        }
        assert!(hits > 0);
    }

    #[test]
    fn test_tangent_ray_is_a_miss() {
        let prim = prep(&ring());
        let ray = Ray::new(Point3::new(-20.0, 0.0, 3.0), Vec3::x());
        assert!(prim.shot(&ray).is_empty());
        let above = Ray::new(Point3::new(-20.0, 0.0, 3.5), Vec3::x());
        assert!(prim.shot(&above).is_empty());
    }

    #[test]
    fn test_principal_curvatures() {
        let prim = prep(&ring());
        let ray = Ray::new(Point3::new(-20.0, 0.0, 0.0), Vec3::x());
        let segs = prim.shot(&ray);
        // outer equator: around the tube and around the axis, both convex
        let outer = prim.curvature(&segs[0].entry, &ray);
        assert_relative_eq!(outer.c1, -1.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(outer.c2, -1.0 / 13.0, epsilon = 1e-9);
        // inner equator is saddle-shaped
        let inner = prim.curvature(&segs[0].exit, &ray);
        assert_relative_eq!(inner.c1, -1.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(inner.c2, 1.0 / 7.0, epsilon = 1e-9);
        assert!(inner.direction.z.abs() > 0.999);
    }

    #[test]
    fn test_uv_at_known_points() {
        let prim = prep(&ring());
        let ray = Ray::new(Point3::new(0.0, 10.0, 5.0), -Vec3::z());
        let segs = prim.shot(&ray);
        let uv = prim.uv(&segs[0].entry, &ray);
        // top of the tube is a quarter turn around it
        assert_relative_eq!(uv.y, 0.25, epsilon = 1e-9);
        let uv_bottom = prim.uv(&segs[0].exit, &ray);
        assert_relative_eq!(uv_bottom.y, 0.75, epsilon = 1e-9);
        assert_relative_eq!(uv.x, uv_bottom.x, epsilon = 1e-9);
    }

    #[test]
    fn test_import_under_placement() {
        let rec = GeometryRecord::Tor {
            center: Point3::origin(),
            axis: Vec3::z(),
            r_major: 2.0,
            r_minor: 0.5,
        };
        let xform = Transform::translation(0.0, 0.0, 5.0)
            .then(&Transform::rotation(&Vec3::x(), PI / 2.0))
            .then(&Transform::scale(2.0, 2.0, 2.0));
        let internal = import(&rec, &xform).unwrap();
        let prim = internal.prep(&PrepOptions::default()).unwrap();
        // axis now along -y, radii doubled, centered at z = 5
        let ray = Ray::new(Point3::new(-10.0, 0.0, 5.0), Vec3::x());
        let segs = prim.shot(&ray);
        assert_eq!(segs.len(), 2);
        assert_relative_eq!(segs[0].entry.dist, 5.0, epsilon = 1e-9);
        assert_relative_eq!(segs[0].exit.dist, 7.0, epsilon = 1e-9);
        assert_relative_eq!(prim.bounds().max.y, 1.0, epsilon = 1e-9);
        assert_relative_eq!(prim.bounds().max.x, 5.0, epsilon = 1e-9);

        match internal.export() {
            GeometryRecord::Tor {
                center,
                axis,
                r_major,
                r_minor,
            } => {
                assert!((center - Point3::new(0.0, 0.0, 5.0)).norm() < 1e-12);
                assert!((axis.dot(&Vec3::y()).abs() - 1.0).abs() < 1e-12);
                assert_relative_eq!(r_major, 4.0, epsilon = 1e-12);
                assert_relative_eq!(r_minor, 1.0, epsilon = 1e-12);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_import_errors() {
        let rec = |axis: Vec3, r_major: f64, r_minor: f64| GeometryRecord::Tor {
            center: Point3::origin(),
            axis,
            r_major,
            r_minor,
        };
        assert_eq!(
            import(&rec(Vec3::z(), 2.0, 0.5), &Transform::scale(1.0, 1.0, 2.0)).unwrap_err(),
            ImportError::NonUniformScale(PrimitiveKind::Tor)
        );
        assert!(matches!(
            import(&rec(Vec3::z(), 2.0, -0.5), &Transform::identity()),
            Err(ImportError::NegativeRadius { what: "r_minor", .. })
        ));
        assert!(matches!(
            import(&rec(Vec3::z(), 1.0, 2.0), &Transform::identity()),
            Err(ImportError::MinorExceedsMajor { .. })
        ));
        assert!(matches!(
            import(&rec(Vec3::zeros(), 2.0, 0.5), &Transform::identity()),
            Err(ImportError::DegenerateAxis(_))
        ));
        assert_eq!(
            import(&rec(Vec3::new(f64::NAN, 0.0, 1.0), 2.0, 0.5), &Transform::identity())
                .unwrap_err(),
            ImportError::NonFinite(PrimitiveKind::Tor)
        );
        let sphere = GeometryRecord::sphere(Point3::origin(), 1.0);
        assert!(matches!(
            import(&sphere, &Transform::identity()),
            Err(ImportError::BadRecordType { expected: PrimitiveKind::Tor, .. })
        ));
    }

    #[test]
    fn test_plot_and_tessellate() {
        let tor = ring();
        let tol = PlotTolerances::default();
        let n = tol.segments_for_radius(13.0);
        let m = tol.segments_for_radius(3.0);
        assert_eq!(tor.plot(&tol).count(), 4 * n + 4 * m);

        let mesh = tor.tessellate(&tol);
        assert!(mesh.num_triangles() > 0);
        for i in 0..mesh.num_vertices() {
            let p = mesh.vertex(i as u32);
            let tube = (p.coords.xy().norm() - 10.0).hypot(p.z);
            assert!((tube - 3.0).abs() < 1e-9);
        }
        // faces point away from the tube center line
        for tri in mesh.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| mesh.vertex(i));
            let normal = (b - a).cross(&(c - a));
            let mid = Point3::from((a.coords + b.coords + c.coords) / 3.0);
            let radial = mid.coords.xy().normalize() * 10.0;
            let from_core = mid.coords - Vec3::new(radial.x, radial.y, 0.0);
            assert!(normal.dot(&from_core) > 0.0);
        }
    }

    #[test]
    fn test_quartic_roots() {
        // (x - 1)(x - 2)(x + 3)(x - 0.5)
        let roots = solve_quartic([1.0, -0.5, -7.0, 9.5, -3.0]);
        assert_eq!(roots.len(), 4);
        for (r, expected) in roots.iter().zip([-3.0, 0.5, 1.0, 2.0]) {
            assert_relative_eq!(*r, expected, epsilon = 1e-10);
        }
        // x^4 + 1 has no real roots
        assert!(solve_quartic([1.0, 0.0, 0.0, 0.0, 1.0]).is_empty());
        // (x^2 - 4)(x^2 - 9), biquadratic
        let roots = solve_quartic([1.0, 0.0, -13.0, 0.0, 36.0]);
        assert_eq!(roots.len(), 4);
        assert_relative_eq!(roots[0], -3.0, epsilon = 1e-10);
        assert_relative_eq!(roots[3], 3.0, epsilon = 1e-10);
    }
}
