//! Ray/surface root finding by Newton iteration over `(u, v, t)`.

use nalgebra::Matrix3;
use rtcsg_math::{Point2, Point3, Vec3};
use rtcsg_nurbs::{BSplineSurface, SurfaceDerivatives};
use rtcsg_prim::Ray;

/// Maximum Newton iterations per seed.
const MAX_ITERATIONS: usize = 30;

/// A surface queried for its point and partials at one parameter pair.
#[derive(Debug, Clone)]
pub struct SurfaceJet {
    /// The surface.
    pub surface: BSplineSurface,
}

impl SurfaceJet {
    /// Wrap `surface`, polynomial or rational.
    pub fn new(surface: BSplineSurface) -> Self {
        Self { surface }
    }

    /// Point and partials up to second order.
    pub fn at(&self, uv: &Point2) -> SurfaceDerivatives {
        self.surface.derivatives(uv.x, uv.y)
    }

    /// Surface point.
    pub fn point(&self, uv: &Point2) -> Point3 {
        self.surface.eval(uv.x, uv.y)
    }

    /// First partials `(S_u, S_v)`.
    pub fn partials(&self, uv: &Point2) -> (Vec3, Vec3) {
        let d = self.at(uv);
        (d.du, d.dv)
    }

    /// Second partials `(S_uu, S_uv, S_vv)`.
    pub fn second_partials(&self, uv: &Point2) -> (Vec3, Vec3, Vec3) {
        let d = self.at(uv);
        (d.duu, d.duv, d.dvv)
    }

    /// `S_u x S_v`, unnormalized.
    pub fn raw_normal(&self, uv: &Point2) -> Vec3 {
        let (su, sv) = self.partials(uv);
        su.cross(&sv)
    }
}

/// A converged root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Root {
    /// Distance along the ray.
    pub t: f64,
    /// Surface parameters.
    pub uv: Point2,
}

/// Solve `S(u, v) = origin + t * dir` starting at `seed`, keeping `(u, v)`
/// inside `[u0, u1] x [v0, v1]`.
///
/// `tol` is the accepted residual distance.
pub fn solve(
    jet: &SurfaceJet,
    ray: &Ray,
    seed: Point2,
    (u0, u1): (f64, f64),
    (v0, v1): (f64, f64),
    tol: f64,
) -> Option<Root> {
    let d = ray.dir();
    let mut uv = seed;
    let mut t = (jet.point(&uv) - ray.origin).dot(&d);

    for _ in 0..MAX_ITERATIONS {
        let jd = jet.at(&uv);
        let f = jd.point - ray.at(t);
        if f.norm() < tol {
            return Some(Root { t, uv });
        }
        let jac = Matrix3::from_columns(&[jd.du, jd.dv, -d]);
        let step = jac.lu().solve(&(-f))?;
        if !step.iter().all(|s| s.is_finite()) {
            return None;
        }
        uv.x = (uv.x + step.x).clamp(u0, u1);
        uv.y = (uv.y + step.y).clamp(v0, v1);
        t += step.z;
    }

    let f = jet.point(&uv) - ray.at(t);
    (f.norm() < tol).then_some(Root { t, uv })
}

/// Centre plus the four quarter points of a parameter rectangle.
pub fn seeds((u0, u1): (f64, f64), (v0, v1): (f64, f64)) -> [Point2; 5] {
    let at = |fu: f64, fv: f64| Point2::new(u0 + (u1 - u0) * fu, v0 + (v1 - v0) * fv);
    [
        at(0.5, 0.5),
        at(0.25, 0.25),
        at(0.75, 0.25),
        at(0.25, 0.75),
        at(0.75, 0.75),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{parabolic_trough, quarter_cylinder};
    use approx::assert_relative_eq;

    #[test]
    fn test_trough_matches_parabola() {
        let jet = SurfaceJet::new(parabolic_trough());
        let p = jet.point(&Point2::new(0.75, 0.5));
        assert_relative_eq!(p.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(p.z, 0.25, epsilon = 1e-12);
        let (su, sv) = jet.partials(&Point2::new(0.5, 0.5));
        assert_relative_eq!(su.x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(sv.y, 2.0, epsilon = 1e-12);
        let (suu, _, svv) = jet.second_partials(&Point2::new(0.5, 0.5));
        assert_relative_eq!(suu.z, 8.0, epsilon = 1e-12);
        assert_relative_eq!(svv.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_newton_converges_from_seed() {
        let jet = SurfaceJet::new(parabolic_trough());
        let ray = Ray::new(Point3::new(0.5, 0.2, 5.0), -Vec3::z());
        let root = solve(
            &jet,
            &ray,
            Point2::new(0.5, 0.5),
            (0.0, 1.0),
            (0.0, 1.0),
            1e-10,
        )
        .unwrap();
        assert_relative_eq!(root.t, 4.75, epsilon = 1e-8);
        assert_relative_eq!(root.uv.x, 0.75, epsilon = 1e-8);
        assert_relative_eq!(root.uv.y, 0.6, epsilon = 1e-8);
    }

    #[test]
    fn test_newton_respects_subdomain() {
        let jet = SurfaceJet::new(parabolic_trough());
        let ray = Ray::new(Point3::new(0.5, 0.2, 5.0), -Vec3::z());
        // the root sits at u = 0.75, outside this strip
        let root = solve(
            &jet,
            &ray,
            Point2::new(0.25, 0.5),
            (0.0, 0.5),
            (0.0, 1.0),
            1e-10,
        );
        assert!(root.is_none());
    }

    #[test]
    fn test_seeds_inside_rect() {
        for s in seeds((1.0, 2.0), (-1.0, 0.0)) {
            assert!(s.x > 1.0 && s.x < 2.0 && s.y > -1.0 && s.y < 0.0);
        }
    }

    #[test]
    fn test_newton_on_rational_cylinder() {
        let jet = SurfaceJet::new(quarter_cylinder(1.0));
        let ray = Ray::new(Point3::new(0.0, 0.0, 0.5), Vec3::new(1.0, 1.0, 0.0));
        let root = solve(
            &jet,
            &ray,
            Point2::new(0.25, 0.25),
            (0.0, 1.0),
            (0.0, 1.0),
            1e-12,
        )
        .unwrap();
        assert_relative_eq!(root.t, 1.0, epsilon = 1e-10);
        assert_relative_eq!(root.uv.x, 0.5, epsilon = 1e-10);
        assert_relative_eq!(root.uv.y, 0.5, epsilon = 1e-10);
        // outward normal along the radius
        let n = jet.raw_normal(&root.uv).normalize();
        assert_relative_eq!(n.dot(&ray.dir()).abs(), 1.0, epsilon = 1e-10);
    }
}
