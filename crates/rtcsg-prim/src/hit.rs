//! Hit, segment and surface-query result types.

use nalgebra::Matrix3;
use rtcsg_math::{any_perpendicular, Point2, Point3, Vec3};

/// One ray/surface intersection.
///
/// `shot` fills the distance and surface number; `vpriv` and `param` are a
/// private stash each primitive reads back in `norm`, `curvature` and `uv`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Distance along the ray.
    pub dist: f64,
    /// Primitive-specific surface number.
    pub surface: u32,
    /// Primitive-private vector.
    pub vpriv: Vec3,
    /// Primitive-private parameter pair.
    pub param: Point2,
}

impl Hit {
    /// Hit at `dist` on surface `surface` with an empty stash.
    pub fn new(dist: f64, surface: u32) -> Self {
        Self {
            dist,
            surface,
            vpriv: Vec3::zeros(),
            param: Point2::origin(),
        }
    }

    /// Set the private vector.
    pub fn with_vpriv(mut self, vpriv: Vec3) -> Self {
        self.vpriv = vpriv;
        self
    }

    /// Set the private parameter pair.
    pub fn with_param(mut self, param: Point2) -> Self {
        self.param = param;
        self
    }
}

/// An entry/exit pair from one primitive along one ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Where the ray enters the solid.
    pub entry: Hit,
    /// Where it leaves.
    pub exit: Hit,
}

impl Segment {
    /// Create a segment.
    pub fn new(entry: Hit, exit: Hit) -> Self {
        Self { entry, exit }
    }

    /// Distance between entry and exit.
    pub fn length(&self) -> f64 {
        self.exit.dist - self.entry.dist
    }

    /// Both distances are finite and ordered.
    pub fn is_well_formed(&self) -> bool {
        self.entry.dist.is_finite() && self.exit.dist.is_finite() && self.entry.dist <= self.exit.dist
    }
}

/// Hit point and outward unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    /// Point on the surface.
    pub point: Point3,
    /// Outward unit normal.
    pub normal: Vec3,
}

/// Principal curvatures at a hit.
///
/// `c1 <= c2`; convex surfaces report negative values. `direction` is the
/// principal direction of `c1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Curvature {
    /// Smaller principal curvature.
    pub c1: f64,
    /// Larger principal curvature.
    pub c2: f64,
    /// Unit principal direction for `c1`.
    pub direction: Vec3,
}

impl Curvature {
    /// Zero curvature with an arbitrary tangent direction.
    pub fn flat(normal: &Vec3) -> Self {
        Self {
            c1: 0.0,
            c2: 0.0,
            direction: any_perpendicular(normal),
        }
    }

    /// Both principal curvatures equal to `-1 / radius`.
    pub fn spherical(normal: &Vec3, radius: f64) -> Self {
        let c = if radius > 0.0 { -1.0 / radius } else { 0.0 };
        Self {
            c1: c,
            c2: c,
            direction: any_perpendicular(normal),
        }
    }

    /// Principal curvatures from the shape operator expressed in the
    /// orthonormal tangent basis `(e1, e2)`.
    pub fn from_shape_operator(e1: &Vec3, e2: &Vec3, k11: f64, k12: f64, k22: f64) -> Self {
        let mean = 0.5 * (k11 + k22);
        let half = 0.5 * (k11 - k22);
        let radius = (half * half + k12 * k12).sqrt();
        let c1 = mean - radius;
        let c2 = mean + radius;
        let direction = if k12.abs() > 1e-14 {
            (e1 * k12 + e2 * (c1 - k11)).normalize()
        } else if k11 <= k22 {
            *e1
        } else {
            *e2
        };
        Self { c1, c2, direction }
    }

    /// Curvature of the level set of an implicit function with gradient
    /// `grad` and Hessian `hess` at the point. The gradient points outward.
    pub fn from_implicit(grad: &Vec3, hess: &Matrix3<f64>) -> Self {
        let g = grad.norm();
        let n = grad / g;
        let e1 = any_perpendicular(&n);
        let e2 = n.cross(&e1);
        let k11 = -(e1.dot(&(hess * e1))) / g;
        let k12 = -(e1.dot(&(hess * e2))) / g;
        let k22 = -(e2.dot(&(hess * e2))) / g;
        Self::from_shape_operator(&e1, &e2, k11, k12, k22)
    }
}

/// Sphere enclosing a prepared primitive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Center.
    pub center: Point3,
    /// Radius.
    pub radius: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_operator_diagonal() {
        let c = Curvature::from_shape_operator(&Vec3::x(), &Vec3::y(), 0.0, 0.0, -2.0);
        assert_eq!(c.c1, -2.0);
        assert_eq!(c.c2, 0.0);
        assert!((c.direction - Vec3::y()).norm() < 1e-12);
    }

    #[test]
    fn test_shape_operator_rotated() {
        // principal values -1 and 0 along the diagonals
        let c = Curvature::from_shape_operator(&Vec3::x(), &Vec3::y(), -0.5, -0.5, -0.5);
        assert!((c.c1 + 1.0).abs() < 1e-12);
        assert!(c.c2.abs() < 1e-12);
        let expected = Vec3::new(1.0, 1.0, 0.0).normalize();
        assert!((c.direction.dot(&expected).abs() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_segment_well_formed() {
        let s = Segment::new(Hit::new(1.0, 0), Hit::new(2.0, 0));
        assert!(s.is_well_formed());
        assert_eq!(s.length(), 1.0);
        let bad = Segment::new(Hit::new(f64::NAN, 0), Hit::new(2.0, 0));
        assert!(!bad.is_well_formed());
    }
}
