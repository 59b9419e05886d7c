#![warn(missing_docs)]

//! Math types for the rtcsg ray tracing core.
//!
//! nalgebra aliases plus the placement matrix carried on combination
//! references, the distance tolerances every ray query shares, and
//! bounding boxes.

mod aabb;

pub use aabb::Aabb3;

use nalgebra::{Matrix3, Matrix4, Rotation3, Unit, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// Model-space point.
pub type Point3 = nalgebra::Point3<f64>;

/// Model-space vector.
pub type Vec3 = Vector3<f64>;

/// Unit direction, as carried by rays.
pub type Dir3 = Unit<Vector3<f64>>;

/// Surface parameter pair `(u, v)`.
pub type Point2 = nalgebra::Point2<f64>;

/// Homogeneous 4x4 placement matrix.
///
/// Matrices act on column vectors, so `a.then(&b)` applies `b` first. The
/// bottom row may be non-trivial; points are divided through by `w`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Row-major in JSON, column-major in memory.
    pub matrix: Matrix4<f64>,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Build a transform from 16 values in row-major order.
    pub fn from_rows(values: &[f64; 16]) -> Self {
        Self {
            matrix: Matrix4::from_row_slice(values),
        }
    }

    /// Translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 3)] = dx;
        m[(1, 3)] = dy;
        m[(2, 3)] = dz;
        Self { matrix: m }
    }

    /// Non-uniform scale by `(sx, sy, sz)`.
    pub fn scale(sx: f64, sy: f64, sz: f64) -> Self {
        let mut m = Matrix4::identity();
        m[(0, 0)] = sx;
        m[(1, 1)] = sy;
        m[(2, 2)] = sz;
        Self { matrix: m }
    }

    /// Right-handed rotation of `angle` radians about `axis`.
    pub fn rotation(axis: &Vec3, angle: f64) -> Self {
        Self {
            matrix: Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle)
                .to_homogeneous(),
        }
    }

    /// Rotation about +Z.
    pub fn rotation_z(angle: f64) -> Self {
        Self::rotation(&Vec3::z(), angle)
    }

    /// The product `self * other`.
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Map a point, dividing through by `w`.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        let h = self.matrix * p.to_homogeneous();
        match h.w {
            w if w == 0.0 || w == 1.0 => Point3::new(h.x, h.y, h.z),
            w => Point3::new(h.x / w, h.y / w, h.z / w),
        }
    }

    /// Map a direction; translation is ignored, global scale is not.
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        let h = self.matrix * Vector4::new(v.x, v.y, v.z, 0.0);
        match self.matrix[(3, 3)] {
            w if w == 0.0 || w == 1.0 => h.xyz(),
            w => h.xyz() / w,
        }
    }

    /// Upper-left 3x3 block.
    pub fn linear_part(&self) -> Matrix3<f64> {
        self.matrix.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// `None` when singular.
    pub fn inverse(&self) -> Option<Self> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    /// Whether the matrix can be inverted.
    pub fn is_invertible(&self) -> bool {
        self.matrix.determinant().abs() > f64::EPSILON && self.matrix.iter().all(|v| v.is_finite())
    }

    /// Tolerance equality.
    ///
    /// Translation entries are compared against `tol.linear`, every other
    /// entry against `tol.perp`.
    pub fn approx_eq(&self, other: &Transform, tol: &Tolerance) -> bool {
        for row in 0..4 {
            for col in 0..4 {
                let limit = if col == 3 && row < 3 {
                    tol.linear
                } else {
                    tol.perp
                };
                if (self.matrix[(row, col)] - other.matrix[(row, col)]).abs() > limit {
                    return false;
                }
            }
        }
        true
    }

    /// Whether this transform is the identity within tolerance.
    pub fn is_identity(&self, tol: &Tolerance) -> bool {
        self.approx_eq(&Transform::identity(), tol)
    }

    /// The scale factor if the linear part is a uniform scale times a
    /// rotation, `None` otherwise.
    pub fn uniform_scale(&self) -> Option<f64> {
        let w = self.matrix[(3, 3)];
        if w == 0.0 {
            return None;
        }
        let m = self.linear_part() / w;
        let cols = [m.column(0), m.column(1), m.column(2)];
        let s = cols[0].norm();
        if s <= f64::EPSILON {
            return None;
        }
        let rel = 1e-9;
        for c in &cols[1..] {
            if (c.norm() - s).abs() > rel * s {
                return None;
            }
        }
        let ortho = (cols[0].dot(&cols[1])).abs()
            + (cols[0].dot(&cols[2])).abs()
            + (cols[1].dot(&cols[2])).abs();
        if ortho > rel * s * s {
            return None;
        }
        Some(s)
    }

    /// Bitwise key of the matrix entries, used to de-duplicate instances
    /// that share an exact transform.
    pub fn bits(&self) -> [u64; 16] {
        let mut out = [0u64; 16];
        for (slot, v) in out.iter_mut().zip(self.matrix.iter()) {
            // fold -0.0 into 0.0
            *slot = if *v == 0.0 { 0 } else { v.to_bits() };
        }
        out
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Distance and direction tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerance {
    /// Distances closer than this are equal.
    pub linear: f64,
    /// Dot products (and unitless matrix entries) smaller than this are zero.
    pub perp: f64,
}

impl Tolerance {
    /// Tight tolerances for construction checks.
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        perp: 1e-6,
    };

    /// Tolerances for ray queries and segment merging.
    pub const RAYTRACE: Self = Self {
        linear: 0.0005,
        perp: 1e-6,
    };

    /// Whether `d` is within `linear` of zero.
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() < self.linear
    }

    /// Whether two non-zero vectors are perpendicular.
    pub fn perpendicular(&self, a: &Vec3, b: &Vec3) -> bool {
        let denom = a.norm() * b.norm();
        denom > 0.0 && (a.dot(b) / denom).abs() < self.perp
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Any unit vector perpendicular to `v`.
pub fn any_perpendicular(v: &Vec3) -> Vec3 {
    let seed = if v.x.abs() < 0.9 * v.norm() {
        Vec3::x()
    } else {
        Vec3::y()
    };
    v.cross(&seed).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_rotation_about_axis() {
        let quarter = Transform::rotation(&Vec3::new(0.0, 0.0, 2.0), PI / 2.0);
        let p = quarter.apply_point(&Point3::new(1.0, 0.0, 5.0));
        assert!((p - Point3::new(0.0, 1.0, 5.0)).norm() < 1e-12);
        assert!(quarter.approx_eq(&Transform::rotation_z(PI / 2.0), &Tolerance::DEFAULT));

        let v = Transform::rotation(&Vec3::x(), PI).apply_vec(&Vec3::y());
        assert!((v + Vec3::y()).norm() < 1e-12);
    }

    #[test]
    fn test_homogeneous_divide() {
        let mut t = Transform::translation(2.0, 0.0, 0.0);
        t.matrix[(3, 3)] = 2.0;
        let p = t.apply_point(&Point3::new(4.0, 6.0, 0.0));
        assert!((p - Point3::new(3.0, 3.0, 0.0)).norm() < 1e-12);
        assert!((t.apply_vec(&Vec3::x()) - Vec3::new(0.5, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_compose_applies_right_operand_first() {
        let translate = Transform::translation(1.0, 0.0, 0.0);
        let scale = Transform::scale(2.0, 2.0, 2.0);
        let composed = scale.then(&translate);
        let result = composed.apply_point(&Point3::origin());
        assert!((result.x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_undoes_placement() {
        let t = Transform::translation(1.0, 2.0, 3.0).then(&Transform::rotation_z(0.4));
        let back = t.then(&t.inverse().unwrap());
        assert!(back.is_identity(&Tolerance::DEFAULT));
        assert!(Transform::scale(0.0, 1.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_approx_eq_uses_separate_tolerances() {
        let tol = Tolerance {
            linear: 1e-3,
            perp: 1e-9,
        };
        let a = Transform::translation(1.0, 0.0, 0.0);
        let b = Transform::translation(1.0005, 0.0, 0.0);
        assert!(a.approx_eq(&b, &tol));

        let mut c = a.clone();
        c.matrix[(0, 1)] = 1e-6;
        assert!(!a.approx_eq(&c, &tol));
    }

    #[test]
    fn test_is_identity() {
        assert!(Transform::identity().is_identity(&Tolerance::DEFAULT));
        assert!(!Transform::rotation(&Vec3::x(), 0.1).is_identity(&Tolerance::DEFAULT));
    }

    #[test]
    fn test_uniform_scale() {
        let t = Transform::rotation_z(0.3).then(&Transform::scale(2.0, 2.0, 2.0));
        assert!((t.uniform_scale().unwrap() - 2.0).abs() < 1e-12);
        assert!(Transform::scale(1.0, 2.0, 1.0).uniform_scale().is_none());
    }

    #[test]
    fn test_singular_transform_not_invertible() {
        assert!(!Transform::scale(1.0, 0.0, 1.0).is_invertible());
        assert!(Transform::rotation(&Vec3::y(), 1.0).is_invertible());
    }

    #[test]
    fn test_bits_ignore_negative_zero() {
        let mut a = Transform::identity();
        a.matrix[(0, 1)] = -0.0;
        assert_eq!(a.bits(), Transform::identity().bits());
    }

    #[test]
    fn test_transform_serde_round_trip() {
        let t = Transform::rotation(&Vec3::x(), 0.25).then(&Transform::translation(1.0, 2.0, 3.0));
        let json = serde_json::to_string(&t).unwrap();
        let back: Transform = serde_json::from_str(&json).unwrap();
        assert!(t.approx_eq(&back, &Tolerance::DEFAULT));
    }

    #[test]
    fn test_tolerance_missing_keys_default() {
        let tol: Tolerance = serde_json::from_str(r#"{ "linear": 0.01 }"#).unwrap();
        assert_eq!(tol.linear, 0.01);
        assert_eq!(tol.perp, Tolerance::DEFAULT.perp);
        assert!(tol.is_zero(0.005));
        assert!(tol.perpendicular(&Vec3::x(), &Vec3::new(0.0, 3.0, 1e-9)));
    }

    #[test]
    fn test_any_perpendicular() {
        for v in [Vec3::x(), Vec3::y(), Vec3::new(1.0, 2.0, 3.0)] {
            let p = any_perpendicular(&v);
            assert!(p.dot(&v).abs() < 1e-12);
            assert!((p.norm() - 1.0).abs() < 1e-12);
        }
    }
}
