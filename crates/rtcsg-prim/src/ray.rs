//! Rays. Parameters along a ray are distances from its origin.

use rtcsg_math::{Aabb3, Dir3, Point3, Vec3};

/// A half-line with a unit direction.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Start point; distance zero.
    pub origin: Point3,
    /// Unit direction.
    pub direction: Dir3,
    /// Componentwise `1 / direction`; infinite on axis-parallel rays.
    recip: Vec3,
}

impl Ray {
    /// Ray from `origin` along `direction`, which need not be unit length
    /// but must be non-zero; see [`Ray::try_new`] for unchecked input.
    pub fn new(origin: Point3, direction: Vec3) -> Self {
        debug_assert!(direction.norm() > 0.0, "ray direction must be non-zero");
        Self::from_unit(origin, Dir3::new_normalize(direction))
    }

    /// `None` when `direction` is zero or either argument is not finite.
    pub fn try_new(origin: Point3, direction: Vec3) -> Option<Self> {
        if !origin.coords.iter().chain(direction.iter()).all(|c| c.is_finite()) {
            return None;
        }
        Dir3::try_new(direction, 0.0).map(|unit| Self::from_unit(origin, unit))
    }

    fn from_unit(origin: Point3, direction: Dir3) -> Self {
        Self {
            origin,
            direction,
            recip: direction.map(|c| 1.0 / c),
        }
    }

    /// Unit direction as a plain vector.
    #[inline]
    pub fn dir(&self) -> Vec3 {
        self.direction.into_inner()
    }

    /// Point at distance `t`.
    #[inline]
    pub fn at(&self, t: f64) -> Point3 {
        self.origin + t * self.direction.as_ref()
    }

    /// Box test clipped to the forward half-line: `None` for boxes behind
    /// the origin, and an entry of zero when the origin is inside.
    #[inline]
    pub fn intersect_aabb(&self, aabb: &Aabb3) -> Option<(f64, f64)> {
        match self.slab(aabb) {
            Some((near, far)) if far >= 0.0 => Some((near.max(0.0), far)),
            _ => None,
        }
    }

    /// Slab test against the whole line. Returns `(near, far)`, either of
    /// which may be negative.
    #[inline]
    pub fn slab(&self, aabb: &Aabb3) -> Option<(f64, f64)> {
        let mut near = f64::NEG_INFINITY;
        let mut far = f64::INFINITY;
        for axis in 0..3 {
            let a = (aabb.min[axis] - self.origin[axis]) * self.recip[axis];
            let b = (aabb.max[axis] - self.origin[axis]) * self.recip[axis];
            // NaN appears only for an origin on a slab plane of a parallel
            // ray; f64::max/min then keep the other operand
            near = near.max(a.min(b));
            far = far.min(a.max(b));
        }
        (far >= near).then_some((near, far))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb3 {
        Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(Point3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0));
        let p = ray.at(5.0);
        assert!((p.x - 5.0).abs() < 1e-12);
        assert!(p.y.abs() < 1e-12);
        assert!(p.z.abs() < 1e-12);
    }

    #[test]
    fn test_ray_aabb_hit() {
        let ray = Ray::new(Point3::new(-5.0, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0));
        let (t_min, t_max) = ray.intersect_aabb(&unit_box()).unwrap();
        assert!((t_min - 5.0).abs() < 1e-10);
        assert!((t_max - 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_ray_aabb_miss() {
        let ray = Ray::new(Point3::new(-5.0, 5.0, 5.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(ray.intersect_aabb(&unit_box()).is_none());
    }

    #[test]
    fn test_ray_inside_aabb() {
        let ray = Ray::new(Point3::new(0.5, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0));
        let (t_min, t_max) = ray.intersect_aabb(&unit_box()).unwrap();
        assert!(t_min >= 0.0);
        assert!((t_max - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_ray_aabb_behind() {
        let ray = Ray::new(Point3::new(-5.0, 0.5, 0.5), Vec3::new(-1.0, 0.0, 0.0));
        assert!(ray.intersect_aabb(&unit_box()).is_none());
        let (t_min, t_max) = ray.slab(&unit_box()).unwrap();
        assert!((t_min + 6.0).abs() < 1e-10);
        assert!((t_max + 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_try_new_rejects_zero_direction() {
        assert!(Ray::try_new(Point3::origin(), Vec3::zeros()).is_none());
        assert!(Ray::try_new(Point3::origin(), Vec3::new(f64::NAN, 1.0, 0.0)).is_none());
        assert!(Ray::try_new(Point3::new(f64::INFINITY, 0.0, 0.0), Vec3::x()).is_none());

        let ray = Ray::try_new(Point3::origin(), Vec3::new(0.0, 3.0, 4.0)).unwrap();
        assert!((ray.dir() - Vec3::new(0.0, 0.6, 0.8)).norm() < 1e-12);
        assert!(ray.intersect_aabb(&unit_box()).is_some());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "ray direction must be non-zero")]
    fn test_new_with_zero_direction_panics_in_debug() {
        let _ = Ray::new(Point3::origin(), Vec3::zeros());
    }
}
