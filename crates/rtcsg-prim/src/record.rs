//! Serialized geometry records.
//!
//! A record is what the geometry store hands to an importer: a type tag
//! plus numeric parameters, in the solid's own coordinate frame.

use std::fmt;

use rtcsg_math::{Point3, Vec3};
use rtcsg_nurbs::{BSplineCurve, BSplineSurface};
use serde::{Deserialize, Serialize};

/// Primitive type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveKind {
    /// Ellipsoid.
    Ell,
    /// Convex eight-vertex polyhedron.
    Arb8,
    /// Truncated elliptical cone.
    Cone,
    /// Particle: sphere, capsule or hull of two spheres.
    Part,
    /// Trimmed free-form boundary representation.
    Brep,
    /// Torus.
    Tor,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveKind::Ell => "ell",
            PrimitiveKind::Arb8 => "arb8",
            PrimitiveKind::Cone => "cone",
            PrimitiveKind::Part => "part",
            PrimitiveKind::Brep => "brep",
            PrimitiveKind::Tor => "tor",
        };
        f.write_str(name)
    }
}

/// Geometry of one primitive as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeometryRecord {
    /// Ellipsoid with mutually perpendicular semi-axes.
    Ell {
        /// Center.
        center: Point3,
        /// First semi-axis.
        a: Vec3,
        /// Second semi-axis.
        b: Vec3,
        /// Third semi-axis.
        c: Vec3,
    },
    /// Convex polyhedron given by eight vertices (bottom loop, top loop).
    Arb8 {
        /// Vertices.
        points: [Point3; 8],
    },
    /// Truncated elliptical cone; the top semi-axes are `top_ratio` times
    /// the base semi-axes.
    Cone {
        /// Base center.
        base: Point3,
        /// Base-to-top vector.
        height: Vec3,
        /// First base semi-axis.
        a: Vec3,
        /// Second base semi-axis.
        b: Vec3,
        /// Top size relative to base.
        top_ratio: f64,
    },
    /// Particle.
    Part {
        /// Center of the base sphere.
        base: Point3,
        /// Base-to-top vector.
        height: Vec3,
        /// Radius at the base end.
        base_radius: f64,
        /// Radius at the top end.
        top_radius: f64,
    },
    /// Trimmed B-spline faces.
    Brep(BrepRecord),
    /// Torus about `axis`; `r_minor <= r_major`.
    Tor {
        /// Center.
        center: Point3,
        /// Axis of revolution, any length.
        axis: Vec3,
        /// Distance from the center to the middle of the tube.
        r_major: f64,
        /// Tube radius.
        r_minor: f64,
    },
}

impl GeometryRecord {
    /// Type tag of this record.
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            GeometryRecord::Ell { .. } => PrimitiveKind::Ell,
            GeometryRecord::Arb8 { .. } => PrimitiveKind::Arb8,
            GeometryRecord::Cone { .. } => PrimitiveKind::Cone,
            GeometryRecord::Part { .. } => PrimitiveKind::Part,
            GeometryRecord::Brep(_) => PrimitiveKind::Brep,
            GeometryRecord::Tor { .. } => PrimitiveKind::Tor,
        }
    }

    /// Sphere of the given radius.
    pub fn sphere(center: Point3, radius: f64) -> Self {
        GeometryRecord::Ell {
            center,
            a: Vec3::x() * radius,
            b: Vec3::y() * radius,
            c: Vec3::z() * radius,
        }
    }

    /// Axis-aligned box between two corners.
    pub fn rpp(min: Point3, max: Point3) -> Self {
        GeometryRecord::Arb8 {
            points: [
                Point3::new(min.x, min.y, min.z),
                Point3::new(max.x, min.y, min.z),
                Point3::new(max.x, max.y, min.z),
                Point3::new(min.x, max.y, min.z),
                Point3::new(min.x, min.y, max.z),
                Point3::new(max.x, min.y, max.z),
                Point3::new(max.x, max.y, max.z),
                Point3::new(min.x, max.y, max.z),
            ],
        }
    }

    /// Right circular cylinder.
    pub fn rcc(base: Point3, height: Vec3, radius: f64) -> Self {
        Self::trc(base, height, radius, radius)
    }

    /// Right truncated circular cone. A zero base radius is allowed when
    /// the top radius is positive; the cone is then flipped end for end.
    pub fn trc(base: Point3, height: Vec3, base_radius: f64, top_radius: f64) -> Self {
        let (base, height, r0, r1) = if base_radius == 0.0 && top_radius > 0.0 {
            (base + height, -height, top_radius, 0.0)
        } else {
            (base, height, base_radius, top_radius)
        };
        let a = rtcsg_math::any_perpendicular(&height);
        let b = height.cross(&a).try_normalize(0.0).unwrap_or_else(Vec3::zeros);
        let ratio = if r0 > 0.0 { r1 / r0 } else { 0.0 };
        GeometryRecord::Cone {
            base,
            height,
            a: a * r0,
            b: b * r0,
            top_ratio: ratio,
        }
    }

    /// Particle record.
    pub fn particle(base: Point3, height: Vec3, base_radius: f64, top_radius: f64) -> Self {
        GeometryRecord::Part {
            base,
            height,
            base_radius,
            top_radius,
        }
    }
}

/// Orientation of a trim loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopOrientation {
    /// Outer boundary.
    Same,
    /// Hole.
    Opposite,
}

/// A closed loop of trim curves in a face's parameter plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimLoop {
    /// Outer boundary or hole.
    pub orientation: LoopOrientation,
    /// Curves in order; each curve's `(x, y)` is `(u, v)`.
    pub curves: Vec<BSplineCurve>,
}

/// One trimmed face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    /// Underlying surface.
    pub surface: BSplineSurface,
    /// Trim loops; empty means the whole parameter domain.
    #[serde(default)]
    pub loops: Vec<TrimLoop>,
    /// Face normal is opposite to `du x dv`.
    #[serde(default)]
    pub reversed: bool,
}

/// Boundary representation made of trimmed B-spline faces.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BrepRecord {
    /// Faces bounding the solid.
    pub faces: Vec<FaceRecord>,
}
