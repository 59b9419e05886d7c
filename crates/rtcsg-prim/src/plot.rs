//! Wireframe and triangle output shared by every primitive.

use std::f64::consts::PI;

use rtcsg_math::{Aabb3, Point3, Vec3};
use serde::{Deserialize, Serialize};

/// Fewest segments used to approximate a full circle.
pub const MIN_CIRCLE_SEGMENTS: usize = 6;
/// Most segments used to approximate a full circle.
pub const MAX_CIRCLE_SEGMENTS: usize = 360;

/// Tolerances controlling wireframe and mesh density.
///
/// A zero value disables that tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotTolerances {
    /// Maximum chord deviation in model units.
    pub abs: f64,
    /// Maximum chord deviation relative to the feature size.
    pub rel: f64,
    /// Maximum angle in radians between adjacent facet normals.
    pub norm: f64,
}

impl Default for PlotTolerances {
    fn default() -> Self {
        Self {
            abs: 0.0,
            rel: 0.01,
            norm: 0.0,
        }
    }
}

impl PlotTolerances {
    /// Segments needed to draw a full circle of `radius`.
    pub fn segments_for_radius(&self, radius: f64) -> usize {
        if !(radius > 0.0) {
            return MIN_CIRCLE_SEGMENTS;
        }
        let mut dev = f64::INFINITY;
        if self.abs > 0.0 {
            dev = dev.min(self.abs);
        }
        if self.rel > 0.0 {
            dev = dev.min(self.rel * radius);
        }
        let mut n = 0.0_f64;
        if dev < radius {
            let half_angle = (1.0 - dev / radius).acos();
            if half_angle > 0.0 {
                n = n.max(PI / half_angle);
            }
        }
        if self.norm > 0.0 {
            n = n.max(2.0 * PI / self.norm);
        }
        if n == 0.0 {
            return 16;
        }
        (n.ceil() as usize).clamp(MIN_CIRCLE_SEGMENTS, MAX_CIRCLE_SEGMENTS)
    }
}

/// A drawable 3D line segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    /// Start point.
    pub start: Point3,
    /// End point.
    pub end: Point3,
}

impl LineSegment {
    /// Create a segment.
    pub fn new(start: Point3, end: Point3) -> Self {
        Self { start, end }
    }
}

/// Closed ellipse `center + a cos(t) + b sin(t)` drawn with `n` segments,
/// generated lazily.
pub fn ellipse_segments(
    center: Point3,
    a: Vec3,
    b: Vec3,
    n: usize,
) -> impl Iterator<Item = LineSegment> {
    let n = n.max(3);
    let at = move |i: usize| {
        let t = 2.0 * PI * (i % n) as f64 / n as f64;
        center + a * t.cos() + b * t.sin()
    };
    (0..n).map(move |i| LineSegment::new(at(i), at(i + 1)))
}

/// Arc `center + a cos(t) + b sin(t)` for `t` in `[t0, t1]`, `n` segments.
pub fn arc_segments(
    center: Point3,
    a: Vec3,
    b: Vec3,
    t0: f64,
    t1: f64,
    n: usize,
) -> impl Iterator<Item = LineSegment> {
    let n = n.max(1);
    let at = move |i: usize| {
        let t = t0 + (t1 - t0) * i as f64 / n as f64;
        center + a * t.cos() + b * t.sin()
    };
    (0..n).map(move |i| LineSegment::new(at(i), at(i + 1)))
}

/// Consecutive segments along a polyline.
pub fn polyline_segments(points: Vec<Point3>, closed: bool) -> impl Iterator<Item = LineSegment> {
    let n = points.len();
    let count = match (n, closed) {
        (0 | 1, _) => 0,
        (_, true) => n,
        (_, false) => n - 1,
    };
    (0..count).map(move |i| LineSegment::new(points[i], points[(i + 1) % n]))
}

/// Output triangle mesh for rendering and export.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    /// Flat array of vertex positions: `[x0, y0, z0, x1, y1, z1, ...]` (f32).
    pub vertices: Vec<f32>,
    /// Flat array of triangle indices: `[i0, i1, i2, ...]` (u32).
    pub indices: Vec<u32>,
    /// Flat array of vertex normals: `[nx0, ny0, nz0, ...]` (f32). Same length as vertices.
    pub normals: Vec<f32>,
}

impl TriangleMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            normals: Vec::new(),
        }
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Append a vertex and return its index.
    pub fn push_vertex(&mut self, p: &Point3, n: &Vec3) -> u32 {
        let idx = self.num_vertices() as u32;
        self.vertices
            .extend_from_slice(&[p.x as f32, p.y as f32, p.z as f32]);
        self.normals
            .extend_from_slice(&[n.x as f32, n.y as f32, n.z as f32]);
        idx
    }

    /// Append a triangle.
    pub fn push_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    /// Position of vertex `i`.
    pub fn vertex(&self, i: u32) -> Point3 {
        let k = i as usize * 3;
        Point3::new(
            self.vertices[k] as f64,
            self.vertices[k + 1] as f64,
            self.vertices[k + 2] as f64,
        )
    }

    /// Bounds of every vertex.
    pub fn bounds(&self) -> Aabb3 {
        let mut aabb = Aabb3::empty();
        for i in 0..self.num_vertices() {
            aabb.include_point(&self.vertex(i as u32));
        }
        aabb
    }

    /// Merge another mesh into this one.
    pub fn merge(&mut self, other: &TriangleMesh) {
        let offset = self.num_vertices() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.normals.extend_from_slice(&other.normals);
        self.indices
            .extend(other.indices.iter().map(|&i| i + offset));
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// A point of a profile curve revolved about an axis: radial and axial
/// coordinates plus the profile normal in the same frame.
#[derive(Debug, Clone, Copy)]
pub struct ProfilePoint {
    /// Distance from the axis.
    pub radial: f64,
    /// Position along the axis.
    pub axial: f64,
    /// Radial component of the normal.
    pub n_radial: f64,
    /// Axial component of the normal.
    pub n_axial: f64,
}

/// Revolve a profile (ordered from the `-axis` end to the `+axis` end)
/// about `axis` through `origin`. `u` and `w` complete a right-handed
/// orthonormal frame with `axis`.
pub fn revolve_profile(
    origin: &Point3,
    u: &Vec3,
    w: &Vec3,
    axis: &Vec3,
    profile: &[ProfilePoint],
    segments: usize,
) -> TriangleMesh {
    let mut mesh = TriangleMesh::new();
    let segments = segments.max(3);
    let ring = segments + 1;
    for p in profile {
        for i in 0..ring {
            let phi = 2.0 * PI * i as f64 / segments as f64;
            let radial = u * phi.cos() + w * phi.sin();
            let pos = origin + radial * p.radial + axis * p.axial;
            let n = (radial * p.n_radial + axis * p.n_axial).normalize();
            mesh.push_vertex(&pos, &n);
        }
    }
    for j in 0..profile.len().saturating_sub(1) {
        for i in 0..segments {
            let a = (j * ring + i) as u32;
            let b = a + 1;
            let c = a + ring as u32;
            let d = c + 1;
            if profile[j].radial > 1e-12 {
                mesh.push_triangle(a, b, d);
            }
            if profile[j + 1].radial > 1e-12 {
                mesh.push_triangle(a, d, c);
            }
        }
    }
    mesh
}
