//! Trim testing in a face's parameter plane.
//!
//! Trim curves are flattened once into closed polylines by recursive
//! splitting. A `(u, v)` point is inside the trimmed region when a ray cast
//! from it toward `+u` crosses the loops an odd number of times.
//!
//! Outer boundaries are expected to run counter-clockwise and holes
//! clockwise. Parity does not depend on winding, so a loop wound against
//! its orientation is only reported.

use log::warn;
use rtcsg_math::Point2;
use rtcsg_nurbs::{BSplineCurve, NurbsError};
use rtcsg_prim::{LoopOrientation, TrimLoop};

/// Deepest split used when flattening one trim curve.
const MAX_FLATTEN_DEPTH: usize = 12;

/// Where a parameter rectangle lies relative to the trimmed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectClass {
    /// Entirely kept.
    Inside,
    /// Entirely trimmed away.
    Outside,
    /// A trim boundary passes through it.
    Straddle,
}

/// One closed trim loop as a polyline.
#[derive(Debug, Clone)]
pub struct TrimPolyline {
    /// Outer boundary or hole.
    pub orientation: LoopOrientation,
    /// Vertices; the last connects back to the first.
    pub points: Vec<Point2>,
}

impl TrimPolyline {
    /// Shoelace area; positive when the loop runs counter-clockwise.
    pub fn signed_area(&self) -> f64 {
        0.5 * self
            .edges()
            .map(|(a, b)| a.x * b.y - b.x * a.y)
            .sum::<f64>()
    }

    /// Whether the winding agrees with `orientation`.
    pub fn winding_matches(&self) -> bool {
        let area = self.signed_area();
        match self.orientation {
            LoopOrientation::Same => area > 0.0,
            LoopOrientation::Opposite => area < 0.0,
        }
    }

    fn edges(&self) -> impl Iterator<Item = (Point2, Point2)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }
}

/// Flattened trim loops of one face.
#[derive(Debug, Clone, Default)]
pub struct TrimRegion {
    loops: Vec<TrimPolyline>,
}

impl TrimRegion {
    /// Flatten `loops` so no chord strays more than `tol` from its curve's
    /// control polygon.
    pub fn new(loops: &[TrimLoop], tol: f64) -> Result<Self, NurbsError> {
        let mut out = Vec::with_capacity(loops.len());
        for (i, lp) in loops.iter().enumerate() {
            let mut points: Vec<Point2> = Vec::new();
            for curve in &lp.curves {
                let start = to_uv(&curve.eval(curve.parameter_domain().0));
                if points.last().map_or(true, |p| (p - start).norm() > tol) {
                    points.push(start);
                }
                flatten(curve, tol, 0, &mut points)?;
            }
            if points.len() > 1 && (points[0] - points[points.len() - 1]).norm() <= tol {
                points.pop();
            }
            if points.len() >= 3 {
                let polyline = TrimPolyline {
                    orientation: lp.orientation,
                    points,
                };
                if !polyline.winding_matches() {
                    warn!(
                        "trim loop {} ({:?}) is wound against its orientation",
                        i, lp.orientation
                    );
                }
                out.push(polyline);
            }
        }
        Ok(Self { loops: out })
    }

    /// No loops: the whole domain is kept.
    pub fn is_unbounded(&self) -> bool {
        self.loops.is_empty()
    }

    /// The flattened loops.
    pub fn loops(&self) -> &[TrimPolyline] {
        &self.loops
    }

    /// Loop crossings of the ray from `uv` toward `+u`.
    ///
    /// Edges are half-open in `v`, so a vertex on the ray is counted once.
    pub fn crossings(&self, uv: &Point2) -> usize {
        let mut count = 0;
        for lp in &self.loops {
            for (a, b) in lp.edges() {
                if (a.y > uv.y) != (b.y > uv.y) {
                    let u = a.x + (uv.y - a.y) * (b.x - a.x) / (b.y - a.y);
                    if u > uv.x {
                        count += 1;
                    }
                }
            }
        }
        count
    }

    /// Parity test: an odd number of crossings means inside.
    pub fn contains(&self, uv: &Point2) -> bool {
        self.is_unbounded() || self.crossings(uv) % 2 == 1
    }

    /// Classify the rectangle `[u0, u1] x [v0, v1]`.
    pub fn classify_rect(&self, (u0, u1): (f64, f64), (v0, v1): (f64, f64)) -> RectClass {
        if self.is_unbounded() {
            return RectClass::Inside;
        }
        let crossed = self
            .loops
            .iter()
            .flat_map(|lp| lp.edges())
            .any(|(a, b)| segment_meets_rect(&a, &b, (u0, u1), (v0, v1)));
        if crossed {
            RectClass::Straddle
        } else if self.contains(&Point2::new(0.5 * (u0 + u1), 0.5 * (v0 + v1))) {
            RectClass::Inside
        } else {
            RectClass::Outside
        }
    }
}

fn to_uv(p: &rtcsg_math::Point3) -> Point2 {
    Point2::new(p.x, p.y)
}

/// Append the points after the first of `curve`'s flattened polyline.
fn flatten(
    curve: &BSplineCurve,
    tol: f64,
    depth: usize,
    out: &mut Vec<Point2>,
) -> Result<(), NurbsError> {
    let pts = &curve.control_points;
    let (first, last) = (to_uv(&pts[0]), to_uv(&pts[pts.len() - 1]));
    let chord = last - first;
    let len = chord.norm();
    let deviation = pts
        .iter()
        .map(|p| {
            let d = to_uv(p) - first;
            if len > 0.0 {
                (d.x * chord.y - d.y * chord.x).abs() / len
            } else {
                d.norm()
            }
        })
        .fold(0.0, f64::max);
    if deviation <= tol || depth >= MAX_FLATTEN_DEPTH {
        out.push(to_uv(&curve.eval(curve.parameter_domain().1)));
        return Ok(());
    }
    let (left, right) = curve.split()?;
    flatten(&left, tol, depth + 1, out)?;
    flatten(&right, tol, depth + 1, out)
}

/// Liang-Barsky clip of segment `ab` against the rectangle.
fn segment_meets_rect(a: &Point2, b: &Point2, (u0, u1): (f64, f64), (v0, v1): (f64, f64)) -> bool {
    let d = b - a;
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    for (p, q) in [
        (-d.x, a.x - u0),
        (d.x, u1 - a.x),
        (-d.y, a.y - v0),
        (d.y, v1 - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtcsg_math::Point3;

    fn polygon(points: &[(f64, f64)], orientation: LoopOrientation) -> TrimLoop {
        let mut pts: Vec<Point3> = points.iter().map(|&(u, v)| Point3::new(u, v, 0.0)).collect();
        pts.push(pts[0]);
        TrimLoop {
            orientation,
            curves: vec![BSplineCurve::clamped_uniform(pts, 1).unwrap()],
        }
    }

    fn square_with_hole() -> TrimRegion {
        TrimRegion::new(
            &[
                polygon(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)], LoopOrientation::Same),
                polygon(
                    &[(0.4, 0.4), (0.4, 0.6), (0.6, 0.6), (0.6, 0.4)],
                    LoopOrientation::Opposite,
                ),
            ],
            1e-6,
        )
        .unwrap()
    }

    #[test]
    fn test_polyline_is_exact_for_linear_curves() {
        let region = square_with_hole();
        assert_eq!(region.loops().len(), 2);
        assert_eq!(region.loops()[0].points.len(), 4);
        assert_eq!(region.loops()[1].orientation, LoopOrientation::Opposite);
    }

    #[test]
    fn test_parity_with_hole() {
        let region = square_with_hole();
        assert!(region.contains(&Point2::new(0.2, 0.5)));
        assert!(!region.contains(&Point2::new(0.5, 0.5)));
        assert!(!region.contains(&Point2::new(1.5, 0.5)));
        assert_eq!(region.crossings(&Point2::new(0.2, 0.5)), 3);
    }

    #[test]
    fn test_ray_through_vertex_counts_once() {
        let diamond = TrimRegion::new(
            &[polygon(&[(0.5, 0.0), (1.0, 0.5), (0.5, 1.0), (0.0, 0.5)], LoopOrientation::Same)],
            1e-6,
        )
        .unwrap();
        // the +u ray from (0.25, 0.5) passes exactly through the vertex (1.0, 0.5)
        assert!(diamond.contains(&Point2::new(0.25, 0.5)));
        assert!(!diamond.contains(&Point2::new(-0.25, 0.5)));
    }

    #[test]
    fn test_curved_loop_is_flattened() {
        // quadratic arc closed by a chord
        let arc = BSplineCurve::clamped_uniform(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
            ],
            2,
        )
        .unwrap();
        let chord = BSplineCurve::clamped_uniform(
            vec![Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0)],
            1,
        )
        .unwrap();
        let region = TrimRegion::new(
            &[TrimLoop {
                orientation: LoopOrientation::Same,
                curves: vec![arc, chord],
            }],
            1e-4,
        )
        .unwrap();
        assert!(region.loops()[0].points.len() > 8);
        // the arc peaks at v = 0.5
        assert!(region.contains(&Point2::new(0.5, 0.49)));
        assert!(!region.contains(&Point2::new(0.5, 0.51)));
    }

    #[test]
    fn test_classify_rect() {
        let region = square_with_hole();
        assert_eq!(region.classify_rect((0.1, 0.2), (0.1, 0.2)), RectClass::Inside);
        assert_eq!(region.classify_rect((0.45, 0.55), (0.45, 0.55)), RectClass::Outside);
        assert_eq!(region.classify_rect((0.3, 0.5), (0.3, 0.5)), RectClass::Straddle);
        assert_eq!(region.classify_rect((2.0, 3.0), (2.0, 3.0)), RectClass::Outside);
        assert_eq!(
            TrimRegion::default().classify_rect((0.0, 1.0), (0.0, 1.0)),
            RectClass::Inside
        );
    }

    #[test]
    fn test_winding_checked_against_orientation() {
        let region = square_with_hole();
        assert!((region.loops()[0].signed_area() - 1.0).abs() < 1e-12);
        assert!((region.loops()[1].signed_area() + 0.04).abs() < 1e-12);
        assert!(region.loops().iter().all(TrimPolyline::winding_matches));

        // a counter-clockwise hole is flagged but still trims by parity
        let flipped = TrimRegion::new(
            &[
                polygon(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)], LoopOrientation::Same),
                polygon(
                    &[(0.4, 0.4), (0.6, 0.4), (0.6, 0.6), (0.4, 0.6)],
                    LoopOrientation::Opposite,
                ),
            ],
            1e-6,
        )
        .unwrap();
        assert!(flipped.loops()[0].winding_matches());
        assert!(!flipped.loops()[1].winding_matches());
        assert!(!flipped.contains(&Point2::new(0.5, 0.5)));
        assert!(flipped.contains(&Point2::new(0.2, 0.5)));
    }
}
