//! B-spline curves, polynomial or rational.

use rtcsg_math::{Aabb3, Point3, Transform, Vec3};
use serde::{Deserialize, Serialize};

use crate::knots::{
    basis_derivatives, basis_functions, find_span, split_parameter, validate_knots,
    validate_weights, with_full_multiplicity,
};
use crate::oslo::OsloMatrix;
use crate::NurbsError;

/// A B-spline curve in 3D, rational when it carries weights.
///
/// Trim curves live in a surface's parameter plane; they use the same type
/// with `z = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BSplineCurve {
    /// Control points in 3D.
    pub control_points: Vec<Point3>,
    /// One positive weight per control point; empty for a polynomial curve.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weights: Vec<f64>,
    /// Knot vector. Length = control_points.len() + degree + 1.
    pub knots: Vec<f64>,
    /// Polynomial degree (order = degree + 1).
    pub degree: usize,
}

impl BSplineCurve {
    /// Create a B-spline curve, validating the knot vector.
    pub fn new(
        control_points: Vec<Point3>,
        knots: Vec<f64>,
        degree: usize,
    ) -> Result<Self, NurbsError> {
        validate_knots(&knots, control_points.len(), degree)?;
        Ok(Self {
            control_points,
            weights: Vec::new(),
            knots,
            degree,
        })
    }

    /// Create a clamped uniform B-spline with the given degree.
    ///
    /// The knot vector is clamped (first and last knots repeated `degree+1` times)
    /// with uniform internal spacing.
    pub fn clamped_uniform(control_points: Vec<Point3>, degree: usize) -> Result<Self, NurbsError> {
        let n = control_points.len();
        if n <= degree {
            return Err(NurbsError::TooFewPoints {
                needed: degree + 1,
                got: n,
            });
        }
        Self::new(control_points, clamped_uniform_knots(n, degree), degree)
    }

    /// Make the curve rational.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self, NurbsError> {
        validate_weights(&weights, self.control_points.len())?;
        self.weights = weights;
        Ok(self)
    }

    /// Re-check the invariants of a curve built without [`BSplineCurve::new`]
    /// (for example one that was deserialized).
    pub fn validate(&self) -> Result<(), NurbsError> {
        validate_knots(&self.knots, self.control_points.len(), self.degree)?;
        validate_weights(&self.weights, self.control_points.len())
    }

    /// Whether the curve carries weights.
    pub fn is_rational(&self) -> bool {
        !self.weights.is_empty()
    }

    /// Weight of control point `i`; 1 for a polynomial curve.
    pub fn weight(&self, i: usize) -> f64 {
        self.weights.get(i).copied().unwrap_or(1.0)
    }

    /// Order (`degree + 1`).
    pub fn order(&self) -> usize {
        self.degree + 1
    }

    fn clamp_param(&self, t: f64) -> (usize, f64) {
        let n = self.control_points.len() - 1;
        let t = t.clamp(self.knots[self.degree], self.knots[n + 1]);
        (find_span(&self.knots, n, self.degree, t), t)
    }

    /// Evaluate the curve at parameter `t`.
    pub fn eval(&self, t: f64) -> Point3 {
        let (span, t) = self.clamp_param(t);
        let basis = basis_functions(&self.knots, span, self.degree, t);

        let mut num = Vec3::zeros();
        let mut den = 0.0;
        for (i, &b) in basis.iter().enumerate() {
            let idx = span - self.degree + i;
            let w = self.weight(idx) * b;
            num += self.control_points[idx].coords * w;
            den += w;
        }
        Point3::from(num / den)
    }

    /// Hodograph of the polynomial curve, one degree lower. For a rational
    /// curve this differentiates the weighted numerator `w * P`; use
    /// [`BSplineCurve::tangent`] for the geometric derivative.
    pub fn derivative(&self) -> BSplineCurve {
        let p = self.degree;
        if p == 0 || self.control_points.len() < 2 {
            return BSplineCurve {
                control_points: vec![Point3::origin(); self.control_points.len()],
                weights: Vec::new(),
                knots: self.knots.clone(),
                degree: p,
            };
        }
        let weighted: Vec<Vec3> = self
            .control_points
            .iter()
            .enumerate()
            .map(|(i, q)| q.coords * self.weight(i))
            .collect();
        let control_points = weighted
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let denom = self.knots[i + p + 1] - self.knots[i + 1];
                if denom > 0.0 {
                    Point3::from((w[1] - w[0]) * (p as f64 / denom))
                } else {
                    Point3::origin()
                }
            })
            .collect();
        BSplineCurve {
            control_points,
            weights: Vec::new(),
            knots: self.knots[1..self.knots.len() - 1].to_vec(),
            degree: p - 1,
        }
    }

    /// First derivative at parameter `t`, quotient rule included.
    pub fn tangent(&self, t: f64) -> Vec3 {
        let (span, t) = self.clamp_param(t);
        let ders = basis_derivatives(&self.knots, span, self.degree, t, 1);
        let (mut a, mut a1) = (Vec3::zeros(), Vec3::zeros());
        let (mut w, mut w1) = (0.0, 0.0);
        for i in 0..=self.degree {
            let idx = span - self.degree + i;
            let wi = self.weight(idx);
            let q = self.control_points[idx].coords * wi;
            a += q * ders[0][i];
            a1 += q * ders[1][i];
            w += wi * ders[0][i];
            w1 += wi * ders[1][i];
        }
        (a1 - a * (w1 / w)) / w
    }

    /// Parameter domain `(t_min, t_max)`.
    pub fn parameter_domain(&self) -> (f64, f64) {
        (
            self.knots[self.degree],
            self.knots[self.control_points.len()],
        )
    }

    /// Number of control points.
    pub fn num_control_points(&self) -> usize {
        self.control_points.len()
    }

    /// Insert a knot value using Boehm's algorithm.
    ///
    /// Returns a new curve with one additional control point.
    pub fn insert_knot(&self, t: f64) -> Result<Self, NurbsError> {
        let (lo, hi) = self.parameter_domain();
        if !(t > lo && t < hi) {
            return Err(NurbsError::ParameterOutsideDomain { t, min: lo, max: hi });
        }
        let mut knots = self.knots.clone();
        let at = knots.partition_point(|&k| k <= t);
        knots.insert(at, t);
        self.refine(&knots)
    }

    /// Refine onto a knot vector that contains this curve's knots.
    pub fn refine(&self, new_knots: &[f64]) -> Result<Self, NurbsError> {
        let matrix = OsloMatrix::new(&self.knots, new_knots, self.order())?;
        let (control_points, weights) = matrix.apply_weighted(&self.control_points, &self.weights);
        Ok(Self {
            control_points,
            weights,
            knots: new_knots.to_vec(),
            degree: self.degree,
        })
    }

    /// Split into two curves at the automatically chosen parameter.
    pub fn split(&self) -> Result<(Self, Self), NurbsError> {
        self.split_at(split_parameter(&self.knots, self.degree))
    }

    /// Split into two curves that together reproduce this one; the left
    /// covers `[t_min, t]` and the right `[t, t_max]`.
    pub fn split_at(&self, t: f64) -> Result<(Self, Self), NurbsError> {
        let (lo, hi) = self.parameter_domain();
        if !(t > lo && t < hi) {
            return Err(NurbsError::ParameterOutsideDomain { t, min: lo, max: hi });
        }
        let order = self.order();
        let knots = with_full_multiplicity(&self.knots, t, order);
        let refined = self.refine(&knots)?;
        let a = split_index(&knots, t)?;
        let cut = |v: &[f64], left: bool| match (v.is_empty(), left) {
            (true, _) => Vec::new(),
            (false, true) => v[..a].to_vec(),
            (false, false) => v[a..].to_vec(),
        };

        let left = BSplineCurve {
            control_points: refined.control_points[..a].to_vec(),
            weights: cut(&refined.weights, true),
            knots: knots[..a + order].to_vec(),
            degree: self.degree,
        };
        let right = BSplineCurve {
            control_points: refined.control_points[a..].to_vec(),
            weights: cut(&refined.weights, false),
            knots: knots[a..].to_vec(),
            degree: self.degree,
        };
        Ok((left, right))
    }

    /// Apply an affine transform to the control points; weights are kept.
    pub fn transform(&self, xform: &Transform) -> Self {
        Self {
            control_points: self
                .control_points
                .iter()
                .map(|p| xform.apply_point(p))
                .collect(),
            weights: self.weights.clone(),
            knots: self.knots.clone(),
            degree: self.degree,
        }
    }

    /// Bounds of the control polygon, which contain the curve while every
    /// weight is positive.
    pub fn bounds(&self) -> Aabb3 {
        Aabb3::from_points(&self.control_points)
    }

    /// `count + 1` points evenly spaced in parameter.
    pub fn sample(&self, count: usize) -> Vec<Point3> {
        let count = count.max(1);
        let (lo, hi) = self.parameter_domain();
        (0..=count)
            .map(|i| self.eval(lo + (hi - lo) * i as f64 / count as f64))
            .collect()
    }
}

/// Clamped knot vector with uniform interior spacing on `[0, 1]`.
pub fn clamped_uniform_knots(n_points: usize, degree: usize) -> Vec<f64> {
    let m = n_points + degree + 1;
    let mut knots = vec![0.0; m];
    let n_internal = m.saturating_sub(2 * (degree + 1));
    for i in 0..=degree {
        knots[m - 1 - i] = 1.0;
    }
    for i in 1..=n_internal {
        knots[degree + i] = i as f64 / (n_internal + 1) as f64;
    }
    knots
}

/// Index of the first knot equal to `t` in a vector where `t` has full
/// multiplicity.
pub(crate) fn split_index(knots: &[f64], t: f64) -> Result<usize, NurbsError> {
    knots
        .iter()
        .position(|&k| k == t)
        .ok_or_else(|| NurbsError::singular(format!("split value {} missing after insertion", t)))
}
