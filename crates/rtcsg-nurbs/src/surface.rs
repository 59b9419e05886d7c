//! Tensor-product B-spline surfaces, polynomial or rational.

use rtcsg_math::{Aabb3, Point3, Transform, Vec3};
use serde::{Deserialize, Serialize};

use crate::curve::split_index;
use crate::knots::{
    basis_derivatives, basis_functions, find_span, split_parameter, validate_knots,
    validate_weights, with_full_multiplicity,
};
use crate::oslo::OsloMatrix;
use crate::NurbsError;

/// Parameter direction of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamDir {
    /// The u direction (along a row of the control grid).
    U,
    /// The v direction (along a column).
    V,
}

impl ParamDir {
    /// The other direction.
    pub fn flip(self) -> Self {
        match self {
            ParamDir::U => ParamDir::V,
            ParamDir::V => ParamDir::U,
        }
    }
}

/// Position and partial derivatives up to second order at one `(u, v)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceDerivatives {
    /// Surface point.
    pub point: Point3,
    /// `dS/du`.
    pub du: Vec3,
    /// `dS/dv`.
    pub dv: Vec3,
    /// `d2S/du2`.
    pub duu: Vec3,
    /// `d2S/dudv`.
    pub duv: Vec3,
    /// `d2S/dv2`.
    pub dvv: Vec3,
}

/// A tensor-product B-spline surface, rational when it carries weights.
///
/// Control points are stored in row-major order: `points[v_idx * n_u + u_idx]`.
/// Weights, when present, use the same layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BSplineSurface {
    /// Control points in row-major order.
    pub control_points: Vec<Point3>,
    /// One positive weight per control point; empty for a polynomial surface.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weights: Vec<f64>,
    /// Number of control points in the u direction.
    pub n_u: usize,
    /// Number of control points in the v direction.
    pub n_v: usize,
    /// Knot vector in u. Length = n_u + degree_u + 1.
    pub knots_u: Vec<f64>,
    /// Knot vector in v. Length = n_v + degree_v + 1.
    pub knots_v: Vec<f64>,
    /// Polynomial degree in u.
    pub degree_u: usize,
    /// Polynomial degree in v.
    pub degree_v: usize,
}

impl BSplineSurface {
    /// Create a B-spline surface.
    ///
    /// `control_points` is in row-major order: `[v=0,u=0], [v=0,u=1], ..., [v=1,u=0], ...`
    pub fn new(
        control_points: Vec<Point3>,
        n_u: usize,
        n_v: usize,
        knots_u: Vec<f64>,
        knots_v: Vec<f64>,
        degree_u: usize,
        degree_v: usize,
    ) -> Result<Self, NurbsError> {
        let surface = Self {
            control_points,
            weights: Vec::new(),
            n_u,
            n_v,
            knots_u,
            knots_v,
            degree_u,
            degree_v,
        };
        surface.validate()?;
        Ok(surface)
    }

    /// Make the surface rational; `weights` follows the control point layout.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self, NurbsError> {
        validate_weights(&weights, self.control_points.len())?;
        self.weights = weights;
        Ok(self)
    }

    /// Re-check grid size, both knot vectors and the weights.
    pub fn validate(&self) -> Result<(), NurbsError> {
        if self.control_points.len() != self.n_u * self.n_v {
            return Err(NurbsError::ControlGridMismatch {
                n_u: self.n_u,
                n_v: self.n_v,
                actual: self.control_points.len(),
            });
        }
        validate_knots(&self.knots_u, self.n_u, self.degree_u)?;
        validate_knots(&self.knots_v, self.n_v, self.degree_v)?;
        validate_weights(&self.weights, self.control_points.len())
    }

    /// Get a control point at `(u_idx, v_idx)`.
    pub fn cp(&self, u_idx: usize, v_idx: usize) -> &Point3 {
        &self.control_points[v_idx * self.n_u + u_idx]
    }

    /// Weight at `(u_idx, v_idx)`; 1 for a polynomial surface.
    pub fn weight(&self, u_idx: usize, v_idx: usize) -> f64 {
        self.weights
            .get(v_idx * self.n_u + u_idx)
            .copied()
            .unwrap_or(1.0)
    }

    /// Whether the surface carries weights.
    pub fn is_rational(&self) -> bool {
        !self.weights.is_empty()
    }

    fn spans(&self, u: f64, v: f64) -> (usize, f64, usize, f64) {
        let nu = self.n_u - 1;
        let nv = self.n_v - 1;
        let u = u.clamp(self.knots_u[self.degree_u], self.knots_u[nu + 1]);
        let v = v.clamp(self.knots_v[self.degree_v], self.knots_v[nv + 1]);
        (
            find_span(&self.knots_u, nu, self.degree_u, u),
            u,
            find_span(&self.knots_v, nv, self.degree_v, v),
            v,
        )
    }

    /// Evaluate the surface at `(u, v)` using tensor-product De Boor.
    pub fn eval(&self, u: f64, v: f64) -> Point3 {
        let (span_u, u, span_v, v) = self.spans(u, v);
        let basis_u = basis_functions(&self.knots_u, span_u, self.degree_u, u);
        let basis_v = basis_functions(&self.knots_v, span_v, self.degree_v, v);

        let mut num = Vec3::zeros();
        let mut den = 0.0;
        for (j, &bv) in basis_v.iter().enumerate() {
            let v_idx = span_v - self.degree_v + j;
            for (i, &bu) in basis_u.iter().enumerate() {
                let u_idx = span_u - self.degree_u + i;
                let w = self.weight(u_idx, v_idx) * bu * bv;
                num += self.cp(u_idx, v_idx).coords * w;
                den += w;
            }
        }
        Point3::from(num / den)
    }

    /// Point plus first and second partials at `(u, v)`, exact for rational
    /// surfaces.
    pub fn derivatives(&self, u: f64, v: f64) -> SurfaceDerivatives {
        let (span_u, u, span_v, v) = self.spans(u, v);
        let bu = basis_derivatives(&self.knots_u, span_u, self.degree_u, u, 2);
        let bv = basis_derivatives(&self.knots_v, span_v, self.degree_v, v, 2);

        // a[k][l] and w[k][l]: k-th u and l-th v derivative of the weighted
        // numerator and of the weight function
        let mut a = [[Vec3::zeros(); 3]; 3];
        let mut w = [[0.0; 3]; 3];
        for j in 0..=self.degree_v {
            let v_idx = span_v - self.degree_v + j;
            for i in 0..=self.degree_u {
                let u_idx = span_u - self.degree_u + i;
                let wi = self.weight(u_idx, v_idx);
                let q = self.cp(u_idx, v_idx).coords * wi;
                for (k, row) in bu.iter().enumerate() {
                    for (l, col) in bv.iter().enumerate() {
                        if k + l > 2 {
                            continue;
                        }
                        let b = row[i] * col[j];
                        a[k][l] += q * b;
                        w[k][l] += wi * b;
                    }
                }
            }
        }

        let w0 = w[0][0];
        let s = a[0][0] / w0;
        let su = (a[1][0] - s * w[1][0]) / w0;
        let sv = (a[0][1] - s * w[0][1]) / w0;
        let suu = (a[2][0] - su * (2.0 * w[1][0]) - s * w[2][0]) / w0;
        let svv = (a[0][2] - sv * (2.0 * w[0][1]) - s * w[0][2]) / w0;
        let suv = (a[1][1] - sv * w[1][0] - su * w[0][1] - s * w[1][1]) / w0;
        SurfaceDerivatives {
            point: Point3::from(s),
            du: su,
            dv: sv,
            duu: suu,
            duv: suv,
            dvv: svv,
        }
    }

    /// Hodograph surface along `dir`, one degree lower.
    ///
    /// For a polynomial surface, evaluating the result gives the partial
    /// derivative vector. For a rational one it differentiates the weighted
    /// numerator; use [`BSplineSurface::derivatives`] there.
    pub fn derivative(&self, dir: ParamDir) -> BSplineSurface {
        let (degree, knots, count) = match dir {
            ParamDir::U => (self.degree_u, &self.knots_u, self.n_u),
            ParamDir::V => (self.degree_v, &self.knots_v, self.n_v),
        };
        if degree == 0 || count < 2 {
            return BSplineSurface {
                control_points: vec![Point3::origin(); self.control_points.len()],
                ..self.clone_shape()
            };
        }
        let new_knots = knots[1..knots.len() - 1].to_vec();
        let factor: Vec<f64> = (0..count - 1)
            .map(|i| {
                let denom = knots[i + degree + 1] - knots[i + 1];
                if denom > 0.0 {
                    degree as f64 / denom
                } else {
                    0.0
                }
            })
            .collect();
        let q = |u: usize, v: usize| self.cp(u, v).coords * self.weight(u, v);

        match dir {
            ParamDir::U => {
                let mut pts = Vec::with_capacity((self.n_u - 1) * self.n_v);
                for v in 0..self.n_v {
                    for (u, f) in factor.iter().enumerate() {
                        pts.push(Point3::from((q(u + 1, v) - q(u, v)) * *f));
                    }
                }
                BSplineSurface {
                    control_points: pts,
                    n_u: self.n_u - 1,
                    knots_u: new_knots,
                    degree_u: self.degree_u - 1,
                    ..self.clone_shape()
                }
            }
            ParamDir::V => {
                let mut pts = Vec::with_capacity(self.n_u * (self.n_v - 1));
                for (v, f) in factor.iter().enumerate() {
                    for u in 0..self.n_u {
                        pts.push(Point3::from((q(u, v + 1) - q(u, v)) * *f));
                    }
                }
                BSplineSurface {
                    control_points: pts,
                    n_v: self.n_v - 1,
                    knots_v: new_knots,
                    degree_v: self.degree_v - 1,
                    ..self.clone_shape()
                }
            }
        }
    }

    /// Partial derivative with respect to u.
    pub fn deriv_u(&self, u: f64, v: f64) -> Vec3 {
        self.derivatives(u, v).du
    }

    /// Partial derivative with respect to v.
    pub fn deriv_v(&self, u: f64, v: f64) -> Vec3 {
        self.derivatives(u, v).dv
    }

    /// Parameter domain.
    pub fn parameter_domain(&self) -> ((f64, f64), (f64, f64)) {
        (
            (self.knots_u[self.degree_u], self.knots_u[self.n_u]),
            (self.knots_v[self.degree_v], self.knots_v[self.n_v]),
        )
    }

    /// Apply an affine transform to the control grid; weights are kept.
    pub fn transform(&self, t: &Transform) -> Self {
        Self {
            control_points: self.control_points.iter().map(|p| t.apply_point(p)).collect(),
            weights: self.weights.clone(),
            ..self.clone_shape()
        }
    }

    /// Bounds of the control grid, which contain the surface while every
    /// weight is positive.
    pub fn bounds(&self) -> Aabb3 {
        Aabb3::from_points(&self.control_points)
    }

    /// Refine along `dir` onto a knot vector containing the current one.
    pub fn refine(&self, dir: ParamDir, new_knots: &[f64]) -> Result<Self, NurbsError> {
        let (old, order) = match dir {
            ParamDir::U => (&self.knots_u, self.degree_u + 1),
            ParamDir::V => (&self.knots_v, self.degree_v + 1),
        };
        let matrix = OsloMatrix::new(old, new_knots, order)?;
        let (control_points, weights) = self.apply_along(dir, &matrix);
        let n_new = new_knots.len() - order;
        let (n_u, n_v) = match dir {
            ParamDir::U => (n_new, self.n_v),
            ParamDir::V => (self.n_u, n_new),
        };
        let mut out = Self {
            control_points,
            weights,
            n_u,
            n_v,
            ..self.clone_shape()
        };
        match dir {
            ParamDir::U => out.knots_u = new_knots.to_vec(),
            ParamDir::V => out.knots_v = new_knots.to_vec(),
        }
        Ok(out)
    }

    /// Split along `dir` at the automatically chosen parameter.
    pub fn split(&self, dir: ParamDir) -> Result<(Self, Self), NurbsError> {
        let t = match dir {
            ParamDir::U => split_parameter(&self.knots_u, self.degree_u),
            ParamDir::V => split_parameter(&self.knots_v, self.degree_v),
        };
        self.split_at(dir, t)
    }

    /// Split along `dir` at `t` into two surfaces that together reproduce
    /// this one.
    pub fn split_at(&self, dir: ParamDir, t: f64) -> Result<(Self, Self), NurbsError> {
        let ((u0, u1), (v0, v1)) = self.parameter_domain();
        let (lo, hi) = match dir {
            ParamDir::U => (u0, u1),
            ParamDir::V => (v0, v1),
        };
        if !(t > lo && t < hi) {
            return Err(NurbsError::ParameterOutsideDomain { t, min: lo, max: hi });
        }
        let (old, order) = match dir {
            ParamDir::U => (&self.knots_u, self.degree_u + 1),
            ParamDir::V => (&self.knots_v, self.degree_v + 1),
        };
        let knots = with_full_multiplicity(old, t, order);
        let refined = self.refine(dir, &knots)?;
        let a = split_index(&knots, t)?;

        let left_knots = knots[..a + order].to_vec();
        let right_knots = knots[a..].to_vec();
        match dir {
            ParamDir::U => {
                let n_u = refined.n_u;
                let (left, right) = split_rows(&refined.control_points, n_u, a);
                let (left_w, right_w) = split_rows(&refined.weights, n_u, a);
                Ok((
                    Self {
                        control_points: left,
                        weights: left_w,
                        n_u: a,
                        knots_u: left_knots,
                        ..refined.clone_shape()
                    },
                    Self {
                        control_points: right,
                        weights: right_w,
                        n_u: n_u - a,
                        knots_u: right_knots,
                        ..refined.clone_shape()
                    },
                ))
            }
            ParamDir::V => {
                let split_at = a * refined.n_u;
                let (left_w, right_w) = if refined.weights.is_empty() {
                    (Vec::new(), Vec::new())
                } else {
                    (
                        refined.weights[..split_at].to_vec(),
                        refined.weights[split_at..].to_vec(),
                    )
                };
                Ok((
                    Self {
                        control_points: refined.control_points[..split_at].to_vec(),
                        weights: left_w,
                        n_v: a,
                        knots_v: left_knots,
                        ..refined.clone_shape()
                    },
                    Self {
                        control_points: refined.control_points[split_at..].to_vec(),
                        weights: right_w,
                        n_v: refined.n_v - a,
                        knots_v: right_knots,
                        ..refined.clone_shape()
                    },
                ))
            }
        }
    }

    /// Apply a refinement matrix to every row (`U`) or column (`V`),
    /// returning the new points and weights.
    fn apply_along(&self, dir: ParamDir, matrix: &OsloMatrix) -> (Vec<Point3>, Vec<f64>) {
        let rational = self.is_rational();
        match dir {
            ParamDir::U => {
                let mut points = Vec::new();
                let mut weights = Vec::new();
                for v in 0..self.n_v {
                    let range = v * self.n_u..(v + 1) * self.n_u;
                    let row_w = if rational { &self.weights[range.clone()] } else { &[][..] };
                    let (p, w) = matrix.apply_weighted(&self.control_points[range], row_w);
                    points.extend(p);
                    weights.extend(w);
                }
                (points, weights)
            }
            ParamDir::V => {
                let n_new = matrix.rows().len();
                let mut points = vec![Point3::origin(); self.n_u * n_new];
                let mut weights = if rational {
                    vec![0.0; self.n_u * n_new]
                } else {
                    Vec::new()
                };
                let mut column = Vec::with_capacity(self.n_v);
                let mut column_w = Vec::with_capacity(self.n_v);
                for u in 0..self.n_u {
                    column.clear();
                    column.extend((0..self.n_v).map(|v| *self.cp(u, v)));
                    column_w.clear();
                    if rational {
                        column_w.extend((0..self.n_v).map(|v| self.weight(u, v)));
                    }
                    let (p, w) = matrix.apply_weighted(&column, &column_w);
                    for (v, p) in p.into_iter().enumerate() {
                        points[v * self.n_u + u] = p;
                    }
                    for (v, w) in w.into_iter().enumerate() {
                        weights[v * self.n_u + u] = w;
                    }
                }
                (points, weights)
            }
        }
    }

    /// Copy of every field except the control points and weights.
    fn clone_shape(&self) -> Self {
        Self {
            control_points: Vec::new(),
            weights: Vec::new(),
            n_u: self.n_u,
            n_v: self.n_v,
            knots_u: self.knots_u.clone(),
            knots_v: self.knots_v.clone(),
            degree_u: self.degree_u,
            degree_v: self.degree_v,
        }
    }
}

/// Cut every row of a row-major grid at column `a`.
fn split_rows<T: Copy>(values: &[T], n_u: usize, a: usize) -> (Vec<T>, Vec<T>) {
    let mut left = Vec::with_capacity(values.len());
    let mut right = Vec::with_capacity(values.len());
    for row in values.chunks(n_u) {
        left.extend_from_slice(&row[..a]);
        right.extend_from_slice(&row[a..]);
    }
    (left, right)
}
