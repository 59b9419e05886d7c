//! Oslo knot refinement.
//!
//! Given a knot vector and a refinement of it, every control point of the
//! refined spline is an affine combination of at most `order` consecutive
//! control points of the original. The weights are the discrete B-splines
//! computed by the Oslo recurrence; one sparse row per refined point.
//! Rational splines are refined in homogeneous space, where the same rows
//! apply to `(w * P, w)`.

use nalgebra::Vector4;
use rtcsg_math::Point3;

use crate::knots::is_refinement;
use crate::NurbsError;

/// One sparse row: `weights[k]` multiplies source point `start + k`.
#[derive(Debug, Clone, PartialEq)]
pub struct OsloRow {
    /// Index of the first source point with a weight.
    pub start: usize,
    /// Consecutive weights.
    pub weights: Vec<f64>,
}

/// Refinement matrix mapping coarse control points to refined ones.
#[derive(Debug, Clone, PartialEq)]
pub struct OsloMatrix {
    rows: Vec<OsloRow>,
    source_len: usize,
}

impl OsloMatrix {
    /// Build the matrix for refining `old` into `new` at the given order.
    pub fn new(old: &[f64], new: &[f64], order: usize) -> Result<Self, NurbsError> {
        if order == 0 || old.len() <= order || new.len() < old.len() {
            return Err(NurbsError::NotARefinement);
        }
        if !is_refinement(old, new) {
            return Err(NurbsError::NotARefinement);
        }
        let n_old = old.len() - order;
        let n_new = new.len() - order;

        let mut rows = Vec::with_capacity(n_new);
        let mut alpha = vec![0.0; order + 1];
        for j in 0..n_new {
            let tj = new[j];
            let mu = (0..n_old)
                .rev()
                .find(|&i| old[i] <= tj && old[i] < old[i + 1])
                .ok_or_else(|| NurbsError::singular(format!("no knot span holds {}", tj)))?;

            // alpha[s] holds the weight for source index mu + 1 - order + s.
            alpha.iter_mut().for_each(|a| *a = 0.0);
            alpha[order - 1] = 1.0;
            for r in 1..order {
                let tr = new[j + r];
                for s in (order - 1 - r)..order {
                    let i = mu as isize + 1 - order as isize + s as isize;
                    if i < 0 {
                        alpha[s] = 0.0;
                        continue;
                    }
                    let i = i as usize;
                    let d1 = old[i + r] - old[i];
                    let d2 = old[i + r + 1] - old[i + 1];
                    let w1 = if d1 > 0.0 { (tr - old[i]) / d1 } else { 0.0 };
                    let w2 = if d2 > 0.0 { (old[i + r + 1] - tr) / d2 } else { 0.0 };
                    alpha[s] = w1 * alpha[s] + w2 * alpha[s + 1];
                }
            }

            let first = (mu + 1).saturating_sub(order);
            let skip = first + order - 1 - mu;
            let weights = alpha[skip..order].to_vec();
            if weights.iter().all(|w| w.abs() < 1e-14) {
                return Err(NurbsError::singular(format!(
                    "refined control point {} has no support",
                    j
                )));
            }
            rows.push(OsloRow {
                start: first,
                weights,
            });
        }

        Ok(Self {
            rows,
            source_len: n_old,
        })
    }

    /// Sparse rows, one per refined control point.
    pub fn rows(&self) -> &[OsloRow] {
        &self.rows
    }

    /// Number of source control points the matrix expects.
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    /// Apply the matrix to a slice of control points.
    pub fn apply(&self, points: &[Point3]) -> Vec<Point3> {
        debug_assert_eq!(points.len(), self.source_len);
        self.rows
            .iter()
            .map(|row| {
                let mut acc = Point3::origin();
                for (k, w) in row.weights.iter().enumerate() {
                    acc.coords += points[row.start + k].coords * *w;
                }
                acc
            })
            .collect()
    }

    /// Apply the matrix to weighted control points. Empty `weights` means
    /// non-rational and come back empty.
    pub fn apply_weighted(&self, points: &[Point3], weights: &[f64]) -> (Vec<Point3>, Vec<f64>) {
        if weights.is_empty() {
            return (self.apply(points), Vec::new());
        }
        debug_assert_eq!(weights.len(), points.len());
        let lifted: Vec<Vector4<f64>> = points
            .iter()
            .zip(weights)
            .map(|(p, &w)| Vector4::new(p.x * w, p.y * w, p.z * w, w))
            .collect();
        self.rows
            .iter()
            .map(|row| {
                let mut acc = Vector4::zeros();
                for (k, w) in row.weights.iter().enumerate() {
                    acc += lifted[row.start + k] * *w;
                }
                (Point3::from(acc.xyz() / acc.w), acc.w)
            })
            .unzip()
    }
}
