//! Global curve interpolation through data points.

use nalgebra::DMatrix;
use rtcsg_math::Point3;

use crate::knots::{basis_functions, find_span};
use crate::{BSplineCurve, NurbsError};

/// Interpolate a clamped B-spline of `degree` through `points`.
///
/// Parameters follow chord length and interior knots are averages of
/// `degree` consecutive parameters. Coincident consecutive points make the
/// collocation system singular and are rejected.
pub fn interpolate_curve(points: &[Point3], degree: usize) -> Result<BSplineCurve, NurbsError> {
    if degree == 0 || points.len() <= degree {
        return Err(NurbsError::TooFewPoints {
            needed: degree.max(1) + 1,
            got: points.len(),
        });
    }
    let n = points.len() - 1;

    let chords: Vec<f64> = points.windows(2).map(|w| (w[1] - w[0]).norm()).collect();
    let total: f64 = chords.iter().sum();
    if let Some(k) = chords.iter().position(|&d| d <= f64::EPSILON * total.max(1.0)) {
        return Err(NurbsError::singular(format!(
            "points {} and {} coincide",
            k,
            k + 1
        )));
    }
    let mut params = Vec::with_capacity(n + 1);
    params.push(0.0);
    let mut acc = 0.0;
    for d in &chords[..n - 1] {
        acc += d / total;
        params.push(acc);
    }
    params.push(1.0);

    let m = n + degree + 1;
    let mut knots = vec![0.0; m + 1];
    for k in knots.iter_mut().skip(m - degree) {
        *k = 1.0;
    }
    for j in 1..=(n - degree) {
        let sum: f64 = params[j..j + degree].iter().sum();
        knots[j + degree] = sum / degree as f64;
    }

    let mut a = DMatrix::<f64>::zeros(n + 1, n + 1);
    for (row, &t) in params.iter().enumerate() {
        let span = find_span(&knots, n, degree, t);
        for (k, b) in basis_functions(&knots, span, degree, t).into_iter().enumerate() {
            a[(row, span - degree + k)] = b;
        }
    }
    let mut rhs = DMatrix::<f64>::zeros(n + 1, 3);
    for (row, p) in points.iter().enumerate() {
        rhs[(row, 0)] = p.x;
        rhs[(row, 1)] = p.y;
        rhs[(row, 2)] = p.z;
    }

    let solved = a
        .lu()
        .solve(&rhs)
        .ok_or_else(|| NurbsError::singular("collocation matrix is singular"))?;
    let control_points = (0..=n)
        .map(|i| Point3::new(solved[(i, 0)], solved[(i, 1)], solved[(i, 2)]))
        .collect();
    BSplineCurve::new(control_points, knots, degree)
}
