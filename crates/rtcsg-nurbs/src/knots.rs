//! Knot vector utilities.

use crate::NurbsError;

/// Validate a knot vector: non-decreasing, length = n_control_points + degree + 1.
pub fn validate_knots(knots: &[f64], n_points: usize, degree: usize) -> Result<(), NurbsError> {
    let expected = n_points + degree + 1;
    if knots.len() != expected || n_points == 0 {
        return Err(NurbsError::InvalidKnotVector {
            expected,
            actual: knots.len(),
        });
    }
    for i in 1..knots.len() {
        if !(knots[i] >= knots[i - 1]) {
            return Err(NurbsError::NonMonotonicKnots(i));
        }
    }
    if knots[degree] >= knots[n_points] {
        return Err(NurbsError::InvalidKnotVector {
            expected,
            actual: knots.len(),
        });
    }
    Ok(())
}

/// Find the knot span index for parameter `t`.
///
/// Returns `i` such that `knots[i] <= t < knots[i+1]`, clamped to valid range.
/// For `t` at the end of the domain, returns the last valid span.
pub fn find_span(knots: &[f64], n: usize, degree: usize, t: f64) -> usize {
    // n = number of control points - 1 (last index)
    if t >= knots[n + 1] {
        // last non-empty span
        let mut span = n;
        while span > degree && knots[span] >= knots[n + 1] {
            span -= 1;
        }
        return span;
    }
    if t <= knots[degree] {
        return degree;
    }
    let mut low = degree;
    let mut high = n + 1;
    let mut mid = (low + high) / 2;
    while t < knots[mid] || t >= knots[mid + 1] {
        if t < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// Compute non-zero basis function values at parameter `t`.
///
/// Returns a vector of `degree + 1` values `N[span-degree..=span]` at `t`.
pub fn basis_functions(knots: &[f64], span: usize, degree: usize, t: f64) -> Vec<f64> {
    let mut n = vec![0.0; degree + 1];
    let mut left = vec![0.0; degree + 1];
    let mut right = vec![0.0; degree + 1];
    n[0] = 1.0;

    for j in 1..=degree {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            if denom.abs() < 1e-30 {
                n[r] = saved;
                saved = 0.0;
                continue;
            }
            let temp = n[r] / denom;
            n[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n[j] = saved;
    }

    n
}

/// Basis functions and their derivatives at `t`.
///
/// `ders[k][j]` is the `k`-th derivative of `N[span - degree + j]`, for
/// `k` in `0..=order`. Derivatives above `degree` are zero.
pub fn basis_derivatives(
    knots: &[f64],
    span: usize,
    degree: usize,
    t: f64,
    order: usize,
) -> Vec<Vec<f64>> {
    let p = degree;
    let div = |a: f64, b: f64| if b.abs() < 1e-30 { 0.0 } else { a / b };

    // ndu[j][r] (r < j) holds knot differences, ndu[r][j] (r <= j) basis values
    let mut ndu = vec![vec![0.0; p + 1]; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];
    ndu[0][0] = 1.0;
    for j in 1..=p {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            ndu[j][r] = right[r + 1] + left[j - r];
            let temp = div(ndu[r][j - 1], ndu[j][r]);
            ndu[r][j] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        ndu[j][j] = saved;
    }

    let mut ders = vec![vec![0.0; p + 1]; order + 1];
    for (j, d) in ders[0].iter_mut().enumerate() {
        *d = ndu[j][p];
    }
    let top = order.min(p);
    let mut a = [vec![0.0; p + 1], vec![0.0; p + 1]];
    for r in 0..=p {
        let (mut s1, mut s2) = (0, 1);
        a[0][0] = 1.0;
        for k in 1..=top {
            let mut d = 0.0;
            let pk = p - k;
            if r >= k {
                let rk = r - k;
                a[s2][0] = div(a[s1][0], ndu[pk + 1][rk]);
                d = a[s2][0] * ndu[rk][pk];
            }
            // a[s2][j] pairs with ndu[r - k + j]
            let j1 = if r + 1 >= k { 1 } else { k - r };
            let j2 = if r <= pk + 1 { k - 1 } else { p - r };
            for j in j1..=j2 {
                let i = r + j - k;
                a[s2][j] = div(a[s1][j] - a[s1][j - 1], ndu[pk + 1][i]);
                d += a[s2][j] * ndu[i][pk];
            }
            if r <= pk {
                a[s2][k] = div(-a[s1][k - 1], ndu[pk + 1][r]);
                d += a[s2][k] * ndu[r][pk];
            }
            ders[k][r] = d;
            std::mem::swap(&mut s1, &mut s2);
        }
    }

    let mut factor = p as f64;
    for k in 1..=top {
        for d in ders[k].iter_mut() {
            *d *= factor;
        }
        factor *= (p - k) as f64;
    }
    ders
}

/// Check a weight vector; empty means non-rational.
pub fn validate_weights(weights: &[f64], n_points: usize) -> Result<(), NurbsError> {
    if weights.is_empty() {
        return Ok(());
    }
    if weights.len() != n_points {
        return Err(NurbsError::WeightCountMismatch {
            expected: n_points,
            actual: weights.len(),
        });
    }
    match weights.iter().position(|w| !(w.is_finite() && *w > 0.0)) {
        Some(i) => Err(NurbsError::NonPositiveWeight(i)),
        None => Ok(()),
    }
}

/// Number of knots exactly equal to `t`.
pub fn multiplicity(knots: &[f64], t: f64) -> usize {
    knots.iter().filter(|&&k| k == t).count()
}

/// Pick the parameter at which a knot vector should be split in two.
///
/// Uses the knot at the middle index when the vector has interior knots
/// and that knot lies strictly inside the domain, otherwise the midpoint
/// of the first and last knot values.
pub fn split_parameter(knots: &[f64], degree: usize) -> f64 {
    let order = degree + 1;
    let n_points = knots.len() - order;
    let (lo, hi) = (knots[degree], knots[n_points]);
    if knots.len() > 2 * order {
        let candidate = knots[knots.len() / 2];
        if candidate > lo && candidate < hi {
            return candidate;
        }
    }
    let mid = 0.5 * (knots[0] + knots[knots.len() - 1]);
    if mid > lo && mid < hi {
        mid
    } else {
        0.5 * (lo + hi)
    }
}

/// Knot vector with `t` inserted until its multiplicity reaches `order`.
pub fn with_full_multiplicity(knots: &[f64], t: f64, order: usize) -> Vec<f64> {
    let missing = order.saturating_sub(multiplicity(knots, t));
    let at = knots.partition_point(|&k| k <= t);
    let mut out = Vec::with_capacity(knots.len() + missing);
    out.extend_from_slice(&knots[..at]);
    out.extend(std::iter::repeat(t).take(missing));
    out.extend_from_slice(&knots[at..]);
    out
}

/// Check that `refined` contains every knot of `coarse` with at least the
/// same multiplicity.
pub fn is_refinement(coarse: &[f64], refined: &[f64]) -> bool {
    let mut j = 0;
    for &k in coarse {
        while j < refined.len() && refined[j] < k {
            j += 1;
        }
        if j == refined.len() || refined[j] != k {
            return false;
        }
        j += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_span() {
        let knots = vec![0.0, 0.0, 0.0, 0.5, 1.0, 1.0, 1.0];
        assert_eq!(find_span(&knots, 3, 2, 0.0), 2);
        assert_eq!(find_span(&knots, 3, 2, 0.25), 2);
        assert_eq!(find_span(&knots, 3, 2, 0.5), 3);
        assert_eq!(find_span(&knots, 3, 2, 1.0), 3);
    }

    #[test]
    fn test_basis_partition_of_unity() {
        let knots = vec![0.0, 0.0, 0.0, 0.0, 0.3, 0.7, 1.0, 1.0, 1.0, 1.0];
        for i in 0..=20 {
            let t = i as f64 / 20.0;
            let span = find_span(&knots, 5, 3, t);
            let sum: f64 = basis_functions(&knots, span, 3, t).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "sum at t={} was {}", t, sum);
        }
    }

    #[test]
    fn test_basis_derivatives_match_differences() {
        let knots = vec![0.0, 0.0, 0.0, 0.0, 0.3, 0.7, 1.0, 1.0, 1.0, 1.0];
        let h = 1e-6;
        for t in [0.1, 0.45, 0.82] {
            let span = find_span(&knots, 5, 3, t);
            let ders = basis_derivatives(&knots, span, 3, t, 2);
            assert_eq!(ders.len(), 3);
            let lo = basis_functions(&knots, span, 3, t - h);
            let hi = basis_functions(&knots, span, 3, t + h);
            let mid = basis_functions(&knots, span, 3, t);
            for j in 0..=3 {
                assert!((ders[0][j] - mid[j]).abs() < 1e-12);
                let first = (hi[j] - lo[j]) / (2.0 * h);
                assert!((ders[1][j] - first).abs() < 1e-5, "t={} j={}", t, j);
                let second = (hi[j] - 2.0 * mid[j] + lo[j]) / (h * h);
                assert!((ders[2][j] - second).abs() < 1e-2, "t={} j={}", t, j);
            }
            let slope: f64 = ders[1].iter().sum();
            assert!(slope.abs() < 1e-9);
        }
    }

    #[test]
    fn test_basis_derivatives_above_degree_vanish() {
        let knots = vec![0.0, 0.0, 1.0, 1.0];
        let ders = basis_derivatives(&knots, 1, 1, 0.5, 2);
        assert_eq!(ders[0], vec![0.5, 0.5]);
        assert_eq!(ders[1], vec![-1.0, 1.0]);
        assert_eq!(ders[2], vec![0.0, 0.0]);
    }

    #[test]
    fn test_validate_rejects_bad_lengths() {
        let knots = vec![0.0, 0.0, 1.0, 1.0];
        assert!(validate_knots(&knots, 2, 1).is_ok());
        assert!(matches!(
            validate_knots(&knots, 3, 1),
            Err(NurbsError::InvalidKnotVector { expected: 5, actual: 4 })
        ));
        assert!(matches!(
            validate_knots(&[0.0, 1.0, 0.5, 1.0], 2, 1),
            Err(NurbsError::NonMonotonicKnots(2))
        ));
    }

    #[test]
    fn test_split_parameter_prefers_middle_knot() {
        let knots = vec![0.0, 0.0, 0.0, 0.25, 0.6, 1.0, 1.0, 1.0];
        assert_eq!(split_parameter(&knots, 2), 0.6);
        let bezier = vec![0.0, 0.0, 0.0, 2.0, 2.0, 2.0];
        assert_eq!(split_parameter(&bezier, 2), 1.0);
    }

    #[test]
    fn test_full_multiplicity_insertion() {
        let knots = vec![0.0, 0.0, 0.5, 1.0, 1.0];
        let out = with_full_multiplicity(&knots, 0.5, 2);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, 1.0, 1.0]);
        let out = with_full_multiplicity(&knots, 0.25, 2);
        assert_eq!(out, vec![0.0, 0.0, 0.25, 0.25, 0.5, 1.0, 1.0]);
        assert!(is_refinement(&knots, &out));
        assert!(!is_refinement(&out, &knots));
    }
}
