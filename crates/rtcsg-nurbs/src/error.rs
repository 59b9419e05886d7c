//! Error types for spline construction, refinement and splitting.

use thiserror::Error;

/// Errors raised by spline constructors and refinement operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NurbsError {
    /// Knot vector length does not equal `control points + degree + 1`.
    #[error("invalid knot vector: len={actual} but expected {expected}")]
    InvalidKnotVector {
        /// Required length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Knot vector decreases somewhere.
    #[error("knot vector is not non-decreasing at index {0}")]
    NonMonotonicKnots(usize),

    /// Control grid size does not match `n_u * n_v`.
    #[error("control grid has {actual} points, expected {n_u} x {n_v}")]
    ControlGridMismatch {
        /// Points in u.
        n_u: usize,
        /// Points in v.
        n_v: usize,
        /// Points supplied.
        actual: usize,
    },

    /// A rational spline has a different number of weights than points.
    #[error("{actual} weights for {expected} control points")]
    WeightCountMismatch {
        /// Control point count.
        expected: usize,
        /// Weights supplied.
        actual: usize,
    },

    /// A weight is zero, negative or not finite.
    #[error("weight {0} is not positive")]
    NonPositiveWeight(usize),

    /// Parameter lies outside the open parameter domain.
    #[error("parameter {t} outside domain ({min}, {max})")]
    ParameterOutsideDomain {
        /// Requested parameter.
        t: f64,
        /// Domain start.
        min: f64,
        /// Domain end.
        max: f64,
    },

    /// The target knot vector does not contain the source knot vector.
    #[error("target knot vector is not a refinement of the source")]
    NotARefinement,

    /// Too few data points for the requested degree.
    #[error("need at least {needed} points, got {got}")]
    TooFewPoints {
        /// Minimum count.
        needed: usize,
        /// Supplied count.
        got: usize,
    },

    /// A refinement or interpolation system has no unique solution.
    #[error("singular refinement system: {0}")]
    SingularRefinementSystem(String),
}

impl NurbsError {
    /// Create a singular-system error.
    pub fn singular(message: impl Into<String>) -> Self {
        Self::SingularRefinementSystem(message.into())
    }
}
