//! Error types for importing and preparing primitives.

use rtcsg_nurbs::NurbsError;
use thiserror::Error;

use crate::PrimitiveKind;

/// Errors raised while turning a record into an internal representation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    /// The record's type does not match the importer.
    #[error("bad record type: expected {expected}, found {found}")]
    BadRecordType {
        /// Kind the importer handles.
        expected: PrimitiveKind,
        /// Kind of the record.
        found: PrimitiveKind,
    },

    /// No importer is registered for the kind.
    #[error("no importer registered for {0}")]
    Unregistered(PrimitiveKind),

    /// A radius is negative, or every radius is zero.
    #[error("negative radius: {what} = {value}")]
    NegativeRadius {
        /// Which radius.
        what: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A torus tube wider than its ring.
    #[error("minor radius {minor} exceeds major radius {major}")]
    MinorExceedsMajor {
        /// Tube radius.
        minor: f64,
        /// Ring radius.
        major: f64,
    },

    /// An axis vector is zero-length or dependent on the others.
    #[error("degenerate axis: {0}")]
    DegenerateAxis(String),

    /// The placement matrix cannot be inverted.
    #[error("singular construction matrix")]
    SingularConstructionMatrix,

    /// The primitive cannot follow a non-uniform scale.
    #[error("{0} requires a uniform scale")]
    NonUniformScale(PrimitiveKind),

    /// A parameter is NaN or infinite.
    #[error("non-finite parameter in {0} record")]
    NonFinite(PrimitiveKind),

    /// Free-form geometry failed validation.
    #[error("invalid spline: {0}")]
    InvalidSpline(#[from] NurbsError),
}

impl ImportError {
    /// Create a degenerate-axis error.
    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::DegenerateAxis(message.into())
    }
}

/// Errors raised while preparing an internal representation for shooting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrepError {
    /// The shape has no interior.
    #[error("degenerate geometry: {0}")]
    Degenerate(String),

    /// A B-rep with no usable faces.
    #[error("B-rep has no faces")]
    EmptyBrep,

    /// Free-form subdivision failed.
    #[error("subdivision failed: {0}")]
    Subdivision(#[from] NurbsError),
}

impl PrepError {
    /// Create a degenerate-geometry error.
    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::Degenerate(message.into())
    }
}
