#![warn(missing_docs)]

//! B-spline evaluation, refinement and splitting for the rtcsg core.
//!
//! Free-form primitives are subdivided by splitting their surfaces
//! repeatedly; every split is an exact knot refinement, so the children
//! reproduce the parent.
//!
//! # Key types
//!
//! - [`BSplineCurve`]: B-spline curve, optionally rational (also used for
//!   trim curves in parameter space)
//! - [`BSplineSurface`]: tensor-product B-spline surface, optionally rational
//! - [`SurfaceDerivatives`]: point and partials up to second order
//! - [`OsloMatrix`]: sparse knot-refinement matrix
//!
//! # Algorithms
//!
//! - **De Boor's algorithm** for stable evaluation
//! - **Boehm's algorithm** for single knot insertion
//! - **Oslo algorithm** for general refinement and splitting, applied to
//!   homogeneous `(w * P, w)` coordinates for rational splines
//! - **Global interpolation** with chord-length parameters

mod curve;
mod error;
pub mod interp;
pub mod knots;
mod oslo;
mod surface;

pub use curve::{clamped_uniform_knots, BSplineCurve};
pub use error::NurbsError;
pub use interp::interpolate_curve;
pub use oslo::{OsloMatrix, OsloRow};
pub use surface::{BSplineSurface, ParamDir, SurfaceDerivatives};
