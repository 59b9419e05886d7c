#![warn(missing_docs)]

//! Primitive intersection protocol and analytic primitives for the rtcsg
//! ray-tracing core.
//!
//! # Architecture
//!
//! - [`GeometryRecord`] - serialized form of every primitive
//! - [`SolidInternal`] - imported, placed solid; plots, tessellates, exports
//! - [`Primitive`] - prepared solid answering `shot`, `norm`, `curvature`, `uv`
//! - [`PrimitiveTable`] - kind-to-importer registry
//!
//! # Example
//!
//! ```ignore
//! use rtcsg_prim::{GeometryRecord, PrepOptions, PrimitiveTable, Ray};
//!
//! let table = PrimitiveTable::builtin();
//! let rec = GeometryRecord::sphere(Point3::origin(), 1.0);
//! let prim = table.import(&rec, &Transform::identity())?.prep(&PrepOptions::default())?;
//! let segs = prim.shot(&Ray::new(Point3::new(-5.0, 0.0, 0.0), Vec3::x()));
//! ```

mod error;
mod hit;
mod protocol;
mod ray;
mod record;
mod table;

pub mod arb8;
pub mod cone;
pub mod ell;
pub mod part;
pub mod plot;
pub mod tor;

pub use error::{ImportError, PrepError};
pub use hit::{BoundingSphere, Curvature, Hit, Segment, SurfacePoint};
pub use plot::{LineSegment, PlotTolerances, TriangleMesh};
pub use protocol::{
    vshot, ParticlePolicy, PrepOptions, Primitive, SolidInternal, SubdivisionPolicy,
};
pub use ray::Ray;
pub use record::{BrepRecord, FaceRecord, GeometryRecord, LoopOrientation, PrimitiveKind, TrimLoop};
pub use table::{check_transform, ImportEntry, ImportFn, PrimitiveTable};
