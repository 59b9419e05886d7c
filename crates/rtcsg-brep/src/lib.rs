#![warn(missing_docs)]

//! Trimmed free-form (B-rep) primitive.
//!
//! Each face is a B-spline surface with optional trim loops in its
//! parameter plane. `prep` builds a [`tree::SurfaceTree`] per face and a
//! [`bvh::SceneBvh`] over the faces; `shot` descends both, runs a Newton
//! root find per surviving leaf and pairs the trimmed roots into segments
//! by the sign of `normal . direction`.
//!
//! ```ignore
//! let mut table = PrimitiveTable::builtin();
//! rtcsg_brep::register(&mut table);
//! let prim = table.import(&record, &xform)?.prep(&PrepOptions::default())?;
//! ```

pub mod bvh;
pub mod newton;
pub mod tree;
pub mod trim;

mod solid;

pub use solid::{import, register, BrepInternal, BrepPrimitive};
