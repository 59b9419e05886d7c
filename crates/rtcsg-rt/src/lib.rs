#![warn(missing_docs)]

//! Boolean partition evaluation and overlap resolution.
//!
//! A [`SceneContext`] carries the session configuration, the primitive
//! registry and the overlap table. [`Scene::prepare`] turns regions from a
//! geometry store into boolean expressions over prepared solids, and
//! [`shoot_ray`] / [`shoot_rays`] evaluate them along rays.
//!
//! ```ignore
//! let ctx = SceneContext::new(RtConfig::default());
//! let scene = Scene::prepare(&ctx, &store, &["all"])?;
//! let outcome = shoot_ray(&ctx, &scene, &ray, &mut NullHandler);
//! ```

mod config;
mod context;
mod error;
mod interval;
mod overlap;
mod scene;
mod shoot;
mod solids;

pub use config::{OverlapMode, RtConfig};
pub use context::SceneContext;
pub use error::RtError;
pub use interval::{Boundary, IntervalSet, Span};
pub use overlap::{Overlap, OverlapRecord, OverlapTable};
pub use scene::{Region, RegionExpr, RegionId, Scene};
pub use shoot::{
    shoot_ray, shoot_ray_with, shoot_rays, NullHandler, Partition, RayHandler, RayOutcome,
    Resource,
};
pub use solids::{Excluded, Solid, SolidKey, SolidTable};
