#![warn(missing_docs)]

//! Geometry store, combination trees and the transform push.
//!
//! # Architecture
//!
//! - [`DbObject`] - a stored solid or combination
//! - [`GeometryStore`] - named object storage; [`MemoryStore`] keeps it in
//!   process and snapshots it as JSON
//! - [`walk`] - depth-first walk accumulating reference matrices
//! - [`push`] - move reference matrices down into the leaf solids

mod object;
mod push;
mod store;
mod walk;

pub use object::{BoolOp, ChildRef, CombTree, Combination, DbObject, RegionAttrs};
pub use push::{
    commit, plan_push, push, PushError, PushOptions, PushPlan, PushReport, ReferenceUpdate,
};
pub use store::{GeometryStore, MemoryStore, ObjectHandle, StoreError};
pub use walk::{walk, LeafKind, LeafVisit, WalkError, WalkOptions, MAX_TREE_DEPTH};
