//! Depth-first walks over combination trees.

use std::collections::HashSet;

use rtcsg_math::Transform;
use thiserror::Error;

use crate::{DbObject, GeometryStore, StoreError};

/// Deepest nesting followed before a walk gives up.
pub const MAX_TREE_DEPTH: usize = 256;

/// Errors raised while walking a tree.
#[derive(Error, Debug)]
pub enum WalkError {
    /// A referenced object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Nesting exceeds [`MAX_TREE_DEPTH`], usually a reference cycle.
    #[error("tree below {root} is deeper than {limit} levels")]
    TooDeep {
        /// Where the walk started.
        root: String,
        /// The limit that was hit.
        limit: usize,
    },

    /// The store failed.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for WalkError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(name) => WalkError::NotFound(name),
            other => WalkError::Store(other),
        }
    }
}

/// Why the walk stopped at an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// A solid.
    Solid,
    /// A region, with `stop_at_regions` set.
    Region,
    /// Any object at the depth limit.
    DepthLimit,
}

/// One leaf reached by a walk.
#[derive(Debug)]
pub struct LeafVisit<'a> {
    /// Object name.
    pub name: &'a str,
    /// Combination holding the reference; `None` for the root itself.
    pub parent: Option<&'a str>,
    /// Position of the reference among the parent's children.
    pub index: usize,
    /// Nesting depth; the root is 0.
    pub depth: usize,
    /// Product of every matrix from the root down to and including this
    /// reference.
    pub matrix: &'a Transform,
    /// Why this is a leaf.
    pub kind: LeafKind,
    /// The stored object.
    pub object: &'a DbObject,
}

/// Where a walk stops descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkOptions {
    /// Objects at this depth are leaves.
    pub max_depth: Option<usize>,
    /// Regions below the root are leaves.
    pub stop_at_regions: bool,
}

/// Walk the tree under `root`, calling `visit` on every leaf.
///
/// Returns the combinations that were expanded, in first-visit order.
pub fn walk<S: GeometryStore + ?Sized>(
    store: &S,
    root: &str,
    opts: &WalkOptions,
    visit: &mut dyn FnMut(&LeafVisit<'_>),
) -> Result<Vec<String>, WalkError> {
    let mut walker = Walker {
        store,
        root,
        opts,
        visit,
        expanded: Vec::new(),
        seen: HashSet::new(),
    };
    walker.descend(root, None, 0, 0, &Transform::identity())?;
    Ok(walker.expanded)
}

struct Walker<'w, 'v, S: ?Sized> {
    store: &'w S,
    root: &'w str,
    opts: &'w WalkOptions,
    visit: &'v mut dyn FnMut(&LeafVisit<'_>),
    expanded: Vec<String>,
    seen: HashSet<String>,
}

impl<S: GeometryStore + ?Sized> Walker<'_, '_, S> {
    fn descend(
        &mut self,
        name: &str,
        parent: Option<&str>,
        index: usize,
        depth: usize,
        matrix: &Transform,
    ) -> Result<(), WalkError> {
        if depth > MAX_TREE_DEPTH {
            return Err(WalkError::TooDeep {
                root: self.root.to_string(),
                limit: MAX_TREE_DEPTH,
            });
        }
        let (_, object) = self.store.read_named(name)?;
        let at_limit = depth > 0 && self.opts.max_depth.is_some_and(|max| depth >= max);

        let kind = match &object {
            _ if at_limit => Some(LeafKind::DepthLimit),
            DbObject::Solid(_) => Some(LeafKind::Solid),
            DbObject::Comb(c) if depth > 0 && self.opts.stop_at_regions && c.is_region() => {
                Some(LeafKind::Region)
            }
            DbObject::Comb(_) => None,
        };
        if let Some(kind) = kind {
            (self.visit)(&LeafVisit {
                name,
                parent,
                index,
                depth,
                matrix,
                kind,
                object: &object,
            });
            return Ok(());
        }

        let DbObject::Comb(comb) = &object else {
            return Ok(());
        };
        if self.seen.insert(name.to_string()) {
            self.expanded.push(name.to_string());
        }
        for (i, child) in comb.children().iter().enumerate() {
            let acc = match &child.matrix {
                Some(m) => matrix.then(m),
                None => matrix.clone(),
            };
            self.descend(&child.name, Some(name), i, depth + 1, &acc)?;
        }
        Ok(())
    }
}
