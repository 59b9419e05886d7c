//! Transform push: move the matrices on combination references down to
//! the leaves.
//!
//! Phase 1 ([`plan_push`]) only reads. It walks every selected tree,
//! accumulating matrices, and records each leaf's matrix in a shared
//! table; a leaf reached under two different matrices is a conflict.
//! Phase 2 ([`commit`]) runs only on a conflict-free plan. It computes every
//! rewritten object first and writes them afterwards, so a failure leaves
//! the store untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use log::{debug, info, warn};
use rayon::prelude::*;
use rtcsg_math::{Tolerance, Transform};
use rtcsg_prim::{ImportError, PrimitiveTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::walk::{walk, LeafKind, LeafVisit, WalkError, WalkOptions};
use crate::{DbObject, GeometryStore, ObjectHandle, StoreError};

/// Errors that abort a push. Nothing is written when one is returned.
#[derive(Error, Debug)]
pub enum PushError {
    /// Some leaves are reached under different matrices.
    #[error("conflicting transforms for {}", .leaves.join(", "))]
    Conflict {
        /// Names of the conflicting leaves, sorted.
        leaves: Vec<String>,
    },

    /// Re-importing a leaf under its new matrix failed.
    #[error("re-import failed: {0}")]
    Import(#[from] ImportError),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A tree could not be walked.
    #[error(transparent)]
    Walk(#[from] WalkError),
}

/// Push settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushOptions {
    /// Treat regions as leaves; their matrix stays on the reference.
    pub stop_at_regions: bool,
    /// Never rewrite solid geometry; the matrix stays on the reference.
    pub stop_at_solids: bool,
    /// Objects at this depth are leaves whose matrix stays on the reference.
    pub max_depth: Option<usize>,
    /// Do not bake leaves that other trees also reference.
    pub local_only: bool,
    /// Plan only.
    pub dry_run: bool,
    /// Walker threads; 0 or 1 walks the roots one after another.
    pub workers: usize,
    /// Matrix equality tolerance.
    pub tolerance: Tolerance,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            stop_at_regions: false,
            stop_at_solids: false,
            max_depth: None,
            local_only: false,
            dry_run: false,
            workers: 1,
            tolerance: Tolerance::RAYTRACE,
        }
    }
}

/// A reference whose matrix survives the push.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceUpdate {
    /// Combination holding the reference.
    pub parent: String,
    /// Position among the parent's children.
    pub index: usize,
    /// Matrix left on the reference.
    pub matrix: Transform,
}

/// Outcome of phase 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushPlan {
    /// Solids to rewrite, with the matrix to bake in. Sorted by name.
    pub bake: Vec<(String, Transform)>,
    /// References that keep a matrix. Sorted by parent, then index.
    pub references: Vec<ReferenceUpdate>,
    /// Combinations whose references are reset. Sorted.
    pub combinations: Vec<String>,
    /// Leaves reached under different matrices. Sorted.
    pub conflicts: Vec<String>,
}

impl PushPlan {
    /// Whether phase 2 may run.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// What a push did.
#[derive(Debug, Clone, PartialEq)]
pub struct PushReport {
    /// The plan that was executed (or only computed, on a dry run).
    pub plan: PushPlan,
    /// Objects written.
    pub written: usize,
    /// Whether phase 2 was skipped on request.
    pub dry_run: bool,
}

/// One reference to a leaf.
#[derive(Debug, Clone)]
struct Occurrence {
    parent: String,
    index: usize,
}

/// Distinct accumulated matrix seen for a leaf, and where.
#[derive(Debug, Clone)]
struct Variant {
    matrix: Transform,
    occurrences: Vec<Occurrence>,
}

#[derive(Debug, Clone)]
struct LeafEntry {
    name: String,
    /// The matrix stays on the reference instead of being baked.
    keep_on_reference: bool,
    variants: Vec<Variant>,
}

/// Leaf table shared by the walkers: an arena plus a name index.
#[derive(Debug, Default)]
struct LeafTable {
    arena: Vec<LeafEntry>,
    index: HashMap<String, usize>,
}

impl LeafTable {
    fn insert(&mut self, leaf: &LeafVisit<'_>, parent: &str, keep: bool, tol: &Tolerance) {
        let occurrence = Occurrence {
            parent: parent.to_string(),
            index: leaf.index,
        };
        let slot = match self.index.get(leaf.name) {
            Some(&slot) => slot,
            None => {
                self.arena.push(LeafEntry {
                    name: leaf.name.to_string(),
                    keep_on_reference: keep,
                    variants: Vec::new(),
                });
                self.index.insert(leaf.name.to_string(), self.arena.len() - 1);
                self.arena.len() - 1
            }
        };
        let entry = &mut self.arena[slot];
        entry.keep_on_reference |= keep;
        match entry
            .variants
            .iter_mut()
            .find(|v| v.matrix.approx_eq(leaf.matrix, tol))
        {
            Some(v) => v.occurrences.push(occurrence),
            None => entry.variants.push(Variant {
                matrix: leaf.matrix.clone(),
                occurrences: vec![occurrence],
            }),
        }
    }
}

/// Phase 1: walk `roots` and work out what a push would change.
pub fn plan_push<S: GeometryStore + Sync + ?Sized>(
    store: &S,
    roots: &[&str],
    opts: &PushOptions,
) -> Result<PushPlan, PushError> {
    let table = Mutex::new(LeafTable::default());
    let walk_opts = WalkOptions {
        max_depth: opts.max_depth,
        stop_at_regions: opts.stop_at_regions,
    };

    let walk_root = |root: &&str| -> Result<Vec<String>, WalkError> {
        walk(store, root, &walk_opts, &mut |leaf| {
            let Some(parent) = leaf.parent else {
                // the root itself carries no reference matrix
                return;
            };
            let keep = match leaf.kind {
                LeafKind::Solid => opts.stop_at_solids,
                LeafKind::Region | LeafKind::DepthLimit => true,
            };
            let mut table = table.lock().unwrap_or_else(|e| e.into_inner());
            table.insert(leaf, parent, keep, &opts.tolerance);
        })
    };

    let walked: Vec<Vec<String>> = if opts.workers > 1 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(opts.workers)
            .build()
        {
            Ok(pool) => pool.install(|| {
                roots
                    .par_iter()
                    .map(walk_root)
                    .collect::<Result<Vec<_>, WalkError>>()
            })?,
            Err(e) => {
                warn!("push walker pool unavailable ({e}); walking sequentially");
                roots
                    .iter()
                    .map(walk_root)
                    .collect::<Result<Vec<_>, WalkError>>()?
            }
        }
    } else {
        roots
            .iter()
            .map(walk_root)
            .collect::<Result<Vec<_>, WalkError>>()?
    };

    let mut combinations: Vec<String> = walked.into_iter().flatten().collect();
    combinations.sort();
    combinations.dedup();

    let outside = if opts.local_only {
        outside_references(store, &combinations)?
    } else {
        HashSet::new()
    };

    let table = table.into_inner().unwrap_or_else(|e| e.into_inner());
    let mut plan = PushPlan {
        combinations,
        ..PushPlan::default()
    };
    for entry in table.arena {
        let shared = outside.contains(&entry.name);
        if shared && !entry.keep_on_reference {
            debug!("{} is referenced outside the pushed trees; not baked", entry.name);
        }
        if entry.keep_on_reference || shared {
            resolve_references(entry, &mut plan);
        } else if entry.variants.len() > 1 {
            plan.conflicts.push(entry.name);
        } else if let Some(variant) = entry.variants.into_iter().next() {
            plan.bake.push((entry.name, variant.matrix));
        }
    }
    plan.bake.sort_by(|a, b| a.0.cmp(&b.0));
    plan.references
        .sort_by(|a, b| a.parent.cmp(&b.parent).then(a.index.cmp(&b.index)));
    plan.conflicts.sort();
    plan.conflicts.dedup();
    Ok(plan)
}

/// Kept matrices live on individual references, so only two different
/// matrices for the same reference conflict.
fn resolve_references(entry: LeafEntry, plan: &mut PushPlan) {
    let mut seen: HashMap<(String, usize), usize> = HashMap::new();
    let mut conflict = false;
    for (vi, variant) in entry.variants.iter().enumerate() {
        for occ in &variant.occurrences {
            match seen.get(&(occ.parent.clone(), occ.index)) {
                Some(&other) if other != vi => conflict = true,
                Some(_) => {}
                None => {
                    seen.insert((occ.parent.clone(), occ.index), vi);
                    plan.references.push(ReferenceUpdate {
                        parent: occ.parent.clone(),
                        index: occ.index,
                        matrix: variant.matrix.clone(),
                    });
                }
            }
        }
    }
    if conflict {
        plan.conflicts.push(entry.name);
    }
}

/// Names referenced from combinations the push does not visit.
fn outside_references<S: GeometryStore + ?Sized>(
    store: &S,
    visited: &[String],
) -> Result<HashSet<String>, StoreError> {
    let mut out = HashSet::new();
    for name in store.names() {
        if visited.binary_search(&name).is_ok() {
            continue;
        }
        if let (_, DbObject::Comb(comb)) = store.read_named(&name)? {
            out.extend(comb.children().into_iter().map(|c| c.name));
        }
    }
    Ok(out)
}

/// Phase 2: rewrite the store as `plan` describes.
///
/// Returns the number of objects written.
pub fn commit<S: GeometryStore + ?Sized>(
    store: &mut S,
    table: &PrimitiveTable,
    plan: &PushPlan,
    tol: &Tolerance,
) -> Result<usize, PushError> {
    if !plan.is_clean() {
        return Err(PushError::Conflict {
            leaves: plan.conflicts.clone(),
        });
    }

    let mut staged: Vec<(ObjectHandle, DbObject)> = Vec::new();
    for (name, matrix) in &plan.bake {
        if matrix.is_identity(tol) {
            continue;
        }
        let (handle, object) = store.read_named(name)?;
        let DbObject::Solid(record) = object else {
            continue;
        };
        let baked = table.import(&record, matrix)?.export();
        staged.push((handle, DbObject::Solid(baked)));
    }

    let kept: HashMap<(&str, usize), &Transform> = plan
        .references
        .iter()
        .map(|r| ((r.parent.as_str(), r.index), &r.matrix))
        .collect();
    for name in &plan.combinations {
        let (handle, object) = store.read_named(name)?;
        let DbObject::Comb(mut comb) = object else {
            continue;
        };
        let mut index = 0;
        comb.tree.for_each_leaf_mut(&mut |_, matrix| {
            *matrix = kept
                .get(&(name.as_str(), index))
                .filter(|m| !m.is_identity(tol))
                .map(|m| (*m).clone());
            index += 1;
        });
        staged.push((handle, DbObject::Comb(comb)));
    }

    let written = staged.len();
    for (handle, object) in staged {
        store.write_record(handle, object)?;
    }
    Ok(written)
}

/// Plan and, when the plan is clean and this is not a dry run, commit.
pub fn push<S: GeometryStore + Sync + ?Sized>(
    store: &mut S,
    table: &PrimitiveTable,
    roots: &[&str],
    opts: &PushOptions,
) -> Result<PushReport, PushError> {
    let plan = plan_push(&*store, roots, opts)?;
    if !plan.is_clean() {
        warn!("push aborted: conflicting transforms for {}", plan.conflicts.join(", "));
        return Err(PushError::Conflict {
            leaves: plan.conflicts,
        });
    }
    if opts.dry_run {
        info!(
            "push dry run: {} solids to bake, {} references kept",
            plan.bake.len(),
            plan.references.len()
        );
        return Ok(PushReport {
            plan,
            written: 0,
            dry_run: true,
        });
    }
    let written = commit(store, table, &plan, &opts.tolerance)?;
    info!("push wrote {written} objects");
    Ok(PushReport {
        plan,
        written,
        dry_run: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CombTree, Combination, MemoryStore};
    use rtcsg_math::Point3;
    use rtcsg_prim::GeometryRecord;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn solid(store: &MemoryStore, name: &str) -> GeometryRecord {
        match store.get(name) {
            Some(DbObject::Solid(rec)) => rec.clone(),
            other => panic!("{name} is not a solid: {other:?}"),
        }
    }

    fn comb(store: &MemoryStore, name: &str) -> Combination {
        match store.get(name) {
            Some(DbObject::Comb(c)) => c.clone(),
            other => panic!("{name} is not a combination: {other:?}"),
        }
    }

    fn center(rec: &GeometryRecord) -> Point3 {
        match rec {
            GeometryRecord::Ell { center, .. } => *center,
            other => panic!("not an ellipsoid: {other:?}"),
        }
    }

    /// all = ball.r @ T(0,0,2); ball.r = ball @ T(5,0,0) ∪ box
    fn scene() -> MemoryStore {
        let mut s = MemoryStore::new();
        s.insert(
            "ball",
            DbObject::Solid(GeometryRecord::sphere(Point3::origin(), 1.0)),
        );
        s.insert(
            "box",
            DbObject::Solid(GeometryRecord::rpp(
                Point3::origin(),
                Point3::new(1.0, 1.0, 1.0),
            )),
        );
        s.insert(
            "ball.r",
            DbObject::Comb(Combination::region(
                1,
                CombTree::union(
                    CombTree::placed("ball", Transform::translation(5.0, 0.0, 0.0)),
                    CombTree::leaf("box"),
                ),
            )),
        );
        s.insert(
            "all",
            DbObject::Comb(Combination::new(CombTree::placed(
                "ball.r",
                Transform::translation(0.0, 0.0, 2.0),
            ))),
        );
        s
    }

    #[test]
    fn test_push_bakes_leaves() {
        init();
        let mut s = scene();
        let report = push(
            &mut s,
            &PrimitiveTable::builtin(),
            &["all"],
            &PushOptions::default(),
        )
        .unwrap();
        assert_eq!(report.plan.combinations, vec!["all", "ball.r"]);
        assert_eq!(report.written, 4);
        assert_eq!(center(&solid(&s, "ball")), Point3::new(5.0, 0.0, 2.0));
        match solid(&s, "box") {
            GeometryRecord::Arb8 { points } => assert_eq!(points[0], Point3::new(0.0, 0.0, 2.0)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(comb(&s, "all").children().iter().all(|c| c.matrix.is_none()));
        assert!(comb(&s, "ball.r").children().iter().all(|c| c.matrix.is_none()));
    }

    #[test]
    fn test_push_is_idempotent() {
        let mut s = scene();
        let table = PrimitiveTable::builtin();
        push(&mut s, &table, &["all"], &PushOptions::default()).unwrap();
        let once = s.to_json().unwrap();
        push(&mut s, &table, &["all"], &PushOptions::default()).unwrap();
        assert_eq!(s.to_json().unwrap(), once);
    }

    #[test]
    fn test_conflict_leaves_store_unmodified() {
        let mut s = scene();
        s.insert(
            "twice",
            DbObject::Comb(Combination::new(CombTree::union(
                CombTree::placed("ball", Transform::translation(1.0, 0.0, 0.0)),
                CombTree::placed("ball", Transform::translation(2.0, 0.0, 0.0)),
            ))),
        );
        let before = s.to_json().unwrap();
        let err = push(
            &mut s,
            &PrimitiveTable::builtin(),
            &["all", "twice"],
            &PushOptions::default(),
        )
        .unwrap_err();
        match err {
            PushError::Conflict { leaves } => assert_eq!(leaves, vec!["ball"]),
            other => panic!("unexpected {other}"),
        }
        assert_eq!(s.to_json().unwrap(), before);
    }

    #[test]
    fn test_equal_matrices_deduplicate() {
        let mut s = scene();
        s.insert(
            "pair",
            DbObject::Comb(Combination::new(CombTree::union(
                CombTree::placed("ball", Transform::translation(1.0, 0.0, 0.0)),
                CombTree::placed("ball", Transform::translation(1.0 + 1e-7, 0.0, 0.0)),
            ))),
        );
        let plan = plan_push(&s, &["pair"], &PushOptions::default()).unwrap();
        assert!(plan.is_clean());
        assert_eq!(plan.bake.len(), 1);
    }

    #[test]
    fn test_import_failure_writes_nothing() {
        let mut s = scene();
        s.insert(
            "pill",
            DbObject::Solid(GeometryRecord::particle(
                Point3::origin(),
                rtcsg_math::Vec3::z(),
                0.5,
                0.5,
            )),
        );
        s.insert(
            "squashed",
            DbObject::Comb(Combination::new(CombTree::union(
                CombTree::placed("ball", Transform::translation(1.0, 0.0, 0.0)),
                CombTree::placed("pill", Transform::scale(1.0, 2.0, 1.0)),
            ))),
        );
        let before = s.to_json().unwrap();
        let err = push(
            &mut s,
            &PrimitiveTable::builtin(),
            &["squashed"],
            &PushOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PushError::Import(ImportError::NonUniformScale(_))));
        assert_eq!(s.to_json().unwrap(), before);
    }

    #[test]
    fn test_stop_at_regions_keeps_matrix_on_reference() {
        let mut s = scene();
        let opts = PushOptions {
            stop_at_regions: true,
            ..PushOptions::default()
        };
        let before_ball = solid(&s, "ball");
        push(&mut s, &PrimitiveTable::builtin(), &["all"], &opts).unwrap();
        assert_eq!(solid(&s, "ball"), before_ball);
        let kids = comb(&s, "all").children();
        assert_eq!(kids[0].matrix, Some(Transform::translation(0.0, 0.0, 2.0)));
        // the region was not expanded, so its own matrix is untouched
        assert!(comb(&s, "ball.r").children()[0].matrix.is_some());
    }

    #[test]
    fn test_stop_at_solids_moves_matrix_to_final_reference() {
        let mut s = scene();
        let opts = PushOptions {
            stop_at_solids: true,
            ..PushOptions::default()
        };
        let before_ball = solid(&s, "ball");
        push(&mut s, &PrimitiveTable::builtin(), &["all"], &opts).unwrap();
        assert_eq!(solid(&s, "ball"), before_ball);
        assert!(comb(&s, "all").children()[0].matrix.is_none());
        let kids = comb(&s, "ball.r").children();
        let m = kids[0].matrix.clone().unwrap();
        assert!(m.approx_eq(&Transform::translation(5.0, 0.0, 2.0), &Tolerance::DEFAULT));
        assert_eq!(kids[1].matrix, Some(Transform::translation(0.0, 0.0, 2.0)));
    }

    #[test]
    fn test_depth_limit() {
        let mut s = scene();
        let opts = PushOptions {
            max_depth: Some(2),
            ..PushOptions::default()
        };
        let before_ball = solid(&s, "ball");
        push(&mut s, &PrimitiveTable::builtin(), &["all"], &opts).unwrap();
        assert_eq!(solid(&s, "ball"), before_ball);
        assert!(comb(&s, "all").children()[0].matrix.is_none());
        assert!(comb(&s, "ball.r")
            .children()
            .iter()
            .all(|c| c.matrix.is_some()));
    }

    #[test]
    fn test_local_only_skips_shared_leaves() {
        let mut s = scene();
        s.insert(
            "elsewhere",
            DbObject::Comb(Combination::new(CombTree::leaf("box"))),
        );
        let before_box = solid(&s, "box");
        let opts = PushOptions {
            local_only: true,
            ..PushOptions::default()
        };
        push(&mut s, &PrimitiveTable::builtin(), &["all"], &opts).unwrap();
        assert_eq!(solid(&s, "box"), before_box);
        assert_eq!(center(&solid(&s, "ball")), Point3::new(5.0, 0.0, 2.0));
        let kids = comb(&s, "ball.r").children();
        assert!(kids[0].matrix.is_none());
        assert_eq!(kids[1].matrix, Some(Transform::translation(0.0, 0.0, 2.0)));
    }

    #[test]
    fn test_dry_run_and_parallel_walkers_agree() {
        let mut s = scene();
        s.insert(
            "other",
            DbObject::Comb(Combination::new(CombTree::placed(
                "box",
                Transform::translation(0.0, 0.0, 2.0),
            ))),
        );
        let sequential = plan_push(&s, &["all", "other"], &PushOptions::default()).unwrap();
        let parallel = plan_push(
            &s,
            &["all", "other"],
            &PushOptions {
                workers: 4,
                ..PushOptions::default()
            },
        )
        .unwrap();
        assert_eq!(sequential, parallel);

        let before = s.to_json().unwrap();
        let report = push(
            &mut s,
            &PrimitiveTable::builtin(),
            &["all", "other"],
            &PushOptions {
                dry_run: true,
                ..PushOptions::default()
            },
        )
        .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.written, 0);
        assert_eq!(report.plan, sequential);
        assert_eq!(s.to_json().unwrap(), before);
    }
}
