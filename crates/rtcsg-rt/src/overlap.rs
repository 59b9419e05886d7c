//! Overlap diagnostics shared by every ray worker.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use log::{info, warn};
use rtcsg_math::Point3;
use rtcsg_prim::LineSegment;

use crate::OverlapMode;

/// Two regions claiming the same stretch of one ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlap<'a> {
    /// Region that claimed the stretch first.
    pub first: &'a str,
    /// The other claimant.
    pub second: &'a str,
    /// Start distance.
    pub start: f64,
    /// End distance.
    pub end: f64,
    /// Point at `start`.
    pub entry: Point3,
    /// Point at `end`.
    pub exit: Point3,
}

impl Overlap<'_> {
    /// Penetration depth along the ray.
    pub fn depth(&self) -> f64 {
        self.end - self.start
    }
}

/// Aggregate for one unordered region pair.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapRecord {
    /// The pair, lexicographically ordered.
    pub regions: (String, String),
    /// Occurrences seen.
    pub count: usize,
    /// Deepest occurrence.
    pub max_depth: f64,
    /// Entry point of the first occurrence.
    pub first_entry: Point3,
}

#[derive(Debug, Default)]
struct OverlapState {
    records: Vec<OverlapRecord>,
    index: HashMap<(String, String), usize>,
    lines: Vec<LineSegment>,
}

/// Overlap records and diagnostic lines for the current frame.
#[derive(Debug, Default)]
pub struct OverlapTable {
    state: Mutex<OverlapState>,
}

impl OverlapTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, OverlapState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one overlap deeper than the tolerance.
    ///
    /// The entry-to-exit line is always kept. `LogEach` logs the overlap
    /// now; `UniquePairs` folds it into the record of its unordered pair.
    pub fn note(&self, overlap: &Overlap<'_>, mode: OverlapMode) {
        let depth = overlap.depth();
        if mode == OverlapMode::LogEach {
            warn!(
                "overlap {} {}: depth {:.4} from {} to {}",
                overlap.first, overlap.second, depth, overlap.entry, overlap.exit
            );
        }

        let mut state = self.lock();
        state
            .lines
            .push(LineSegment::new(overlap.entry, overlap.exit));
        if mode != OverlapMode::UniquePairs {
            return;
        }
        let key = if overlap.first <= overlap.second {
            (overlap.first.to_string(), overlap.second.to_string())
        } else {
            (overlap.second.to_string(), overlap.first.to_string())
        };
        let known = state.index.get(&key).copied();
        match known {
            Some(slot) => {
                let rec = &mut state.records[slot];
                rec.count += 1;
                rec.max_depth = rec.max_depth.max(depth);
            }
            None => {
                let slot = state.records.len();
                state.records.push(OverlapRecord {
                    regions: key.clone(),
                    count: 1,
                    max_depth: depth,
                    first_entry: overlap.entry,
                });
                state.index.insert(key, slot);
            }
        }
    }

    /// Number of distinct region pairs recorded.
    pub fn unique_pairs(&self) -> usize {
        self.lock().records.len()
    }

    /// Copy of the records, sorted by pair.
    pub fn records(&self) -> Vec<OverlapRecord> {
        let mut out = self.lock().records.clone();
        out.sort_by(|a, b| a.regions.cmp(&b.regions));
        out
    }

    /// Copy of the diagnostic lines.
    pub fn lines(&self) -> Vec<LineSegment> {
        self.lock().lines.clone()
    }

    /// Log a summary line per pair, then forget everything. Returns the
    /// records that were summarized.
    pub fn end_frame(&self) -> Vec<OverlapRecord> {
        let records = self.records();
        for rec in &records {
            info!(
                "overlap {} {}: {} times, max depth {:.4}, first at {}",
                rec.regions.0, rec.regions.1, rec.count, rec.max_depth, rec.first_entry
            );
        }
        *self.lock() = OverlapState::default();
        records
    }
}
