//! Per-session state passed to every scene and ray call.

use log::warn;
use rtcsg_prim::PrimitiveTable;

use crate::{OverlapTable, RtConfig};

/// Configuration, primitive registry, overlap table and worker pool of
/// one ray tracing session.
#[derive(Debug)]
pub struct SceneContext {
    config: RtConfig,
    table: PrimitiveTable,
    overlaps: OverlapTable,
    pool: Option<rayon::ThreadPool>,
}

impl SceneContext {
    /// Session with every built-in primitive, the free-form one included.
    pub fn new(config: RtConfig) -> Self {
        let mut table = PrimitiveTable::builtin();
        rtcsg_brep::register(&mut table);
        Self::with_table(config, table)
    }

    /// Session with a caller-supplied primitive registry.
    pub fn with_table(config: RtConfig, table: PrimitiveTable) -> Self {
        let pool = match config.workers {
            0 => None,
            n => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("could not build a {n}-thread pool ({e}); using the global pool");
                    None
                }
            },
        };
        Self {
            config,
            table,
            overlaps: OverlapTable::new(),
            pool,
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &RtConfig {
        &self.config
    }

    /// Primitive registry.
    pub fn table(&self) -> &PrimitiveTable {
        &self.table
    }

    /// Overlaps seen in the current frame.
    pub fn overlaps(&self) -> &OverlapTable {
        &self.overlaps
    }

    /// Dedicated ray pool; `None` runs on rayon's global pool.
    pub fn pool(&self) -> Option<&rayon::ThreadPool> {
        self.pool.as_ref()
    }
}

impl Default for SceneContext {
    fn default() -> Self {
        Self::new(RtConfig::default())
    }
}
