//! rtcsg: the geometric core of a CSG ray tracer.
//!
//! Re-exports the workspace crates and adds a [`Session`] that ties a
//! geometry store to a ray tracing context, with name-based entry points.
//!
//! # Example
//!
//! ```rust,no_run
//! use rtcsg::{Ray, Session, NullHandler};
//! use rtcsg::math::{Point3, Vec3};
//!
//! let session = Session::open("scene.json".as_ref(), None)?;
//! let scene = session.prepare(&["all"])?;
//! let ray = Ray::new(Point3::new(-10.0, 0.0, 0.0), Vec3::x());
//! let outcome = session.shoot(&scene, &ray, &mut NullHandler);
//! println!("{} partitions", outcome.partitions().len());
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;

pub use rtcsg_brep as brep;
pub use rtcsg_db as db;
pub use rtcsg_math as math;
pub use rtcsg_nurbs as nurbs;
pub use rtcsg_prim as prim;
pub use rtcsg_rt as rt;

pub use rtcsg_db::{
    CombTree, Combination, DbObject, GeometryStore, MemoryStore, PushOptions, PushReport,
};
pub use rtcsg_prim::{
    GeometryRecord, LineSegment, PlotTolerances, Ray, SolidInternal, TriangleMesh,
};
pub use rtcsg_rt::{
    NullHandler, OverlapMode, Partition, RayHandler, RayOutcome, RtConfig, Scene, SceneContext,
};

use rtcsg_db::{walk, WalkOptions};
use rtcsg_math::Transform;

/// A geometry store plus the ray tracing context that reads it.
#[derive(Debug)]
pub struct Session {
    store: MemoryStore,
    ctx: SceneContext,
}

impl Session {
    /// Session over an existing store.
    pub fn new(store: MemoryStore, config: RtConfig) -> Self {
        Self {
            store,
            ctx: SceneContext::new(config),
        }
    }

    /// Load a JSON store snapshot and, optionally, a TOML configuration.
    pub fn open(snapshot: &Path, config: Option<&Path>) -> Result<Self> {
        let json = fs::read_to_string(snapshot)
            .with_context(|| format!("reading {}", snapshot.display()))?;
        let config = match config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                RtConfig::from_toml_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => RtConfig::default(),
        };
        Self::from_json(&json, config)
    }

    /// Session over a JSON store snapshot.
    pub fn from_json(json: &str, config: RtConfig) -> Result<Self> {
        let store = MemoryStore::from_json(json).context("loading store snapshot")?;
        info!("loaded {} objects", store.len());
        Ok(Self::new(store, config))
    }

    /// The store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// The store, for edits.
    pub fn store_mut(&mut self) -> &mut MemoryStore {
        &mut self.store
    }

    /// The ray tracing context.
    pub fn context(&self) -> &SceneContext {
        &self.ctx
    }

    /// Snapshot of the store as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(self.store.to_json()?)
    }

    /// Import the solid called `name` in its own frame.
    pub fn solid(&self, name: &str) -> Result<Box<dyn SolidInternal>> {
        let (_, object) = self.store.read_named(name)?;
        let DbObject::Solid(record) = object else {
            bail!("{name} is a combination, not a solid");
        };
        Ok(self.ctx.table().import(&record, &Transform::identity())?)
    }

    /// Every solid below `name`, imported under its accumulated matrix.
    fn placed_solids(&self, name: &str) -> Result<Vec<(String, Box<dyn SolidInternal>)>> {
        let mut leaves = Vec::new();
        walk(&self.store, name, &WalkOptions::default(), &mut |leaf| {
            if let DbObject::Solid(record) = leaf.object {
                leaves.push((leaf.name.to_string(), record.clone(), leaf.matrix.clone()));
            }
        })?;
        leaves
            .into_iter()
            .map(|(leaf, record, matrix)| -> Result<_> {
                let solid = self
                    .ctx
                    .table()
                    .import(&record, &matrix)
                    .with_context(|| format!("importing {leaf} below {name}"))?;
                Ok((leaf, solid))
            })
            .collect()
    }

    /// Wireframe of a solid or of every solid below a combination.
    pub fn plot(&self, name: &str, tol: &PlotTolerances) -> Result<Vec<LineSegment>> {
        let mut lines = Vec::new();
        for (_, solid) in self.placed_solids(name)? {
            lines.extend(solid.plot(tol));
        }
        Ok(lines)
    }

    /// Triangles of a solid or of every solid below a combination. Booleans
    /// are not evaluated; the meshes are only gathered.
    pub fn tessellate(&self, name: &str, tol: &PlotTolerances) -> Result<TriangleMesh> {
        let mut mesh = TriangleMesh::new();
        for (_, solid) in self.placed_solids(name)? {
            mesh.merge(&solid.tessellate(tol));
        }
        Ok(mesh)
    }

    /// Push the matrices below `roots` into their leaves.
    pub fn push(&mut self, roots: &[&str], opts: &PushOptions) -> Result<PushReport> {
        Ok(rtcsg_db::push(&mut self.store, self.ctx.table(), roots, opts)?)
    }

    /// Prepare the regions below `roots` for ray queries.
    pub fn prepare(&self, roots: &[&str]) -> Result<Scene> {
        Ok(Scene::prepare(&self.ctx, &self.store, roots)?)
    }

    /// Shoot one ray through a prepared scene.
    pub fn shoot(&self, scene: &Scene, ray: &Ray, handler: &mut dyn RayHandler) -> RayOutcome {
        rtcsg_rt::shoot_ray(&self.ctx, scene, ray, handler)
    }
}
