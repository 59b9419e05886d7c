//! Regions and their boolean expressions, ready for ray queries.

use log::{debug, info};
use rtcsg_db::{
    walk, BoolOp, CombTree, DbObject, GeometryStore, LeafKind, RegionAttrs, WalkError,
    WalkOptions, MAX_TREE_DEPTH,
};
use rtcsg_math::{Aabb3, Transform};
use rtcsg_prim::{Ray, SurfacePoint};
use slotmap::SecondaryMap;

use crate::{Boundary, IntervalSet, RtError, SceneContext, SolidKey, SolidTable};

/// Index of a region within its [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(pub usize);

/// A region's boolean expression over prepared solids.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionExpr {
    /// A solid that failed to prepare; contributes nothing.
    Empty,
    /// A prepared solid.
    Solid(SolidKey),
    /// Operator node.
    Op {
        /// Operator.
        op: BoolOp,
        /// Left operand.
        left: Box<RegionExpr>,
        /// Right operand.
        right: Box<RegionExpr>,
    },
}

impl RegionExpr {
    /// Evaluate bottom-up over the per-solid interval sets of one ray.
    pub fn eval(&self, sets: &SecondaryMap<SolidKey, IntervalSet>, tol: f64) -> IntervalSet {
        match self {
            RegionExpr::Empty => IntervalSet::new(),
            RegionExpr::Solid(key) => sets.get(*key).cloned().unwrap_or_default(),
            RegionExpr::Op { op, left, right } => {
                let l = left.eval(sets, tol);
                match op {
                    BoolOp::Intersect | BoolOp::Subtract if l.is_empty() => l,
                    BoolOp::Union => l.union(&right.eval(sets, tol), tol),
                    BoolOp::Intersect => l.intersect(&right.eval(sets, tol), tol),
                    BoolOp::Subtract => l.subtract(&right.eval(sets, tol), tol),
                }
            }
        }
    }

    /// Every solid the expression mentions.
    pub fn solids(&self, out: &mut Vec<SolidKey>) {
        match self {
            RegionExpr::Empty => {}
            RegionExpr::Solid(key) => out.push(*key),
            RegionExpr::Op { left, right, .. } => {
                left.solids(out);
                right.solids(out);
            }
        }
    }
}

/// One region of the scene.
#[derive(Debug, Clone)]
pub struct Region {
    /// Name of the region combination (or of a bare solid).
    pub name: String,
    /// Region attributes; default for a bare solid.
    pub attrs: RegionAttrs,
    /// Boolean expression.
    pub expr: RegionExpr,
    /// Union of the bounds of every solid in `expr`.
    pub bounds: Aabb3,
}

/// Prepared regions over a shared solid table.
#[derive(Debug, Default)]
pub struct Scene {
    solids: SolidTable,
    regions: Vec<Region>,
}

impl Scene {
    /// Prepare every region under `roots`.
    ///
    /// A root that is itself a region becomes one region. Otherwise the
    /// tree below it is walked down to regions; a solid reached outside
    /// any region becomes a region of its own. Combinations inside a
    /// region, nested regions included, are expanded into its expression.
    pub fn prepare<S: GeometryStore + ?Sized>(
        ctx: &SceneContext,
        store: &S,
        roots: &[&str],
    ) -> Result<Scene, RtError> {
        let mut builder = Builder {
            ctx,
            store,
            scene: Scene::default(),
        };
        for root in roots {
            let (_, object) = store.read_named(root)?;
            if let DbObject::Comb(comb) = &object {
                if let Some(attrs) = comb.region {
                    builder.add_region(root, attrs, &comb.tree, &Transform::identity())?;
                    continue;
                }
            }

            let mut found = Vec::new();
            let opts = WalkOptions {
                max_depth: None,
                stop_at_regions: true,
            };
            walk(store, root, &opts, &mut |leaf| {
                found.push((
                    leaf.name.to_string(),
                    leaf.kind,
                    leaf.matrix.clone(),
                    leaf.object.clone(),
                ));
            })?;
            for (name, kind, matrix, object) in found {
                match (kind, object) {
                    (LeafKind::Region, DbObject::Comb(comb)) => {
                        let attrs = comb.region.unwrap_or_default();
                        builder.add_region(&name, attrs, &comb.tree, &matrix)?;
                    }
                    (_, DbObject::Solid(_)) => {
                        debug!("solid {name} is outside any region; it forms its own");
                        let leaf = CombTree::leaf(name.clone());
                        builder.add_region(&name, RegionAttrs::default(), &leaf, &matrix)?;
                    }
                    (_, DbObject::Comb(_)) => {}
                }
            }
        }
        let scene = builder.scene;
        info!(
            "prepared {} regions over {} solids ({} excluded)",
            scene.regions.len(),
            scene.solids.len(),
            scene.solids.excluded().len()
        );
        Ok(scene)
    }

    /// The regions, indexed by [`RegionId`].
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// The region behind `id`.
    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    /// The prepared solids.
    pub fn solids(&self) -> &SolidTable {
        &self.solids
    }

    /// Point and normal at a partition boundary, reversed where the
    /// boundary says so.
    pub fn surface(&self, boundary: &Boundary, ray: &Ray) -> Option<SurfacePoint> {
        let solid = self.solids.get(boundary.solid)?;
        let mut sp = solid.prim.norm(&boundary.hit, ray);
        if boundary.flip {
            sp.normal = -sp.normal;
        }
        Some(sp)
    }
}

struct Builder<'a, S: ?Sized> {
    ctx: &'a SceneContext,
    store: &'a S,
    scene: Scene,
}

impl<S: GeometryStore + ?Sized> Builder<'_, S> {
    fn add_region(
        &mut self,
        name: &str,
        attrs: RegionAttrs,
        tree: &CombTree,
        matrix: &Transform,
    ) -> Result<(), RtError> {
        let expr = self.expression(name, tree, matrix, 1)?;
        let mut keys = Vec::new();
        expr.solids(&mut keys);
        let bounds = keys
            .iter()
            .filter_map(|k| self.scene.solids.get(*k))
            .fold(Aabb3::empty(), |acc, s| acc.union(s.prim.bounds()));
        self.scene.regions.push(Region {
            name: name.to_string(),
            attrs,
            expr,
            bounds,
        });
        Ok(())
    }

    fn expression(
        &mut self,
        region: &str,
        tree: &CombTree,
        matrix: &Transform,
        depth: usize,
    ) -> Result<RegionExpr, RtError> {
        if depth > MAX_TREE_DEPTH {
            return Err(WalkError::TooDeep {
                root: region.to_string(),
                limit: MAX_TREE_DEPTH,
            }
            .into());
        }
        match tree {
            CombTree::Op { op, left, right } => Ok(RegionExpr::Op {
                op: *op,
                left: Box::new(self.expression(region, left, matrix, depth)?),
                right: Box::new(self.expression(region, right, matrix, depth)?),
            }),
            CombTree::Leaf { name, matrix: m } => {
                let acc = match m {
                    Some(m) => matrix.then(m),
                    None => matrix.clone(),
                };
                let (_, object) = self.store.read_named(name).map_err(WalkError::from)?;
                match object {
                    DbObject::Solid(record) => {
                        let key = self.scene.solids.instantiate(
                            self.ctx.table(),
                            &self.ctx.config().prep_options(),
                            name,
                            &record,
                            &acc,
                        );
                        Ok(key.map_or(RegionExpr::Empty, RegionExpr::Solid))
                    }
                    DbObject::Comb(comb) => {
                        if comb.is_region() {
                            debug!("region {name} is nested in {region}; folded into it");
                        }
                        self.expression(region, &comb.tree, &acc, depth + 1)
                    }
                }
            }
        }
    }
}
