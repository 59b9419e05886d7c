//! Ray shooting: segments to partitions.
//!
//! Per ray the stages run in order:
//!
//! 1. shoot every solid whose box the ray meets,
//! 2. merge the segments into one list sorted by entry, exit, then solid,
//!    and fold them into a disjoint interval set per solid,
//! 3. evaluate each region's expression over those sets,
//! 4. sweep the region spans; stretches claimed by more than one region
//!    are resolved by air, tolerance and overlap policy,
//! 5. hand the partitions (or a miss) to the [`RayHandler`].

use log::{debug, trace};
use rayon::prelude::*;
use rtcsg_prim::{Ray, Segment};
use slotmap::SecondaryMap;

use crate::{
    Boundary, IntervalSet, Overlap, RegionId, Scene, SceneContext, SolidKey, Span,
};

/// One stretch of the ray owned by a single region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Partition {
    /// Owning region.
    pub region: RegionId,
    /// Where the ray enters the region's material.
    pub entry: Boundary,
    /// Where it leaves.
    pub exit: Boundary,
}

impl Partition {
    /// Entry distance.
    pub fn start(&self) -> f64 {
        self.entry.dist()
    }

    /// Exit distance.
    pub fn end(&self) -> f64 {
        self.exit.dist()
    }
}

/// Result of one ray.
#[derive(Debug, Clone, PartialEq)]
pub enum RayOutcome {
    /// Partitions in increasing distance; never empty.
    Hit(Vec<Partition>),
    /// Nothing was hit.
    Miss,
}

impl RayOutcome {
    /// The partitions, empty on a miss.
    pub fn partitions(&self) -> &[Partition] {
        match self {
            RayOutcome::Hit(parts) => parts,
            RayOutcome::Miss => &[],
        }
    }
}

/// Callbacks fired while a ray is evaluated. Every hook defaults to doing
/// nothing.
pub trait RayHandler {
    /// The ray produced partitions.
    fn hit(&mut self, _ray: &Ray, _partitions: &[Partition]) {}

    /// The ray produced nothing.
    fn miss(&mut self, _ray: &Ray) {}

    /// Two regions overlap deeper than the tolerance; the stretch is
    /// dropped from the partitions.
    fn overlap(&mut self, _ray: &Ray, _overlap: &Overlap<'_>) {}
}

/// Handler that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHandler;

impl RayHandler for NullHandler {}

/// Per-worker scratch buffers, reused from ray to ray.
#[derive(Debug, Default)]
pub struct Resource {
    segments: Vec<(SolidKey, Segment)>,
    sets: SecondaryMap<SolidKey, IntervalSet>,
    claims: Vec<(RegionId, Span)>,
    cuts: Vec<Cut>,
}

impl Resource {
    /// Empty buffers.
    pub fn new() -> Self {
        Self::default()
    }
}

/// A span end seen by the overlap sweep.
#[derive(Debug, Clone, Copy)]
struct Cut {
    at: Boundary,
    /// Ends a span rather than starting one.
    closing: bool,
}

/// Shoot one ray with fresh buffers.
pub fn shoot_ray(
    ctx: &SceneContext,
    scene: &Scene,
    ray: &Ray,
    handler: &mut dyn RayHandler,
) -> RayOutcome {
    shoot_ray_with(ctx, scene, ray, handler, &mut Resource::new())
}

/// Shoot one ray reusing `res`.
pub fn shoot_ray_with(
    ctx: &SceneContext,
    scene: &Scene,
    ray: &Ray,
    handler: &mut dyn RayHandler,
    res: &mut Resource,
) -> RayOutcome {
    let tol = ctx.config().tolerance.linear;

    trace!("shooting");
    res.segments.clear();
    for (key, solid) in scene.solids().iter() {
        if ray.slab(solid.prim.bounds()).is_none() {
            continue;
        }
        for seg in solid.prim.shot(ray) {
            if seg.is_well_formed() {
                res.segments.push((key, seg));
            } else {
                debug!("dropping malformed segment from {}", solid.name);
            }
        }
    }

    trace!("merging {} segments", res.segments.len());
    res.segments.sort_by(|(ka, a), (kb, b)| {
        a.entry
            .dist
            .total_cmp(&b.entry.dist)
            .then(a.exit.dist.total_cmp(&b.exit.dist))
            .then(ka.cmp(kb))
    });
    res.sets.clear();
    for (key, seg) in &res.segments {
        let span = Span::from_segment(*key, seg);
        match res.sets.get_mut(*key) {
            Some(set) => set.push(span, tol),
            None => {
                let mut set = IntervalSet::new();
                set.push(span, tol);
                res.sets.insert(*key, set);
            }
        }
    }

    trace!("boolean evaluation");
    res.claims.clear();
    for (i, region) in scene.regions().iter().enumerate() {
        if region.bounds.is_empty() || ray.slab(&region.bounds).is_none() {
            continue;
        }
        let set = region.expr.eval(&res.sets, tol);
        res.claims
            .extend(set.spans().iter().map(|s| (RegionId(i), *s)));
    }

    let partitions = resolve(ctx, scene, ray, handler, &res.claims, &mut res.cuts);
    if partitions.is_empty() {
        handler.miss(ray);
        RayOutcome::Miss
    } else {
        handler.hit(ray, &partitions);
        RayOutcome::Hit(partitions)
    }
}

/// Shoot many rays on the session's pool. Each worker gets its own
/// [`Resource`] and a handler from `make_handler`.
pub fn shoot_rays<H, F>(
    ctx: &SceneContext,
    scene: &Scene,
    rays: &[Ray],
    make_handler: F,
) -> Vec<RayOutcome>
where
    H: RayHandler,
    F: Fn() -> H + Sync + Send,
{
    let run = || {
        rays.par_iter()
            .map_init(
                || (Resource::new(), make_handler()),
                |(res, handler), ray| shoot_ray_with(ctx, scene, ray, handler, res),
            )
            .collect::<Vec<_>>()
    };
    match ctx.pool() {
        Some(pool) => pool.install(run),
        None => run(),
    }
}

/// Sweep the region spans and give every stretch to at most one region.
fn resolve(
    ctx: &SceneContext,
    scene: &Scene,
    ray: &Ray,
    handler: &mut dyn RayHandler,
    claims: &[(RegionId, Span)],
    cuts: &mut Vec<Cut>,
) -> Vec<Partition> {
    let mut out = Vec::new();
    if let [(region, span)] = claims {
        if span.end() >= 0.0 {
            out.push(Partition {
                region: *region,
                entry: span.entry,
                exit: span.exit,
            });
        }
        return out;
    }

    cuts.clear();
    for (_, span) in claims {
        cuts.push(Cut {
            at: span.entry,
            closing: false,
        });
        cuts.push(Cut {
            at: span.exit,
            closing: true,
        });
    }
    cuts.sort_by(|a, b| a.at.dist().total_cmp(&b.at.dist()));
    cuts.dedup_by(|later, kept| later.at.dist() == kept.at.dist());

    let mut sweep = Sweep {
        ctx,
        scene,
        ray,
        handler,
        claims,
        cuts,
        out,
    };
    // (first cut, claim indices) of the stretch being accumulated
    let mut run: Option<(usize, Vec<usize>)> = None;
    for w in 0..sweep.cuts.len() {
        let covering = sweep.covering(w);
        if let Some((from, owners)) = &run {
            if *owners == covering {
                continue;
            }
            sweep.settle(*from, w, owners);
        }
        run = (!covering.is_empty()).then_some((w, covering));
    }
    sweep.out
}

struct Sweep<'a, 'h> {
    ctx: &'a SceneContext,
    scene: &'a Scene,
    ray: &'a Ray,
    handler: &'h mut dyn RayHandler,
    claims: &'a [(RegionId, Span)],
    cuts: &'a [Cut],
    out: Vec<Partition>,
}

impl<'a> Sweep<'a, '_> {
    /// Claims covering the whole stretch from cut `w` to cut `w + 1`.
    fn covering(&self, w: usize) -> Vec<usize> {
        let Some(next) = self.cuts.get(w + 1) else {
            return Vec::new();
        };
        let (lo, hi) = (self.cuts[w].at.dist(), next.at.dist());
        self.claims
            .iter()
            .enumerate()
            .filter(|(_, (_, s))| s.start() <= lo && s.end() >= hi)
            .map(|(i, _)| i)
            .collect()
    }

    fn region_name(&self, claim: usize) -> &'a str {
        self.scene
            .region(self.claims[claim].0)
            .map_or("", |r| r.name.as_str())
    }

    fn is_air(&self, claim: usize) -> bool {
        self.scene
            .region(self.claims[claim].0)
            .is_some_and(|r| r.attrs.is_air())
    }

    /// Give the stretch from cut `from` to cut `to` to one of `owners`, or
    /// report it as an overlap and drop it.
    fn settle(&mut self, from: usize, to: usize, owners: &[usize]) {
        let (start, end) = (self.cuts[from].at.dist(), self.cuts[to].at.dist());
        if end < 0.0 {
            return;
        }
        let material: Vec<usize> = owners.iter().copied().filter(|&i| !self.is_air(i)).collect();
        let contenders = if material.is_empty() {
            owners.to_vec()
        } else {
            material
        };

        let config = self.ctx.config();
        if contenders.len() > 1 && end - start > config.overlap_tolerance {
            for (n, &a) in contenders.iter().enumerate() {
                for &b in &contenders[n + 1..] {
                    let overlap = Overlap {
                        first: self.region_name(a),
                        second: self.region_name(b),
                        start,
                        end,
                        entry: self.ray.at(start),
                        exit: self.ray.at(end),
                    };
                    self.ctx.overlaps().note(&overlap, config.overlap_mode);
                    self.handler.overlap(self.ray, &overlap);
                }
            }
            return;
        }

        let claims = self.claims;
        let Some(winner) = contenders.iter().copied().min_by(|&a, &b| {
            claims[a]
                .1
                .start()
                .total_cmp(&claims[b].1.start())
                .then(claims[a].0.cmp(&claims[b].0))
        }) else {
            return;
        };

        let (region, span) = claims[winner];
        let entry = if span.start() == start {
            span.entry
        } else {
            let cut = self.cuts[from];
            if cut.closing {
                cut.at.flipped()
            } else {
                cut.at
            }
        };
        let exit = if span.end() == end {
            span.exit
        } else {
            let cut = self.cuts[to];
            if cut.closing {
                cut.at
            } else {
                cut.at.flipped()
            }
        };

        match self.out.last_mut() {
            Some(last) if last.region == region && last.end() == start => last.exit = exit,
            _ => self.out.push(Partition {
                region,
                entry,
                exit,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OverlapMode, RegionExpr, RtConfig, RtError};
    use rtcsg_db::{CombTree, Combination, DbObject, MemoryStore, StoreError};
    use rtcsg_math::{Point3, Vec3};
    use rtcsg_prim::GeometryRecord;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[derive(Default)]
    struct Recorder {
        hits: usize,
        misses: usize,
        overlaps: Vec<(String, String, f64)>,
    }

    impl RayHandler for Recorder {
        fn hit(&mut self, _ray: &Ray, _partitions: &[Partition]) {
            self.hits += 1;
        }

        fn miss(&mut self, _ray: &Ray) {
            self.misses += 1;
        }

        fn overlap(&mut self, _ray: &Ray, overlap: &Overlap<'_>) {
            self.overlaps.push((
                overlap.first.to_string(),
                overlap.second.to_string(),
                overlap.depth(),
            ));
        }
    }

    fn unique_pairs() -> SceneContext {
        SceneContext::new(RtConfig {
            overlap_mode: OverlapMode::UniquePairs,
            ..RtConfig::default()
        })
    }

    /// Unit spheres at the origin and at x = 1.5, each in its own region.
    fn two_spheres() -> MemoryStore {
        let mut s = MemoryStore::new();
        s.insert(
            "s1",
            DbObject::Solid(GeometryRecord::sphere(Point3::origin(), 1.0)),
        );
        s.insert(
            "s2",
            DbObject::Solid(GeometryRecord::sphere(Point3::new(1.5, 0.0, 0.0), 1.0)),
        );
        s.insert(
            "s1.r",
            DbObject::Comb(Combination::region(1, CombTree::leaf("s1"))),
        );
        s.insert(
            "s2.r",
            DbObject::Comb(Combination::region(2, CombTree::leaf("s2"))),
        );
        s.insert(
            "combined",
            DbObject::Comb(Combination::region(
                3,
                CombTree::union(CombTree::leaf("s1.r"), CombTree::leaf("s2.r")),
            )),
        );
        s.insert(
            "pair",
            DbObject::Comb(Combination::new(CombTree::union(
                CombTree::leaf("s1.r"),
                CombTree::leaf("s2.r"),
            ))),
        );
        s
    }

    fn along_x() -> Ray {
        Ray::new(Point3::new(-5.0, 0.0, 0.0), Vec3::x())
    }

    fn assert_well_formed(parts: &[Partition]) {
        for p in parts {
            assert!(p.start() < p.end(), "empty partition {p:?}");
        }
        for w in parts.windows(2) {
            assert!(w[0].end() <= w[1].start(), "overlapping partitions {w:?}");
            assert!(w[0].start() < w[1].start());
        }
    }

    #[test]
    fn test_union_of_regions_is_one_partition() {
        init();
        let ctx = unique_pairs();
        let scene = Scene::prepare(&ctx, &two_spheres(), &["combined"]).unwrap();
        assert_eq!(scene.regions().len(), 1);

        let ray = along_x();
        let mut rec = Recorder::default();
        let outcome = shoot_ray(&ctx, &scene, &ray, &mut rec);
        let parts = outcome.partitions();
        assert_eq!(parts.len(), 1);
        assert!((ray.at(parts[0].start()).x + 1.0).abs() < 1e-9);
        assert!((ray.at(parts[0].end()).x - 2.5).abs() < 1e-9);
        assert_eq!(rec.hits, 1);
        assert!(rec.overlaps.is_empty());
        assert_eq!(ctx.overlaps().unique_pairs(), 0);
        assert!(ctx.overlaps().lines().is_empty());
    }

    #[test]
    fn test_sibling_regions_overlap() {
        init();
        let ctx = unique_pairs();
        let scene = Scene::prepare(&ctx, &two_spheres(), &["pair"]).unwrap();
        assert_eq!(scene.regions().len(), 2);

        let ray = along_x();
        let mut rec = Recorder::default();
        let parts = shoot_ray(&ctx, &scene, &ray, &mut rec).partitions().to_vec();

        let records = ctx.overlaps().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].regions, ("s1.r".to_string(), "s2.r".to_string()));
        assert_eq!(records[0].count, 1);
        assert!((records[0].max_depth - 0.5).abs() < 1e-9);
        assert_eq!(rec.overlaps.len(), 1);
        assert_eq!(ctx.overlaps().lines().len(), 1);

        // the overlapping stretch belongs to nobody
        assert_eq!(parts.len(), 2);
        assert_well_formed(&parts);
        assert_eq!(scene.region(parts[0].region).unwrap().name, "s1.r");
        assert_eq!(scene.region(parts[1].region).unwrap().name, "s2.r");
        assert!((ray.at(parts[0].end()).x - 0.5).abs() < 1e-9);
        assert!((ray.at(parts[1].start()).x - 1.0).abs() < 1e-9);
        // the second partition starts where the first sphere is left
        let entry = scene.surface(&parts[1].entry, &ray).unwrap();
        assert!(entry.normal.x < -0.99);
    }

    #[test]
    fn test_shallow_overlap_goes_to_first_region() {
        let ctx = SceneContext::new(RtConfig {
            overlap_tolerance: 1.0,
            overlap_mode: OverlapMode::UniquePairs,
            ..RtConfig::default()
        });
        let scene = Scene::prepare(&ctx, &two_spheres(), &["pair"]).unwrap();
        let ray = along_x();
        let parts = shoot_ray(&ctx, &scene, &ray, &mut NullHandler)
            .partitions()
            .to_vec();
        assert_eq!(ctx.overlaps().unique_pairs(), 0);
        assert_eq!(parts.len(), 2);
        assert_eq!(scene.region(parts[0].region).unwrap().name, "s1.r");
        assert!((ray.at(parts[0].end()).x - 1.0).abs() < 1e-9);
        assert_eq!(parts[0].end(), parts[1].start());
    }

    #[test]
    fn test_air_yields_to_material() {
        let mut store = two_spheres();
        store.insert(
            "air.r",
            DbObject::Comb(Combination::air(4, 1, CombTree::leaf("s1"))),
        );
        store.insert(
            "mixed",
            DbObject::Comb(Combination::new(CombTree::union(
                CombTree::leaf("air.r"),
                CombTree::leaf("s2.r"),
            ))),
        );
        let ctx = unique_pairs();
        let scene = Scene::prepare(&ctx, &store, &["mixed"]).unwrap();
        let ray = along_x();
        let parts = shoot_ray(&ctx, &scene, &ray, &mut NullHandler)
            .partitions()
            .to_vec();
        assert_eq!(ctx.overlaps().unique_pairs(), 0);
        assert_eq!(parts.len(), 2);
        assert_eq!(scene.region(parts[0].region).unwrap().name, "air.r");
        assert_eq!(scene.region(parts[1].region).unwrap().name, "s2.r");
        assert!((ray.at(parts[1].start()).x - 0.5).abs() < 1e-9);
        assert!((ray.at(parts[1].end()).x - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_subtraction_flips_cut_normals() {
        let mut store = MemoryStore::new();
        store.insert(
            "block",
            DbObject::Solid(GeometryRecord::rpp(
                Point3::new(-2.0, -2.0, -2.0),
                Point3::new(2.0, 2.0, 2.0),
            )),
        );
        store.insert(
            "hole",
            DbObject::Solid(GeometryRecord::sphere(Point3::origin(), 1.0)),
        );
        store.insert(
            "hollow.r",
            DbObject::Comb(Combination::region(
                1,
                CombTree::subtract(CombTree::leaf("block"), CombTree::leaf("hole")),
            )),
        );
        let ctx = SceneContext::default();
        let scene = Scene::prepare(&ctx, &store, &["hollow.r"]).unwrap();
        let ray = along_x();
        let parts = shoot_ray(&ctx, &scene, &ray, &mut NullHandler)
            .partitions()
            .to_vec();
        assert_eq!(parts.len(), 2);
        assert_well_formed(&parts);
        assert!((ray.at(parts[0].start()).x + 2.0).abs() < 1e-9);
        assert!((ray.at(parts[0].end()).x + 1.0).abs() < 1e-9);

        let into_hole = scene.surface(&parts[0].exit, &ray).unwrap();
        assert!(into_hole.normal.x > 0.99);
        let out_of_hole = scene.surface(&parts[1].entry, &ray).unwrap();
        assert!(out_of_hole.normal.x < -0.99);
        let leaving = scene.surface(&parts[1].exit, &ray).unwrap();
        assert!(leaving.normal.x > 0.99);
    }

    #[test]
    fn test_excluded_solid_is_a_miss() {
        let mut store = MemoryStore::new();
        store.insert(
            "flat",
            DbObject::Solid(GeometryRecord::rcc(Point3::origin(), Vec3::zeros(), 1.0)),
        );
        store.insert(
            "flat.r",
            DbObject::Comb(Combination::region(1, CombTree::leaf("flat"))),
        );
        let ctx = SceneContext::default();
        let scene = Scene::prepare(&ctx, &store, &["flat.r"]).unwrap();
        assert_eq!(scene.solids().excluded().len(), 1);
        assert_eq!(scene.regions()[0].expr, RegionExpr::Empty);

        let mut rec = Recorder::default();
        assert_eq!(
            shoot_ray(&ctx, &scene, &along_x(), &mut rec),
            RayOutcome::Miss
        );
        assert_eq!(rec.misses, 1);
        assert_eq!(rec.hits, 0);
    }

    #[test]
    fn test_missing_root() {
        let ctx = SceneContext::default();
        assert!(matches!(
            Scene::prepare(&ctx, &two_spheres(), &["nothing"]),
            Err(RtError::Store(StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn test_batched_rays_match_single_rays() {
        let ctx = SceneContext::new(RtConfig {
            workers: 2,
            overlap_mode: OverlapMode::UniquePairs,
            ..RtConfig::default()
        });
        let scene = Scene::prepare(&ctx, &two_spheres(), &["pair", "combined"]).unwrap();
        let rays: Vec<Ray> = (0..40)
            .map(|i| {
                let y = -1.2 + 0.06 * i as f64;
                Ray::new(Point3::new(-5.0, y, 0.1), Vec3::new(1.0, 0.01, 0.0))
            })
            .collect();

        let batched = shoot_rays(&ctx, &scene, &rays, || NullHandler);
        let single: Vec<RayOutcome> = rays
            .iter()
            .map(|r| shoot_ray(&ctx, &scene, r, &mut NullHandler))
            .collect();
        assert_eq!(batched, single);
        for outcome in &batched {
            assert_well_formed(outcome.partitions());
        }
        assert!(batched.iter().any(|o| matches!(o, RayOutcome::Hit(_))));
        assert!(batched.iter().any(|o| matches!(o, RayOutcome::Miss)));
    }
}
