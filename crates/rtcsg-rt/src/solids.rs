//! The solid table: one prepared primitive per (solid, placement) pair.

use std::collections::HashMap;

use log::warn;
use rtcsg_math::Transform;
use rtcsg_prim::{GeometryRecord, PrepOptions, Primitive, PrimitiveTable};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle to one prepared solid.
    pub struct SolidKey;
}

/// A prepared solid instance.
#[derive(Debug)]
pub struct Solid {
    /// Name of the stored solid.
    pub name: String,
    /// Accumulated placement it was imported under.
    pub matrix: Transform,
    /// Prepared primitive.
    pub prim: Box<dyn Primitive>,
}

/// A solid left out of the table because it failed to import or prep.
#[derive(Debug, Clone, PartialEq)]
pub struct Excluded {
    /// Name of the stored solid.
    pub name: String,
    /// Why it was left out.
    pub reason: String,
}

/// Prepared solids, de-duplicated by name and exact placement.
#[derive(Debug, Default)]
pub struct SolidTable {
    solids: SlotMap<SolidKey, Solid>,
    index: HashMap<(String, [u64; 16]), Option<SolidKey>>,
    excluded: Vec<Excluded>,
}

impl SolidTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Import and prep `record` under `matrix`, or reuse the instance made
    /// earlier for the same name and matrix.
    ///
    /// Failures are logged and remembered; the solid is then absent and
    /// rays simply miss it.
    pub fn instantiate(
        &mut self,
        table: &PrimitiveTable,
        opts: &PrepOptions,
        name: &str,
        record: &GeometryRecord,
        matrix: &Transform,
    ) -> Option<SolidKey> {
        let id = (name.to_string(), matrix.bits());
        if let Some(known) = self.index.get(&id) {
            return *known;
        }
        let prepared = table
            .import(record, matrix)
            .map_err(|e| e.to_string())
            .and_then(|internal| internal.prep(opts).map_err(|e| e.to_string()));
        let key = match prepared {
            Ok(prim) => Some(self.solids.insert(Solid {
                name: name.to_string(),
                matrix: matrix.clone(),
                prim,
            })),
            Err(reason) => {
                warn!("excluding solid {name}: {reason}");
                self.excluded.push(Excluded {
                    name: name.to_string(),
                    reason,
                });
                None
            }
        };
        self.index.insert(id, key);
        key
    }

    /// The solid behind `key`.
    pub fn get(&self, key: SolidKey) -> Option<&Solid> {
        self.solids.get(key)
    }

    /// Every prepared solid.
    pub fn iter(&self) -> impl Iterator<Item = (SolidKey, &Solid)> {
        self.solids.iter()
    }

    /// Number of prepared solids.
    pub fn len(&self) -> usize {
        self.solids.len()
    }

    /// Whether no solid was prepared.
    pub fn is_empty(&self) -> bool {
        self.solids.is_empty()
    }

    /// Solids that failed to import or prep.
    pub fn excluded(&self) -> &[Excluded] {
        &self.excluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtcsg_math::{Point3, Vec3};

    #[test]
    fn test_instances_are_shared_per_placement() {
        let table = PrimitiveTable::builtin();
        let opts = PrepOptions::default();
        let rec = GeometryRecord::sphere(Point3::origin(), 1.0);
        let mut solids = SolidTable::new();

        let a = solids.instantiate(&table, &opts, "ball", &rec, &Transform::identity());
        let b = solids.instantiate(&table, &opts, "ball", &rec, &Transform::identity());
        let moved = Transform::translation(3.0, 0.0, 0.0);
        let c = solids.instantiate(&table, &opts, "ball", &rec, &moved);
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(solids.len(), 2);
        let placed = solids.get(c.unwrap()).unwrap();
        assert!((placed.prim.bounds().center().x - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_failures_are_excluded() {
        let table = PrimitiveTable::builtin();
        let mut solids = SolidTable::new();
        let bad = GeometryRecord::rcc(Point3::origin(), Vec3::zeros(), 1.0);
        let key = solids.instantiate(
            &table,
            &PrepOptions::default(),
            "flat",
            &bad,
            &Transform::identity(),
        );
        assert!(key.is_none());
        assert!(solids.is_empty());
        assert_eq!(solids.excluded().len(), 1);
        assert_eq!(solids.excluded()[0].name, "flat");
    }
}
