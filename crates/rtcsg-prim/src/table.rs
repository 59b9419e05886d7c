//! Registry mapping primitive kinds to their importers.

use std::collections::HashMap;

use rtcsg_math::Transform;

use crate::{arb8, cone, ell, part, tor, GeometryRecord, ImportError, PrimitiveKind, SolidInternal};

/// Signature of a primitive importer.
pub type ImportFn =
    fn(&GeometryRecord, &Transform) -> Result<Box<dyn SolidInternal>, ImportError>;

/// One registered primitive family.
#[derive(Debug, Clone, Copy)]
pub struct ImportEntry {
    /// Short lowercase name.
    pub name: &'static str,
    /// Importer.
    pub import: ImportFn,
}

/// Kind-to-importer table.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveTable {
    entries: HashMap<PrimitiveKind, ImportEntry>,
}

impl PrimitiveTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every analytic primitive registered.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.register(PrimitiveKind::Ell, "ell", ell::import);
        table.register(PrimitiveKind::Arb8, "arb8", arb8::import);
        table.register(PrimitiveKind::Cone, "cone", cone::import);
        table.register(PrimitiveKind::Part, "part", part::import);
        table.register(PrimitiveKind::Tor, "tor", tor::import);
        table
    }

    /// Register or replace the importer for `kind`.
    pub fn register(&mut self, kind: PrimitiveKind, name: &'static str, import: ImportFn) {
        self.entries.insert(kind, ImportEntry { name, import });
    }

    /// Whether `kind` has an importer.
    pub fn contains(&self, kind: PrimitiveKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Registered entry for `kind`.
    pub fn entry(&self, kind: PrimitiveKind) -> Option<&ImportEntry> {
        self.entries.get(&kind)
    }

    /// Import `record` placed by `xform`.
    pub fn import(
        &self,
        record: &GeometryRecord,
        xform: &Transform,
    ) -> Result<Box<dyn SolidInternal>, ImportError> {
        let entry = self
            .entries
            .get(&record.kind())
            .ok_or(ImportError::Unregistered(record.kind()))?;
        (entry.import)(record, xform)
    }
}

/// Reject placement matrices that cannot be inverted.
pub fn check_transform(xform: &Transform) -> Result<(), ImportError> {
    if xform.is_invertible() {
        Ok(())
    } else {
        Err(ImportError::SingularConstructionMatrix)
    }
}
