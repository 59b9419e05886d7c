//! The geometry store interface and its in-memory implementation.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use crate::DbObject;

new_key_type! {
    /// Handle to one stored object.
    pub struct ObjectHandle;
}

/// Errors raised by a geometry store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No object has this name.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The handle does not refer to a live object.
    #[error("stale object handle")]
    StaleHandle,

    /// Snapshot encoding or decoding failed.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Named object storage consumed by the core.
pub trait GeometryStore {
    /// Handle of the object called `name`.
    fn lookup(&self, name: &str) -> Option<ObjectHandle>;

    /// Read the object behind `handle`.
    fn read_record(&self, handle: ObjectHandle) -> Result<DbObject, StoreError>;

    /// Replace the object behind `handle`.
    fn write_record(&mut self, handle: ObjectHandle, object: DbObject) -> Result<(), StoreError>;

    /// Every object name, sorted.
    fn names(&self) -> Vec<String>;

    /// Name of the object behind `handle`.
    fn name_of(&self, handle: ObjectHandle) -> Option<&str>;

    /// Look up and read `name` in one step.
    fn read_named(&self, name: &str) -> Result<(ObjectHandle, DbObject), StoreError> {
        let handle = self
            .lookup(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Ok((handle, self.read_record(handle)?))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    object: DbObject,
}

/// In-process store with JSON snapshots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: SlotMap<ObjectHandle, Entry>,
    by_name: HashMap<String, ObjectHandle>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    objects: BTreeMap<String, DbObject>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`.
    pub fn insert(&mut self, name: impl Into<String>, object: DbObject) -> ObjectHandle {
        let name = name.into();
        if let Some(&handle) = self.by_name.get(&name) {
            if let Some(entry) = self.objects.get_mut(handle) {
                entry.object = object;
                return handle;
            }
        }
        let handle = self.objects.insert(Entry {
            name: name.clone(),
            object,
        });
        self.by_name.insert(name, handle);
        handle
    }

    /// Borrow the object called `name`.
    pub fn get(&self, name: &str) -> Option<&DbObject> {
        let handle = self.by_name.get(name)?;
        self.objects.get(*handle).map(|e| &e.object)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Serialize every object, ordered by name.
    pub fn to_json(&self) -> Result<String, StoreError> {
        let snapshot = Snapshot {
            objects: self
                .objects
                .values()
                .map(|e| (e.name.clone(), e.object.clone()))
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Load a snapshot written by [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        let mut store = Self::new();
        for (name, object) in snapshot.objects {
            store.insert(name, object);
        }
        Ok(store)
    }
}

impl GeometryStore for MemoryStore {
    fn lookup(&self, name: &str) -> Option<ObjectHandle> {
        self.by_name.get(name).copied()
    }

    fn read_record(&self, handle: ObjectHandle) -> Result<DbObject, StoreError> {
        self.objects
            .get(handle)
            .map(|e| e.object.clone())
            .ok_or(StoreError::StaleHandle)
    }

    fn write_record(&mut self, handle: ObjectHandle, object: DbObject) -> Result<(), StoreError> {
        let entry = self.objects.get_mut(handle).ok_or(StoreError::StaleHandle)?;
        entry.object = object;
        Ok(())
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    fn name_of(&self, handle: ObjectHandle) -> Option<&str> {
        self.objects.get(handle).map(|e| e.name.as_str())
    }
}
