//! Entity storage.
//!
//! The endpoint only ever reads from the store, so a store is built once at
//! startup and then shared behind an `Arc`.

use crate::error::EndpointError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Domain record of a stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: u64,
    pub name: String,
}

impl EntityRecord {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Lookup failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no entity with id {0}")]
    NotFound(u64),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only lookup of entities by id.
pub trait EntityStore: Send + Sync {
    /// Find the entity with the given id.
    fn find_by_id(&self, id: u64) -> Result<EntityRecord, StoreError>;
}

/// Store holding every record in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntityStore {
    records: HashMap<u64, EntityRecord>,
}

impl InMemoryEntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from records. Duplicate ids are rejected.
    pub fn from_records(
        records: impl IntoIterator<Item = EntityRecord>,
    ) -> Result<Self, EndpointError> {
        let mut store = Self::new();
        store.extend(records)?;
        Ok(store)
    }

    /// Load records from a YAML (or JSON) seed file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EndpointError> {
        Self::from_records(read_seed_file(path.as_ref())?)
    }

    /// Add records, rejecting ids already present.
    pub fn extend(
        &mut self,
        records: impl IntoIterator<Item = EntityRecord>,
    ) -> Result<(), EndpointError> {
        for record in records {
            if self.records.contains_key(&record.id) {
                return Err(EndpointError::Seed(format!(
                    "duplicate entity id {}",
                    record.id
                )));
            }
            self.records.insert(record.id, record);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn find_by_id(&self, id: u64) -> Result<EntityRecord, StoreError> {
        self.records
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }
}

/// Read a sequence of records from a seed file.
pub fn read_seed_file(path: &Path) -> Result<Vec<EntityRecord>, EndpointError> {
    let content = std::fs::read_to_string(path)?;
    let records: Vec<EntityRecord> = serde_yaml::from_str(&content)?;
    Ok(records)
}
