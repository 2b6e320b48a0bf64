//! Identifier registry
//!
//! Owns every record of one load run, keyed by identifier, in discovery
//! order. Tracks the resolution state of each identifier and the entity
//! handle it resolved to.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::factory::EntityHandle;
use super::id::FixtureId;
use super::record::FixtureRecord;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Duplicate fixture identifier {id}: declared in {} and {}", first.display(), second.display())]
    DuplicateIdentifier {
        id: FixtureId,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Identifier {id} already resolved to {existing}, cannot resolve it to {conflicting}")]
    ConflictingHandle {
        id: FixtureId,
        existing: String,
        conflicting: String,
    },

    #[error("Unknown fixture identifier: {0}")]
    UnknownIdentifier(FixtureId),

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Per-identifier lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionState {
    #[default]
    Pending,
    InProgress,
    Resolved,
    Failed,
}

/// Result of resolving an identifier
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The entity already exists
    Entity(EntityHandle),

    /// Not materialized yet; callers turn this into an edge or a placeholder
    Deferred(FixtureId),
}

#[derive(Debug)]
struct Entry {
    record: FixtureRecord,
    source: PathBuf,
    state: ResolutionState,
    handle: Option<EntityHandle>,
}

/// Registry of all records declared in one load run
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    entries: Vec<Entry>,
    index: HashMap<FixtureId, usize>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record declared in `source`, returning its slot
    ///
    /// Registering the identical record from the same file again returns the
    /// existing slot. Any other collision is a duplicate.
    pub fn register(
        &mut self,
        record: FixtureRecord,
        source: &Path,
    ) -> Result<usize, RegistryError> {
        if let Some(&slot) = self.index.get(&record.id) {
            let existing = &self.entries[slot];
            if existing.source == source && existing.record == record {
                return Ok(slot);
            }
            return Err(RegistryError::DuplicateIdentifier {
                id: record.id,
                first: existing.source.clone(),
                second: source.to_path_buf(),
            });
        }

        let slot = self.entries.len();
        self.index.insert(record.id.clone(), slot);
        self.entries.push(Entry {
            record,
            source: source.to_path_buf(),
            state: ResolutionState::Pending,
            handle: None,
        });
        Ok(slot)
    }

    pub fn contains(&self, id: &FixtureId) -> bool {
        self.index.contains_key(id)
    }

    /// Discovery index of an identifier
    pub fn slot(&self, id: &FixtureId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn record(&self, id: &FixtureId) -> Option<&FixtureRecord> {
        self.slot(id).map(|slot| &self.entries[slot].record)
    }

    pub fn source(&self, id: &FixtureId) -> Option<&Path> {
        self.slot(id).map(|slot| self.entries[slot].source.as_path())
    }

    /// All records in discovery order
    pub fn records(&self) -> impl Iterator<Item = &FixtureRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn state(&self, id: &FixtureId) -> Option<ResolutionState> {
        self.slot(id).map(|slot| self.entries[slot].state)
    }

    pub fn handle(&self, id: &FixtureId) -> Option<&EntityHandle> {
        self.slot(id).and_then(|slot| self.entries[slot].handle.as_ref())
    }

    /// Resolves an identifier to its entity, or a deferred placeholder
    pub fn resolve(&self, id: &FixtureId) -> Result<Resolution, RegistryError> {
        let slot = self
            .slot(id)
            .ok_or_else(|| RegistryError::UnknownIdentifier(id.clone()))?;
        let entry = &self.entries[slot];

        match (entry.state, &entry.handle) {
            (ResolutionState::Resolved, Some(handle)) => Ok(Resolution::Entity(handle.clone())),
            _ => Ok(Resolution::Deferred(id.clone())),
        }
    }

    /// Resolves an identifier given in `Kind(key)` form
    pub fn resolve_str(&self, id: &str) -> Result<Resolution, RegistryError> {
        let id: FixtureId = id
            .parse()
            .map_err(|_| RegistryError::InvalidIdentifier(id.to_string()))?;
        self.resolve(&id)
    }

    /// Marks an identifier as being processed
    pub fn mark_in_progress(&mut self, id: &FixtureId) -> Result<(), RegistryError> {
        let slot = self
            .slot(id)
            .ok_or_else(|| RegistryError::UnknownIdentifier(id.clone()))?;
        let entry = &mut self.entries[slot];
        if entry.state == ResolutionState::Pending {
            entry.state = ResolutionState::InProgress;
        }
        Ok(())
    }

    /// Records the entity an identifier resolved to
    ///
    /// Idempotent for the same handle; a different handle is an invariant
    /// violation since an identifier maps to exactly one entity per run.
    pub fn mark_resolved(
        &mut self,
        id: &FixtureId,
        handle: EntityHandle,
    ) -> Result<(), RegistryError> {
        let slot = self
            .slot(id)
            .ok_or_else(|| RegistryError::UnknownIdentifier(id.clone()))?;
        let entry = &mut self.entries[slot];

        if let Some(existing) = &entry.handle {
            if *existing == handle {
                return Ok(());
            }
            return Err(RegistryError::ConflictingHandle {
                id: id.clone(),
                existing: existing.to_string(),
                conflicting: handle.to_string(),
            });
        }

        entry.handle = Some(handle);
        entry.state = ResolutionState::Resolved;
        Ok(())
    }

    /// Replaces the handle of an already resolved identifier after a patch
    pub(crate) fn refresh_handle(&mut self, id: &FixtureId, handle: EntityHandle) {
        if let Some(slot) = self.slot(id) {
            let entry = &mut self.entries[slot];
            if entry.state == ResolutionState::Resolved {
                entry.handle = Some(handle);
            }
        }
    }

    pub fn mark_failed(&mut self, id: &FixtureId) -> Result<(), RegistryError> {
        let slot = self
            .slot(id)
            .ok_or_else(|| RegistryError::UnknownIdentifier(id.clone()))?;
        self.entries[slot].state = ResolutionState::Failed;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
