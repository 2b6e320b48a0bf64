//! Entity factory contract
//!
//! The loader never talks to storage directly. Each entity kind is bound to
//! an [`EntityFactory`] supplied by the caller, which knows how to find,
//! create and update entities of that kind in its backing store.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::id::FixtureId;
use super::value::ResolvedFields;

/// Opaque handle to a persisted entity
///
/// `pk` is what references to this entity resolve to when the fields of a
/// dependent record are handed to its factory. `repr` is a human-readable
/// rendering used in progress output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHandle {
    pub pk: serde_json::Value,
    pub repr: String,
}

impl EntityHandle {
    pub fn new(pk: impl Into<serde_json::Value>, repr: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            repr: repr.into(),
        }
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

/// Failure reported by a factory (validation, storage, ...)
#[derive(Debug, Error)]
#[error("{message}")]
pub struct FactoryError {
    message: String,

    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl FactoryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error with a message
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for FactoryError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

/// Capability set for one storage technology: locate, create, update
///
/// `create_or_update` must be idempotent: a second call with the same
/// identifier and equivalent fields updates instead of duplicating. The
/// default implementation gets that from `locate`.
pub trait EntityFactory {
    /// Finds an already persisted entity for the identifier
    fn locate(&mut self, id: &FixtureId) -> Result<Option<EntityHandle>, FactoryError>;

    /// Persists a new entity
    fn create(&mut self, id: &FixtureId, fields: &ResolvedFields)
        -> Result<EntityHandle, FactoryError>;

    /// Overwrites an existing entity with the given fields
    fn update(
        &mut self,
        handle: &EntityHandle,
        id: &FixtureId,
        fields: &ResolvedFields,
    ) -> Result<EntityHandle, FactoryError>;

    /// Returns the handle and whether the entity was newly created
    fn create_or_update(
        &mut self,
        id: &FixtureId,
        fields: &ResolvedFields,
    ) -> Result<(EntityHandle, bool), FactoryError> {
        match self.locate(id)? {
            Some(existing) => Ok((self.update(&existing, id, fields)?, false)),
            None => Ok((self.create(id, fields)?, true)),
        }
    }

    /// Whether this factory can fix up an entity after creation
    ///
    /// Records that reference themselves are only accepted for kinds whose
    /// factory returns true here.
    fn supports_patch(&self) -> bool {
        false
    }

    /// Second phase of a self-referencing create
    fn patch(
        &mut self,
        handle: &EntityHandle,
        id: &FixtureId,
        _fields: &ResolvedFields,
    ) -> Result<EntityHandle, FactoryError> {
        let _ = handle;
        Err(FactoryError::new(format!(
            "factory for {} does not support patching",
            id.kind()
        )))
    }
}

/// Entity kinds paired with the factory responsible for them
///
/// Order of registration is kept; a kind may only be bound once.
#[derive(Default)]
pub struct FactoryBindings {
    bindings: Vec<(String, Box<dyn EntityFactory>)>,
}

impl FactoryBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a kind to a factory, replacing any previous binding
    pub fn bind(&mut self, kind: impl Into<String>, factory: Box<dyn EntityFactory>) {
        let kind = kind.into();
        match self.bindings.iter_mut().find(|(k, _)| *k == kind) {
            Some(slot) => slot.1 = factory,
            None => self.bindings.push((kind, factory)),
        }
    }

    /// Builder-style variant of [`bind`](Self::bind)
    pub fn with(mut self, kind: impl Into<String>, factory: impl EntityFactory + 'static) -> Self {
        self.bind(kind, Box::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.bindings.iter().any(|(k, _)| k == kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, kind: &str) -> Option<&dyn EntityFactory> {
        self.bindings
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, f)| f.as_ref())
    }

    pub fn get_mut(&mut self, kind: &str) -> Option<&mut (dyn EntityFactory + 'static)> {
        self.bindings
            .iter_mut()
            .find(|(k, _)| k == kind)
            .map(|(_, f)| f.as_mut())
    }

    pub fn supports_patch(&self, kind: &str) -> bool {
        self.get(kind).is_some_and(|f| f.supports_patch())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl fmt::Debug for FactoryBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}
