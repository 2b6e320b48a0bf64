//! Domain models for fixture loading
//!
//! Contains the core loading model without any I/O concerns.

mod id;
mod value;
mod record;
mod registry;
mod graph;
mod factory;

pub use id::{FixtureId, IdError, is_valid_kind};
pub use value::{FieldValue, ResolvedValue, ResolvedFields, fields_to_json};
pub use record::FixtureRecord;
pub use registry::{IdentifierRegistry, RegistryError, Resolution, ResolutionState};
pub use graph::{DependencyGraph, GraphError};
pub use factory::{EntityFactory, EntityHandle, FactoryBindings, FactoryError};
