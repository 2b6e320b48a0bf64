//! seed - fixture loading for local data stores
//!
//! Fixture files are Tera templates of YAML documents declaring records by
//! entity kind and natural key. Records reference each other as `Kind(key)`,
//! in any file and in any order; the loader orders them so every dependency
//! is stored first and drives idempotent create-or-update calls against the
//! [`EntityFactory`] bound to each kind.

pub mod domain;
pub mod fixtures;
pub mod loader;
pub mod storage;
pub mod cli;

pub use domain::{EntityFactory, EntityHandle, FactoryBindings, FactoryError, FixtureId};
pub use loader::{FixturesLoader, LoadError, LoadObserver, LoadReport, LoaderConfig};
