//! # Storage Layer
//!
//! Persistence layer for seed with git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Entities | JSONL (one JSON per line) | `<store_dir>/<Kind>.jsonl` |
//! | Config | TOML | `seed.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`EntityStore`] uses file locking (`fs2`) for concurrent access
//! - All writes are atomic (temp file + rename)
//!
//! ## Project Structure
//!
//! ```text
//! seed.toml                 # Project configuration, marks the root
//! .seed/
//! └── store/
//!     ├── Author.jsonl      # Entities of kind Author
//!     └── Book.jsonl
//! library/
//! └── fixtures/
//!     ├── Author.yaml       # Single-kind fixture file
//!     └── fixtures.yaml     # Multi-kind fixture file
//! ```
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing a seed project
//! - [`EntityStore`] - Read/write entities as JSONL
//! - [`JsonlFactory`] - Entity factory backed by the store
//! - [`Config`] - Project and global configuration

mod jsonl;
mod factory;
mod config;
mod project;

pub use jsonl::{primary_key, EntityStore, StoredEntity};
pub use factory::JsonlFactory;
pub use config::{
    AppConfig, Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig, PROJECT_FILE,
};
pub use project::{Project, ProjectError, FIXTURES_DIR};
