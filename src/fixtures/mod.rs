//! # Fixture Documents
//!
//! Everything between a fixture directory on disk and a list of
//! [`FixtureRecord`](crate::domain::FixtureRecord)s:
//!
//! 1. [`FileSelection`] picks the files of a run and their layout
//! 2. [`TemplateExpander`] renders each document (Tera, Jinja2 syntax)
//! 3. [`DocumentParser`] turns the expanded YAML into records

mod discover;
mod parser;
mod template;

pub use discover::{
    DiscoverError, DocumentLayout, FileSelection, FixtureFile, SelectionMode,
    DEFAULT_MULTI_KIND_FILES, DEFAULT_REQUIRED_FILES,
};
pub use parser::{DocumentParser, ParseError};
pub use template::{TemplateConfig, TemplateError, TemplateExpander};
