//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `init [path]` | Write a default `seed.toml` and create the store |
//! | `load [apps...]` | Load fixtures (`--required`, `--load FILE`, `--dry-run`) |
//! | `entities [Kind]` | List stored entities of a kind, or the stored kinds |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug logs on stderr:
//! ```bash
//! seed --verbose load library
//! ```
//!
//! ## Entry Point
//!
//! Parse a [`Cli`] and hand it to [`run()`].

mod app;
mod load;
mod output;

pub use app::{run, Cli, Commands};
pub use load::LoadArgs;
pub use output::{Output, OutputFormat};
