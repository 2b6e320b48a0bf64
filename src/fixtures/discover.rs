//! Fixture file selection
//!
//! Decides which files in the fixture directories take part in a load run
//! and how each one is laid out:
//!
//! - `{Kind}.yaml` / `{Kind}.yml` declares records of a single entity kind
//! - files named in the multi-kind set declare records for several kinds
//!
//! Directories are visited in the given order, files within a directory in
//! file-name order, so discovery order is reproducible.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// File names allowed to declare more than one entity kind
pub const DEFAULT_MULTI_KIND_FILES: [&str; 4] =
    ["fixtures.yaml", "fixtures.yml", "source.yaml", "source.yml"];

/// File names loaded in required-only mode
pub const DEFAULT_REQUIRED_FILES: [&str; 2] = ["required.yaml", "required.yml"];

#[derive(Debug, Error)]
#[error("Failed to read fixture directory {}: {source}", path.display())]
pub struct DiscoverError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Which files are considered at all
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Single-kind files for every bound kind plus the multi-kind files
    #[default]
    All,

    /// Only files whose name is in the required set
    RequiredOnly,

    /// Only files with exactly this name
    Only(String),
}

/// How a selected document declares its records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLayout {
    /// Top-level mapping of natural key to fields, for one kind
    SingleKind(String),

    /// Records grouped under a kind tag per group
    MultiKind,
}

/// A fixture file chosen for loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureFile {
    pub path: PathBuf,
    pub layout: DocumentLayout,
}

/// File-name configuration for selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    pub multi_kind_files: BTreeSet<String>,
    pub required_files: BTreeSet<String>,
    pub mode: SelectionMode,
}

impl Default for FileSelection {
    fn default() -> Self {
        Self {
            multi_kind_files: DEFAULT_MULTI_KIND_FILES.iter().map(|s| s.to_string()).collect(),
            required_files: DEFAULT_REQUIRED_FILES.iter().map(|s| s.to_string()).collect(),
            mode: SelectionMode::All,
        }
    }
}

impl FileSelection {
    pub fn with_mode(mut self, mode: SelectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Names a directory must contain for it to hold fixtures in its root
    pub fn active_names(&self) -> BTreeSet<String> {
        match &self.mode {
            SelectionMode::All => self.multi_kind_files.clone(),
            SelectionMode::RequiredOnly => self.required_files.clone(),
            SelectionMode::Only(name) => BTreeSet::from([name.clone()]),
        }
    }

    /// Classifies a file name, or returns `None` if it is not selected
    pub fn classify(&self, file_name: &str, is_kind: impl Fn(&str) -> bool) -> Option<DocumentLayout> {
        let stem = yaml_stem(file_name)?;

        let layout_for = |stem: &str| {
            if is_kind(stem) {
                DocumentLayout::SingleKind(stem.to_string())
            } else {
                DocumentLayout::MultiKind
            }
        };

        match &self.mode {
            SelectionMode::All => {
                if is_kind(stem) {
                    Some(DocumentLayout::SingleKind(stem.to_string()))
                } else if self.multi_kind_files.contains(file_name) {
                    Some(DocumentLayout::MultiKind)
                } else {
                    None
                }
            }
            SelectionMode::RequiredOnly => self
                .required_files
                .contains(file_name)
                .then(|| layout_for(stem)),
            SelectionMode::Only(name) => (name == file_name).then(|| layout_for(stem)),
        }
    }

    /// Lists the selected files of every directory, in discovery order
    ///
    /// Missing directories are skipped; a directory listed twice is only
    /// visited once.
    pub fn discover(
        &self,
        dirs: &[PathBuf],
        is_kind: impl Fn(&str) -> bool,
    ) -> Result<Vec<FixtureFile>, DiscoverError> {
        let mut visited: Vec<&Path> = Vec::new();
        let mut files = Vec::new();

        for dir in dirs {
            if visited.contains(&dir.as_path()) {
                continue;
            }
            visited.push(dir.as_path());

            if !dir.is_dir() {
                debug!(dir = %dir.display(), "fixture directory does not exist, skipping");
                continue;
            }

            let mut names: Vec<(String, PathBuf)> = fs::read_dir(dir)
                .map_err(|source| DiscoverError {
                    path: dir.clone(),
                    source,
                })?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_file())
                .filter_map(|path| {
                    let name = path.file_name()?.to_str()?.to_string();
                    Some((name, path))
                })
                .collect();
            names.sort();

            for (name, path) in names {
                match self.classify(&name, &is_kind) {
                    Some(layout) => {
                        debug!(file = %path.display(), ?layout, "selected fixture file");
                        files.push(FixtureFile { path, layout });
                    }
                    None => debug!(file = %path.display(), "not a selected fixture file"),
                }
            }
        }

        Ok(files)
    }
}

/// File stem of a `.yaml`/`.yml` file name
fn yaml_stem(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "yaml" | "yml" if !stem.is_empty() => Some(stem),
        _ => None,
    }
}
