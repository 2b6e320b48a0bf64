//! Project management
//!
//! Handles project initialization and maps apps to fixture directories.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

use super::config::PROJECT_FILE;
use super::{Config, EntityStore, JsonlFactory};
use crate::fixtures::{FileSelection, SelectionMode};
use crate::loader::{FixturesLoader, LoaderConfig};

/// Directory inside an app that holds its fixture files
pub const FIXTURES_DIR: &str = "fixtures";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a seed project. Run 'seed init' first.")]
    NotInProject,

    #[error("Unknown app '{0}'")]
    UnknownApp(String),
}

const DEFAULT_CONFIG: &str = r#"# seed configuration

# Where loaded entities are stored (one JSONL file per entity kind)
store_dir = ".seed/store"

# File names that may declare several entity kinds
multi_kind_files = ["fixtures.yaml", "fixtures.yml", "source.yaml", "source.yml"]

# File names loaded by 'seed load --required'
required_files = ["required.yaml", "required.yml"]

# Seed for the random template helpers (random_model, random_models)
# seed = 42

# Apps and the entity kinds they own. Fixtures are read from
# <path>/fixtures and from <path> itself when it holds a multi-kind file.
#
# [[apps]]
# name = "library"
# path = "library"
# kinds = ["Author", "Book"]

# Extra template variables
[context]
"#;

/// A seed project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(PROJECT_FILE).is_file() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path
    ///
    /// An existing `seed.toml` is left untouched.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create directory: {}", root.display()))?;

        let config_path = root.join(PROJECT_FILE);
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let project = Self::open(root)?;

        let store_dir = project.store_dir();
        fs::create_dir_all(&store_dir).with_context(|| {
            format!("Failed to create store directory: {}", store_dir.display())
        })?;

        Ok(project)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the store directory
    pub fn store_dir(&self) -> PathBuf {
        self.root.join(&self.config.project.store_dir)
    }

    /// Returns the entity store
    pub fn store(&self) -> EntityStore {
        EntityStore::new(self.store_dir())
    }

    /// Names of the requested apps, or of every app when none are given
    pub fn app_names(&self, apps: &[String]) -> Result<Vec<String>> {
        if apps.is_empty() {
            return Ok(self.config.project.apps.iter().map(|a| a.name.clone()).collect());
        }

        for name in apps {
            if self.config.project.app(name).is_none() {
                return Err(ProjectError::UnknownApp(name.clone()).into());
            }
        }
        Ok(apps.to_vec())
    }

    /// The app's `fixtures` directory, if it exists
    pub fn fixtures_dir(&self, app: &str) -> Option<PathBuf> {
        let app = self.config.project.app(app)?;
        let dir = self.root.join(&app.path).join(FIXTURES_DIR);
        dir.is_dir().then_some(dir)
    }

    /// Fixture directories of the given apps, in app order
    ///
    /// An app contributes `<path>/fixtures` when it exists, and `<path>`
    /// itself when it holds one of the selection's file names.
    pub fn fixture_dirs(&self, apps: &[String], selection: &FileSelection) -> Result<Vec<PathBuf>> {
        let names = selection.active_names();
        let mut dirs = Vec::new();

        for name in self.app_names(apps)? {
            let app = self
                .config
                .project
                .app(&name)
                .ok_or_else(|| ProjectError::UnknownApp(name.clone()))?;
            let app_dir = self.root.join(&app.path);

            if let Some(fixtures_dir) = self.fixtures_dir(&name) {
                dirs.push(fixtures_dir);
            }

            if names.iter().any(|file| app_dir.join(file).is_file()) {
                dirs.push(app_dir);
            }
        }

        debug!(dirs = dirs.len(), "resolved fixture directories");
        Ok(dirs)
    }

    /// Builds a loader for the given apps, storing into this project's store
    ///
    /// Only the kinds of the selected apps are bound.
    pub fn loader(&self, apps: &[String], mode: SelectionMode) -> Result<FixturesLoader> {
        let project = &self.config.project;
        let selection = project.selection(mode);
        let names = self.app_names(apps)?;

        let config = LoaderConfig {
            fixture_dirs: self.fixture_dirs(&names, &selection)?,
            selection,
            template: project.template(),
        };
        let bindings = JsonlFactory::bind_all(&self.store(), project.kinds_of(&names));

        Ok(FixturesLoader::new(config, bindings))
    }
}
