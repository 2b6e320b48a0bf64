//! Configuration handling for seed
//!
//! Configuration is stored in `seed.toml` at the project root (project) and
//! `~/.config/seed/config.toml` (global).

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fixtures::{
    FileSelection, SelectionMode, TemplateConfig, DEFAULT_MULTI_KIND_FILES, DEFAULT_REQUIRED_FILES,
};

/// Name of the project configuration file, which also marks the project root
pub const PROJECT_FILE: &str = "seed.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// An application owning fixtures for some entity kinds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub name: String,

    /// Directory of the app, relative to the project root
    pub path: PathBuf,

    /// Entity kinds stored by this app
    #[serde(default)]
    pub kinds: Vec<String>,
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Where the JSONL entity store lives, relative to the project root
    pub store_dir: PathBuf,

    /// File names that may declare several entity kinds
    pub multi_kind_files: Vec<String>,

    /// File names loaded by `seed load --required`
    pub required_files: Vec<String>,

    /// Seed for random template helpers
    pub seed: Option<u64>,

    /// Apps, in loading priority order
    pub apps: Vec<AppConfig>,

    /// Extra template variables
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".seed").join("store"),
            multi_kind_files: DEFAULT_MULTI_KIND_FILES.iter().map(|s| s.to_string()).collect(),
            required_files: DEFAULT_REQUIRED_FILES.iter().map(|s| s.to_string()).collect(),
            seed: None,
            apps: vec![],
            context: serde_json::Map::new(),
        }
    }
}

impl ProjectConfig {
    /// Checks names and kinds for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = BTreeSet::new();
        let mut kinds = BTreeSet::new();

        for app in &self.apps {
            if app.name.trim().is_empty() {
                return Err(ConfigError::Invalid("app name cannot be empty".into()));
            }
            if !names.insert(app.name.as_str()) {
                return Err(ConfigError::Invalid(format!("app '{}' is declared twice", app.name)));
            }
            for kind in &app.kinds {
                if !crate::domain::is_valid_kind(kind) {
                    return Err(ConfigError::Invalid(format!(
                        "app '{}': '{}' is not a valid entity kind",
                        app.name, kind
                    )));
                }
                if !kinds.insert(kind.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "entity kind '{}' is owned by more than one app",
                        kind
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn app(&self, name: &str) -> Option<&AppConfig> {
        self.apps.iter().find(|app| app.name == name)
    }

    /// Entity kinds of the named apps, in app declaration order
    pub fn kinds_of(&self, apps: &[String]) -> Vec<String> {
        self.apps
            .iter()
            .filter(|app| apps.contains(&app.name))
            .flat_map(|app| app.kinds.iter().cloned())
            .collect()
    }

    /// File selection for the given mode
    pub fn selection(&self, mode: SelectionMode) -> FileSelection {
        FileSelection {
            multi_kind_files: self.multi_kind_files.iter().cloned().collect(),
            required_files: self.required_files.iter().cloned().collect(),
            mode,
        }
    }

    pub fn template(&self) -> TemplateConfig {
        TemplateConfig {
            seed: self.seed,
            globals: self.context.clone(),
        }
    }
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
}

impl Config {
    /// Loads configuration for a specific project
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_config(project_root)?;

        Ok(Self {
            project,
            global,
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "seed", "seed-cli").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    pub fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads project configuration from a specific root
    fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
        let config_path = project_root.join(PROJECT_FILE);

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse project config")?;

        config
            .validate()
            .with_context(|| format!("Invalid project config: {}", config_path.display()))?;

        Ok(config)
    }

    /// Finds the project root by looking for `seed.toml`
    pub fn find_project_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_project_root_from(&current)
    }

    /// Walks up from `start` to the first directory holding `seed.toml`
    pub fn find_project_root_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(PROJECT_FILE).is_file() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }
}
