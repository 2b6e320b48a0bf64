//! JSONL storage for seeded entities
//!
//! Each entity kind lives in its own file, `<store_dir>/<Kind>.jsonl`, with
//! one JSON object per line. Uses file locking for concurrent access safety.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::domain::FixtureId;

/// One persisted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    /// Primary key, `e-` followed by a short hash of `kind:key`
    pub pk: String,
    pub kind: String,
    pub key: String,

    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredEntity {
    pub fn new(id: &FixtureId, fields: serde_json::Map<String, serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            pk: primary_key(id),
            kind: id.kind().to_string(),
            key: id.key().to_string(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the fields, returning true if anything changed
    pub fn set_fields(&mut self, fields: serde_json::Map<String, serde_json::Value>) -> bool {
        if self.fields == fields {
            return false;
        }
        self.fields = fields;
        self.updated_at = Utc::now();
        true
    }
}

/// Deterministic primary key of an identifier
pub fn primary_key(id: &FixtureId) -> String {
    format!("e-{}", id.stable_hash())
}

/// Store for entities in JSONL format, one file per kind
#[derive(Debug, Clone)]
pub struct EntityStore {
    dir: PathBuf,
}

impl EntityStore {
    /// Creates a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the file holding entities of a kind
    pub fn path_for(&self, kind: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", kind))
    }

    /// Lists the kinds that have a store file
    pub fn kinds(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut kinds: Vec<String> = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read store directory: {}", self.dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                name.strip_suffix(".jsonl").map(str::to_string)
            })
            .collect();
        kinds.sort();

        Ok(kinds)
    }

    /// Reads all entities of a kind, keyed by natural key
    ///
    /// A key written twice keeps its last line.
    pub fn read_kind(&self, kind: &str) -> Result<BTreeMap<String, StoredEntity>> {
        let path = self.path_for(kind);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let file = File::open(&path)
            .with_context(|| format!("Failed to open entity store: {}", path.display()))?;

        // Acquire shared lock for reading
        file.lock_shared()
            .context("Failed to acquire read lock on entity store")?;

        let reader = BufReader::new(&file);
        let mut entities = BTreeMap::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;

            if line.trim().is_empty() {
                continue;
            }

            let entity: StoredEntity = serde_json::from_str(&line).with_context(|| {
                format!(
                    "Failed to parse entity at {}:{}",
                    path.display(),
                    line_num + 1
                )
            })?;

            entities.insert(entity.key.clone(), entity);
        }

        // Lock is released when file is dropped
        Ok(entities)
    }

    /// Finds one entity by identifier
    pub fn get(&self, id: &FixtureId) -> Result<Option<StoredEntity>> {
        Ok(self.read_kind(id.kind())?.remove(id.key()))
    }

    /// Writes all entities of a kind (full rewrite)
    pub fn write_kind(&self, kind: &str, entities: &BTreeMap<String, StoredEntity>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory: {}", self.dir.display()))?;

        let path = self.path_for(kind);
        let temp_path = path.with_extension("jsonl.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            // Acquire exclusive lock
            file.lock_exclusive()
                .context("Failed to acquire write lock on entity store")?;

            let mut writer = BufWriter::new(&file);

            // BTreeMap iteration keeps lines sorted by natural key
            for entity in entities.values() {
                let line = serde_json::to_string(entity).context("Failed to serialize entity")?;
                writeln!(writer, "{}", line).context("Failed to write entity")?;
            }

            writer.flush().context("Failed to flush entity store")?;
        }

        // Atomic rename
        fs::rename(&temp_path, &path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}
