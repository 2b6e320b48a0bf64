//! Fixture identifiers
//!
//! ID Format: `{Kind}({key})` (e.g., `Author(alice)`)
//!
//! The kind names an entity kind bound to a factory, the key is the
//! human-chosen natural key that is unique within that kind. The same
//! syntax is used inside fixture documents to reference another record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid fixture identifier: expected '{{Kind}}({{key}})', got '{0}'")]
    InvalidFormat(String),

    #[error("Invalid entity kind '{0}': must start with a letter or underscore")]
    InvalidKind(String),

    #[error("Empty natural key in '{0}'")]
    EmptyKey(String),

    #[error("Natural key '{0}' cannot contain a comma")]
    CommaInKey(String),
}

/// Returns true if `kind` is a syntactically valid entity kind name
pub fn is_valid_kind(kind: &str) -> bool {
    let mut chars = kind.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Composite identifier of a fixture record: entity kind + natural key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FixtureId {
    kind: String,
    key: String,
}

impl FixtureId {
    /// Creates a new identifier, validating both parts
    pub fn new(kind: impl Into<String>, key: impl Into<String>) -> Result<Self, IdError> {
        let kind = kind.into();
        let key = key.into();

        if !is_valid_kind(&kind) {
            return Err(IdError::InvalidKind(kind));
        }

        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(IdError::EmptyKey(format!("{}({})", kind, key)));
        }
        // `Kind(a, b)` is a list of references
        if trimmed.contains(',') {
            return Err(IdError::CommaInKey(trimmed.to_string()));
        }

        Ok(Self {
            kind,
            key: trimmed.to_string(),
        })
    }

    /// Returns the entity kind
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the natural key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Short hash derived from kind and key
    ///
    /// Stable across runs, so storage backends can use it as a primary key.
    pub fn stable_hash(&self) -> String {
        let input = format!("{}:{}", self.kind, self.key);
        let hash = blake3::hash(input.as_bytes());
        hash.to_hex()[..7].to_string()
    }
}

impl fmt::Display for FixtureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.key)
    }
}

impl FromStr for FixtureId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let open = s
            .find('(')
            .ok_or_else(|| IdError::InvalidFormat(s.to_string()))?;
        if !s.ends_with(')') {
            return Err(IdError::InvalidFormat(s.to_string()));
        }

        let kind = &s[..open];
        let key = &s[open + 1..s.len() - 1];
        if key.contains(',') {
            return Err(IdError::InvalidFormat(s.to_string()));
        }

        Self::new(kind, key)
    }
}

impl TryFrom<String> for FixtureId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FixtureId> for String {
    fn from(id: FixtureId) -> Self {
        id.to_string()
    }
}
