//! Template expansion of fixture documents
//!
//! Fixture documents are Tera templates (Jinja2 syntax), rendered before
//! they are parsed. Besides the Tera built-ins the following helpers exist:
//!
//! | Helper | Output |
//! |--------|--------|
//! | `ref(kind, key)` | `Kind(key)` reference marker |
//! | `refs(kind, keys)` | `Kind(k1, k2)` marker for a list of references |
//! | `random_model(kind)` | marker for one record declared in an earlier file |
//! | `random_models(kind, min, max)` | YAML list of markers for a random subset |
//!
//! The context holds the configured globals and `fixtures`, the field
//! values of records declared in previously expanded files, addressed as
//! `fixtures.Kind.key.field`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde_json::Value;
use tera::{Context, Tera};
use thiserror::Error;

use crate::domain::{FixtureId, FixtureRecord};

#[derive(Debug, Error)]
#[error("Template error in {}: `{directive}`: {message}", path.display())]
pub struct TemplateError {
    pub path: PathBuf,

    /// Name of the variable, function or filter that failed
    pub directive: String,

    pub message: String,
}

impl TemplateError {
    fn from_tera(path: &Path, err: &tera::Error) -> Self {
        let mut directive = None;
        let mut messages = Vec::new();

        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
        while let Some(e) = current {
            if let Some(tera_err) = e.downcast_ref::<tera::Error>() {
                if directive.is_none() {
                    directive = directive_of(tera_err);
                }
            }
            messages.push(e.to_string());
            current = e.source();
        }

        Self {
            path: path.to_path_buf(),
            directive: directive.unwrap_or_else(|| "template".to_string()),
            message: messages.join(": "),
        }
    }
}

/// Extracts the failing directive name from a Tera error
fn directive_of(err: &tera::Error) -> Option<String> {
    use tera::ErrorKind;

    match &err.kind {
        ErrorKind::FunctionNotFound(name)
        | ErrorKind::FilterNotFound(name)
        | ErrorKind::TestNotFound(name)
        | ErrorKind::CallFunction(name)
        | ErrorKind::CallFilter(name)
        | ErrorKind::CallTest(name) => Some(name.clone()),
        ErrorKind::Msg(message) => backticked(message),
        _ => None,
    }
}

/// First `name` quoted in backticks, as Tera quotes variables
fn backticked(message: &str) -> Option<String> {
    static QUOTED: OnceLock<Option<Regex>> = OnceLock::new();
    let re = QUOTED
        .get_or_init(|| Regex::new(r"`([^`]+)`").ok())
        .as_ref()?;
    re.captures(message).map(|c| c[1].to_string())
}

/// Template settings for a load run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateConfig {
    /// Seed for the random helpers; entropy when unset
    pub seed: Option<u64>,

    /// Extra variables available to every document
    pub globals: serde_json::Map<String, Value>,
}

/// Expands fixture documents, accumulating knowledge of declared records
pub struct TemplateExpander {
    kinds: Arc<BTreeSet<String>>,
    known: BTreeMap<String, BTreeMap<String, Value>>,
    globals: serde_json::Map<String, Value>,
    rng: Arc<Mutex<StdRng>>,
}

impl TemplateExpander {
    pub fn new<I, S>(kinds: I, config: &TemplateConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            kinds: Arc::new(kinds.into_iter().map(Into::into).collect()),
            known: BTreeMap::new(),
            globals: config.globals.clone(),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Makes a parsed record visible to documents expanded afterwards
    pub fn remember(&mut self, record: &FixtureRecord) {
        self.known
            .entry(record.id.kind().to_string())
            .or_default()
            .insert(record.id.key().to_string(), record.fields_json());
    }

    /// Renders one document
    pub fn expand(&self, path: &Path, text: &str) -> Result<String, TemplateError> {
        let name = path.display().to_string();

        let mut tera = Tera::default();
        self.register_helpers(&mut tera);
        tera.add_raw_template(&name, text)
            .map_err(|e| TemplateError::from_tera(path, &e))?;

        let mut context = Context::new();
        for (key, value) in &self.globals {
            context.insert(key.as_str(), value);
        }
        context.insert("fixtures", &self.known);

        tera.render(&name, &context)
            .map_err(|e| TemplateError::from_tera(path, &e))
    }

    fn register_helpers(&self, tera: &mut Tera) {
        let known_keys: Arc<BTreeMap<String, Vec<String>>> = Arc::new(
            self.known
                .iter()
                .map(|(kind, records)| (kind.clone(), records.keys().cloned().collect()))
                .collect(),
        );

        let kinds = Arc::clone(&self.kinds);
        tera.register_function("ref", move |args: &HashMap<String, Value>| {
            let kind = kind_arg(args, &kinds)?;
            let key = key_arg(args.get("key"), "key")?;
            Ok(Value::String(marker(&kind, &[key])?))
        });

        let kinds = Arc::clone(&self.kinds);
        tera.register_function("refs", move |args: &HashMap<String, Value>| {
            let kind = kind_arg(args, &kinds)?;
            let keys = match args.get("keys") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| key_arg(Some(item), "keys"))
                    .collect::<tera::Result<Vec<_>>>()?,
                _ => return Err(tera::Error::msg("`keys` must be a list of natural keys")),
            };
            if keys.is_empty() {
                return Ok(Value::Array(vec![]));
            }
            Ok(Value::String(marker(&kind, &keys)?))
        });

        let kinds = Arc::clone(&self.kinds);
        let keys = Arc::clone(&known_keys);
        let rng = Arc::clone(&self.rng);
        tera.register_function("random_model", move |args: &HashMap<String, Value>| {
            let kind = kind_arg(args, &kinds)?;
            let candidates = declared_keys(&keys, &kind)?;
            let mut rng = rng
                .lock()
                .map_err(|_| tera::Error::msg("random generator poisoned"))?;
            let key = candidates
                .choose(&mut *rng)
                .ok_or_else(|| tera::Error::msg(format!("no {} records declared yet", kind)))?;
            Ok(Value::String(format!("{}({})", kind, key)))
        });

        let kinds = Arc::clone(&self.kinds);
        let keys = Arc::clone(&known_keys);
        let rng = Arc::clone(&self.rng);
        tera.register_function("random_models", move |args: &HashMap<String, Value>| {
            let kind = kind_arg(args, &kinds)?;
            let candidates = declared_keys(&keys, &kind)?;
            let min = count_arg(args, "min")?.unwrap_or(0).min(candidates.len());
            let max = count_arg(args, "max")?
                .unwrap_or(candidates.len())
                .min(candidates.len());
            if min > max {
                return Err(tera::Error::msg(format!("min {} is greater than max {}", min, max)));
            }

            let mut rng = rng
                .lock()
                .map_err(|_| tera::Error::msg("random generator poisoned"))?;
            let count = rng.gen_range(min..=max);
            let mut picked: Vec<&String> = candidates.choose_multiple(&mut *rng, count).collect();
            picked.sort_by_key(|key| candidates.iter().position(|c| c == *key));

            let markers: Vec<String> = picked
                .into_iter()
                .map(|key| format!("{}({})", kind, key))
                .collect();
            Ok(Value::String(format!("[{}]", markers.join(", "))))
        });
    }
}

fn kind_arg(args: &HashMap<String, Value>, kinds: &BTreeSet<String>) -> tera::Result<String> {
    let kind = args
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg("missing string argument `kind`"))?;
    if !kinds.contains(kind) {
        return Err(tera::Error::msg(format!("unknown entity kind `{}`", kind)));
    }
    Ok(kind.to_string())
}

/// Renders `Kind(key)` or `Kind(k1, k2)`, rejecting keys a marker cannot carry
fn marker(kind: &str, keys: &[String]) -> tera::Result<String> {
    for key in keys {
        FixtureId::new(kind, key.as_str()).map_err(|e| tera::Error::msg(e.to_string()))?;
    }
    Ok(format!("{}({})", kind, keys.join(", ")))
}

fn key_arg(value: Option<&Value>, name: &str) -> tera::Result<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(tera::Error::msg(format!(
            "`{}` must be a non-empty string or number",
            name
        ))),
    }
}

fn count_arg(args: &HashMap<String, Value>, name: &str) -> tera::Result<Option<usize>> {
    match args.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| tera::Error::msg(format!("`{}` must be a non-negative integer", name))),
    }
}

fn declared_keys<'a>(
    keys: &'a BTreeMap<String, Vec<String>>,
    kind: &str,
) -> tera::Result<&'a Vec<String>> {
    keys.get(kind)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| tera::Error::msg(format!("no {} records declared in earlier files", kind)))
}
