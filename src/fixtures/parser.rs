//! YAML parsing of expanded fixture documents
//!
//! Single-kind document (`Author.yaml`):
//!
//! ```yaml
//! alice:
//!   name: Alice
//! ```
//!
//! Multi-kind document (`fixtures.yaml`), either a mapping of kind groups or
//! a sequence of them:
//!
//! ```yaml
//! Author:
//!   alice: {name: Alice}
//! Book:
//!   b1: {title: Dune, author: Author(alice)}
//! ```
//!
//! A string `Kind(key)` naming a known kind is a reference, `Kind(a, b)` a
//! list of references. Natural keys therefore cannot contain commas.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use serde_yaml::Value as Yaml;
use thiserror::Error;

use super::discover::DocumentLayout;
use crate::domain::{FieldValue, FixtureId, FixtureRecord};

#[derive(Debug, Error)]
#[error("Parse error in {}: {message}", path.display())]
pub struct ParseError {
    pub path: PathBuf,
    pub message: String,
}

/// Parses expanded documents into fixture records
#[derive(Debug, Clone)]
pub struct DocumentParser {
    kinds: BTreeSet<String>,
}

impl DocumentParser {
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses one document into records, in declaration order
    pub fn parse(
        &self,
        path: &Path,
        text: &str,
        layout: &DocumentLayout,
    ) -> Result<Vec<FixtureRecord>, ParseError> {
        let err = |message: String| ParseError {
            path: path.to_path_buf(),
            message,
        };

        let document: Yaml = serde_yaml::from_str(text).map_err(|e| err(e.to_string()))?;
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        match layout {
            DocumentLayout::SingleKind(kind) => {
                if !self.kinds.contains(kind) {
                    return Err(err(format!("unknown entity kind '{}'", kind)));
                }
                self.parse_group(kind, &document, &mut seen, &mut records)
                    .map_err(err)?;
            }
            DocumentLayout::MultiKind => match &document {
                Yaml::Null => {}
                Yaml::Mapping(groups) => {
                    for (kind, group) in groups {
                        let kind = self.group_kind(kind).map_err(err)?;
                        self.parse_group(&kind, group, &mut seen, &mut records)
                            .map_err(err)?;
                    }
                }
                Yaml::Sequence(items) => {
                    for (idx, item) in items.iter().enumerate() {
                        let Yaml::Mapping(groups) = item else {
                            return Err(err(format!(
                                "group at index {} must be a mapping of kind to records",
                                idx
                            )));
                        };
                        for (kind, group) in groups {
                            let kind = self.group_kind(kind).map_err(err)?;
                            self.parse_group(&kind, group, &mut seen, &mut records)
                                .map_err(err)?;
                        }
                    }
                }
                _ => {
                    return Err(err(
                        "expected a mapping or sequence of kind groups".to_string(),
                    ))
                }
            },
        }

        Ok(records)
    }

    fn group_kind(&self, kind: &Yaml) -> Result<String, String> {
        let kind = kind
            .as_str()
            .ok_or_else(|| "entity kind must be a string".to_string())?;
        if !self.kinds.contains(kind) {
            return Err(format!("unknown entity kind '{}'", kind));
        }
        Ok(kind.to_string())
    }

    fn parse_group(
        &self,
        kind: &str,
        group: &Yaml,
        seen: &mut HashSet<FixtureId>,
        out: &mut Vec<FixtureRecord>,
    ) -> Result<(), String> {
        let entries = match group {
            Yaml::Null => return Ok(()),
            Yaml::Mapping(entries) => entries,
            _ => return Err(format!("records of {} must be a mapping of natural keys", kind)),
        };

        for (key, body) in entries {
            let key = scalar_key(key)
                .ok_or_else(|| format!("natural key of a {} record must be a scalar", kind))?;
            let id = FixtureId::new(kind, key).map_err(|e| e.to_string())?;

            if !seen.insert(id.clone()) {
                return Err(format!("duplicate natural key: {}", id));
            }

            let fields = self.parse_fields(&id, body)?;
            out.push(FixtureRecord { id, fields });
        }

        Ok(())
    }

    fn parse_fields(
        &self,
        id: &FixtureId,
        body: &Yaml,
    ) -> Result<BTreeMap<String, FieldValue>, String> {
        let mapping = match body {
            Yaml::Null => return Ok(BTreeMap::new()),
            Yaml::Mapping(mapping) => mapping,
            _ => return Err(format!("record {} must be a mapping of fields", id)),
        };

        let mut fields = BTreeMap::new();
        for (name, value) in mapping {
            let name = name
                .as_str()
                .ok_or_else(|| format!("field names of {} must be strings", id))?;
            let value = self
                .parse_value(value)
                .map_err(|e| format!("{}.{}: {}", id, name, e))?;
            fields.insert(name.to_string(), value);
        }

        Ok(fields)
    }

    /// Converts one YAML value, recognizing reference markers
    pub fn parse_value(&self, value: &Yaml) -> Result<FieldValue, String> {
        match value {
            Yaml::String(s) => Ok(self
                .parse_marker(s)
                .unwrap_or_else(|| FieldValue::Scalar(Value::String(s.clone())))),
            Yaml::Sequence(items) => items
                .iter()
                .map(|item| self.parse_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::List),
            Yaml::Tagged(tagged) => self.parse_value(&tagged.value),
            other => yaml_to_json(other).map(FieldValue::Scalar),
        }
    }

    /// Reads `Kind(key)` / `Kind(k1, k2)` for a known kind
    fn parse_marker(&self, s: &str) -> Option<FieldValue> {
        static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
        let re = MARKER
            .get_or_init(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\((.*)\)\s*$").ok())
            .as_ref()?;

        let caps = re.captures(s)?;
        let kind = &caps[1];
        if !self.kinds.contains(kind) {
            return None;
        }

        let keys: Vec<&str> = caps[2].split(',').map(str::trim).collect();
        if keys.iter().any(|k| k.is_empty()) {
            return None;
        }

        let mut refs = keys
            .into_iter()
            .map(|key| FixtureId::new(kind, key).ok())
            .collect::<Option<Vec<_>>>()?;

        if refs.len() == 1 {
            refs.pop().map(FieldValue::Reference)
        } else {
            Some(FieldValue::List(
                refs.into_iter().map(FieldValue::Reference).collect(),
            ))
        }
    }
}

fn scalar_key(key: &Yaml) -> Option<String> {
    match key {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Converts YAML to JSON; mapping keys must be scalars
fn yaml_to_json(value: &Yaml) -> Result<Value, String> {
    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => Value::Array(
            items
                .iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut object = serde_json::Map::new();
            for (key, value) in mapping {
                let key = scalar_key(key).ok_or_else(|| "mapping keys must be scalars".to_string())?;
                object.insert(key, yaml_to_json(value)?);
            }
            Value::Object(object)
        }
        Yaml::Tagged(tagged) => yaml_to_json(&tagged.value)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser() -> DocumentParser {
        DocumentParser::new(["Author", "Book", "Tag"])
    }

    fn single(kind: &str) -> DocumentLayout {
        DocumentLayout::SingleKind(kind.to_string())
    }

    fn id(s: &str) -> FixtureId {
        s.parse().unwrap()
    }

    #[test]
    fn parse_single_kind_document() {
        let text = r#"
alice:
  name: Alice
  age: 42
bob:
  name: Bob
"#;
        let records = parser().parse(Path::new("Author.yaml"), text, &single("Author")).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, id("Author(alice)"));
        assert_eq!(records[0].fields["name"], FieldValue::Scalar(json!("Alice")));
        assert_eq!(records[0].fields["age"], FieldValue::Scalar(json!(42)));
        assert_eq!(records[1].id, id("Author(bob)"));
    }

    #[test]
    fn parse_references() {
        let text = r#"
b1:
  title: Dune
  author: Author(alice)
  tags: Tag(scifi, classic)
  editors: [Author(bob), "not a ref"]
  note: "Hello(world)"
"#;
        let records = parser().parse(Path::new("Book.yaml"), text, &single("Book")).unwrap();
        let fields = &records[0].fields;

        assert_eq!(fields["author"], FieldValue::Reference(id("Author(alice)")));
        assert_eq!(
            fields["tags"],
            FieldValue::List(vec![
                FieldValue::Reference(id("Tag(scifi)")),
                FieldValue::Reference(id("Tag(classic)")),
            ])
        );
        assert_eq!(
            fields["editors"],
            FieldValue::List(vec![
                FieldValue::Reference(id("Author(bob)")),
                FieldValue::Scalar(json!("not a ref")),
            ])
        );
        assert_eq!(fields["note"], FieldValue::Scalar(json!("Hello(world)")));
    }

    #[test]
    fn parse_multi_kind_mapping() {
        let text = r#"
Author:
  alice: {name: Alice}
Book:
  b1: {title: Dune, author: Author(alice)}
"#;
        let records = parser()
            .parse(Path::new("fixtures.yaml"), text, &DocumentLayout::MultiKind)
            .unwrap();

        let ids: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["Author(alice)", "Book(b1)"]);
    }

    #[test]
    fn parse_multi_kind_sequence() {
        let text = r#"
- Author:
    alice: {name: Alice}
- Book:
    b1: {author: Author(alice)}
- Author:
    bob: {name: Bob}
"#;
        let records = parser()
            .parse(Path::new("fixtures.yaml"), text, &DocumentLayout::MultiKind)
            .unwrap();

        let ids: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["Author(alice)", "Book(b1)", "Author(bob)"]);
    }

    #[test]
    fn duplicate_key_within_file_is_error() {
        let text = r#"
- Author:
    alice: {name: Alice}
- Author:
    alice: {name: Other}
"#;
        let err = parser()
            .parse(Path::new("fixtures.yaml"), text, &DocumentLayout::MultiKind)
            .unwrap_err();

        assert!(err.message.contains("duplicate natural key: Author(alice)"), "{}", err);
    }

    #[test]
    fn unknown_kind_in_multi_kind_file() {
        let text = "Ghost:\n  x: {}\n";
        let err = parser()
            .parse(Path::new("fixtures.yaml"), text, &DocumentLayout::MultiKind)
            .unwrap_err();

        assert!(err.message.contains("unknown entity kind 'Ghost'"));
        assert_eq!(err.path, PathBuf::from("fixtures.yaml"));
    }

    #[test]
    fn empty_document_and_empty_record() {
        let empty = parser()
            .parse(Path::new("Author.yaml"), "# nothing yet\n", &single("Author"))
            .unwrap();
        assert!(empty.is_empty());

        let records = parser()
            .parse(Path::new("Author.yaml"), "alice:\n", &single("Author"))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].fields.is_empty());
    }

    #[test]
    fn comma_in_natural_key_is_error() {
        let err = parser()
            .parse(Path::new("Author.yaml"), "\"Smith, J\": {name: J}\n", &single("Author"))
            .unwrap_err();

        assert!(err.message.contains("cannot contain a comma"), "{}", err);
    }

    #[test]
    fn numeric_keys_become_strings() {
        let records = parser()
            .parse(Path::new("Tag.yaml"), "1: {label: one}\n", &single("Tag"))
            .unwrap();
        assert_eq!(records[0].id, id("Tag(1)"));
    }

    #[test]
    fn nested_objects_stay_scalar() {
        let records = parser()
            .parse(
                Path::new("Author.yaml"),
                "alice:\n  meta:\n    links: [a, b]\n    rank: 1.5\n",
                &single("Author"),
            )
            .unwrap();

        assert_eq!(
            records[0].fields["meta"],
            FieldValue::Scalar(json!({"links": ["a", "b"], "rank": 1.5}))
        );
    }

    #[test]
    fn malformed_documents() {
        let p = parser();
        assert!(p.parse(Path::new("Author.yaml"), "alice: [unclosed", &single("Author")).is_err());
        assert!(p.parse(Path::new("Author.yaml"), "- a\n- b\n", &single("Author")).is_err());
        assert!(p.parse(Path::new("Author.yaml"), "alice: 3\n", &single("Author")).is_err());
        assert!(p
            .parse(Path::new("fixtures.yaml"), "just text", &DocumentLayout::MultiKind)
            .is_err());
    }
}
