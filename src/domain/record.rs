//! Fixture record model
//!
//! A record is one entry of an expanded fixture document: an identifier and
//! the field mapping declared for it.

use std::collections::BTreeMap;

use super::id::FixtureId;
use super::value::FieldValue;

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureRecord {
    pub id: FixtureId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl FixtureRecord {
    pub fn new(id: FixtureId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Every identifier referenced by any field, in field order, deduplicated
    pub fn references(&self) -> Vec<&FixtureId> {
        let mut out: Vec<&FixtureId> = Vec::new();
        for value in self.fields.values() {
            for id in value.references() {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Returns true if any field references this record itself
    pub fn is_self_referencing(&self) -> bool {
        self.references().iter().any(|r| **r == self.id)
    }

    /// JSON view of the fields, used as template context for later documents
    pub fn fields_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> FixtureId {
        s.parse().unwrap()
    }

    #[test]
    fn references_deduplicated() {
        let record = FixtureRecord::new(id("Book(b1)"))
            .with_field("author", FieldValue::Reference(id("Author(alice)")))
            .with_field(
                "editors",
                FieldValue::List(vec![
                    FieldValue::Reference(id("Author(alice)")),
                    FieldValue::Reference(id("Author(bob)")),
                ]),
            );

        let refs: Vec<String> = record.references().iter().map(|r| r.to_string()).collect();
        assert_eq!(refs, vec!["Author(alice)", "Author(bob)"]);
        assert!(!record.is_self_referencing());
    }

    #[test]
    fn detects_self_reference() {
        let record = FixtureRecord::new(id("Node(root)"))
            .with_field("parent", FieldValue::Reference(id("Node(root)")));
        assert!(record.is_self_referencing());
    }

    #[test]
    fn fields_json_view() {
        let record = FixtureRecord::new(id("Book(b1)"))
            .with_field("title", FieldValue::Scalar(json!("Dune")))
            .with_field("author", FieldValue::Reference(id("Author(alice)")));

        assert_eq!(
            record.fields_json(),
            json!({"title": "Dune", "author": "Author(alice)"})
        );
    }
}
