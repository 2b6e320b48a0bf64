//! Field values of fixture records
//!
//! Parsed records carry [`FieldValue`]s. Before a record is handed to its
//! factory every reference is replaced, producing [`ResolvedValue`]s.

use serde_json::Value;
use std::collections::BTreeMap;

use super::factory::EntityHandle;
use super::id::FixtureId;

/// A field value as written in a fixture document
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Any literal value (string, number, bool, null, nested object)
    Scalar(Value),

    /// A list of values, possibly mixing literals and references
    List(Vec<FieldValue>),

    /// Pointer to another record by identifier
    Reference(FixtureId),
}

impl FieldValue {
    /// Collects every identifier referenced by this value, in order
    pub fn references(&self) -> Vec<&FixtureId> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a FixtureId>) {
        match self {
            FieldValue::Scalar(_) => {}
            FieldValue::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            FieldValue::Reference(id) => out.push(id),
        }
    }

    /// JSON view with references rendered as `Kind(key)` strings
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Scalar(v) => v.clone(),
            FieldValue::List(items) => Value::Array(items.iter().map(|i| i.to_json()).collect()),
            FieldValue::Reference(id) => Value::String(id.to_string()),
        }
    }
}

/// A field value with references replaced
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Scalar(Value),
    List(Vec<ResolvedValue>),

    /// Reference to an entity that already exists
    Entity(EntityHandle),

    /// Reference that cannot be materialized yet (self reference mid-create)
    Deferred(FixtureId),
}

impl ResolvedValue {
    /// JSON view handed to storage: entities become their primary key,
    /// deferred references become null
    pub fn to_json(&self) -> Value {
        match self {
            ResolvedValue::Scalar(v) => v.clone(),
            ResolvedValue::List(items) => {
                Value::Array(items.iter().map(|i| i.to_json()).collect())
            }
            ResolvedValue::Entity(handle) => handle.pk.clone(),
            ResolvedValue::Deferred(_) => Value::Null,
        }
    }

    /// First reference in this value that is still deferred
    pub fn deferred(&self) -> Option<&FixtureId> {
        match self {
            ResolvedValue::Deferred(id) => Some(id),
            ResolvedValue::List(items) => items.iter().find_map(ResolvedValue::deferred),
            _ => None,
        }
    }
}

/// Field mapping handed to an entity factory
pub type ResolvedFields = BTreeMap<String, ResolvedValue>;

/// Converts resolved fields into a JSON object
pub fn fields_to_json(fields: &ResolvedFields) -> serde_json::Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> FixtureId {
        s.parse().unwrap()
    }

    #[test]
    fn references_are_collected_from_lists() {
        let value = FieldValue::List(vec![
            FieldValue::Reference(id("Tag(a)")),
            FieldValue::Scalar(json!("plain")),
            FieldValue::List(vec![FieldValue::Reference(id("Tag(b)"))]),
        ]);

        let refs: Vec<String> = value.references().iter().map(|r| r.to_string()).collect();
        assert_eq!(refs, vec!["Tag(a)", "Tag(b)"]);
    }

    #[test]
    fn scalar_has_no_references() {
        assert!(FieldValue::Scalar(json!({"nested": "Author(alice)"}))
            .references()
            .is_empty());
    }

    #[test]
    fn field_value_json_renders_markers() {
        let value = FieldValue::List(vec![
            FieldValue::Reference(id("Author(alice)")),
            FieldValue::Scalar(json!(3)),
        ]);
        assert_eq!(value.to_json(), json!(["Author(alice)", 3]));
    }

    #[test]
    fn resolved_json_uses_primary_keys() {
        let mut fields = ResolvedFields::new();
        fields.insert("title".into(), ResolvedValue::Scalar(json!("Dune")));
        fields.insert(
            "author".into(),
            ResolvedValue::Entity(EntityHandle::new("e-1234567", "alice")),
        );
        fields.insert(
            "parent".into(),
            ResolvedValue::Deferred(id("Book(dune)")),
        );

        let json = fields_to_json(&fields);
        assert_eq!(json["title"], json!("Dune"));
        assert_eq!(json["author"], json!("e-1234567"));
        assert_eq!(json["parent"], Value::Null);
    }

    #[test]
    fn deferred_detection() {
        let nested = ResolvedValue::List(vec![
            ResolvedValue::Scalar(json!(1)),
            ResolvedValue::Deferred(id("A(x)")),
        ]);
        assert_eq!(nested.deferred(), Some(&id("A(x)")));
        assert!(ResolvedValue::Scalar(json!(1)).deferred().is_none());
    }
}
