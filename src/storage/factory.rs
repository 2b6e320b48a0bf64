//! Entity factory over the JSONL store
//!
//! One [`JsonlFactory`] is bound per entity kind. Entities are looked up by
//! natural key; references arrive as the target's primary key.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use super::jsonl::{primary_key, EntityStore, StoredEntity};
use crate::domain::{
    fields_to_json, EntityFactory, EntityHandle, FactoryBindings, FactoryError, FixtureId,
    ResolvedFields,
};

/// Field names used for the human-readable rendering, in order of preference
const DISPLAY_FIELDS: [&str; 3] = ["name", "title", "label"];

pub struct JsonlFactory {
    store: EntityStore,
    kind: String,

    /// Entities of `kind`, read on first use
    entities: Option<BTreeMap<String, StoredEntity>>,
}

impl JsonlFactory {
    pub fn new(store: EntityStore, kind: impl Into<String>) -> Self {
        Self {
            store,
            kind: kind.into(),
            entities: None,
        }
    }

    /// Binds a factory for every kind, all sharing one store directory
    pub fn bind_all<I, S>(store: &EntityStore, kinds: I) -> FactoryBindings
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut bindings = FactoryBindings::new();
        for kind in kinds {
            let kind = kind.into();
            bindings.bind(kind.clone(), Box::new(Self::new(store.clone(), kind)));
        }
        bindings
    }

    fn entities(&mut self) -> Result<&mut BTreeMap<String, StoredEntity>, FactoryError> {
        if self.entities.is_none() {
            let loaded = self.store.read_kind(&self.kind)?;
            self.entities = Some(loaded);
        }
        self.entities
            .as_mut()
            .ok_or_else(|| FactoryError::new("entity cache unavailable"))
    }

    fn save(&mut self) -> Result<(), FactoryError> {
        let kind = self.kind.clone();
        let store = self.store.clone();
        let entities = self.entities()?;
        store.write_kind(&kind, entities)?;
        Ok(())
    }

    fn check_kind(&self, id: &FixtureId) -> Result<(), FactoryError> {
        if id.kind() != self.kind {
            return Err(FactoryError::new(format!(
                "{} cannot be stored by the {} factory",
                id, self.kind
            )));
        }
        Ok(())
    }
}

/// Rendering of an entity for progress output
fn repr(entity: &StoredEntity) -> String {
    DISPLAY_FIELDS
        .iter()
        .find_map(|name| entity.fields.get(*name).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| entity.key.clone())
}

fn handle(entity: &StoredEntity) -> EntityHandle {
    EntityHandle::new(entity.pk.clone(), repr(entity))
}

impl EntityFactory for JsonlFactory {
    fn locate(&mut self, id: &FixtureId) -> Result<Option<EntityHandle>, FactoryError> {
        self.check_kind(id)?;
        Ok(self.entities()?.get(id.key()).map(handle))
    }

    fn create(
        &mut self,
        id: &FixtureId,
        fields: &ResolvedFields,
    ) -> Result<EntityHandle, FactoryError> {
        self.check_kind(id)?;

        let entity = StoredEntity::new(id, fields_to_json(fields));
        let result = handle(&entity);
        debug!(%id, pk = %entity.pk, "storing new entity");

        self.entities()?.insert(id.key().to_string(), entity);
        self.save()?;
        Ok(result)
    }

    fn update(
        &mut self,
        existing: &EntityHandle,
        id: &FixtureId,
        fields: &ResolvedFields,
    ) -> Result<EntityHandle, FactoryError> {
        self.check_kind(id)?;
        if existing.pk != Value::String(primary_key(id)) {
            return Err(FactoryError::new(format!(
                "{} does not belong to entity {}",
                id, existing.pk
            )));
        }

        let entity = self
            .entities()?
            .get_mut(id.key())
            .ok_or_else(|| FactoryError::new(format!("{} is not stored", id)))?;

        let changed = entity.set_fields(fields_to_json(fields));
        let result = handle(entity);

        if changed {
            debug!(%id, "entity changed");
            self.save()?;
        }
        Ok(result)
    }

    fn supports_patch(&self) -> bool {
        true
    }

    fn patch(
        &mut self,
        existing: &EntityHandle,
        id: &FixtureId,
        fields: &ResolvedFields,
    ) -> Result<EntityHandle, FactoryError> {
        self.update(existing, id, fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResolvedValue;
    use serde_json::json;
    use tempfile::TempDir;

    fn id(s: &str) -> FixtureId {
        s.parse().unwrap()
    }

    fn scalar_fields(pairs: &[(&str, Value)]) -> ResolvedFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ResolvedValue::Scalar(v.clone())))
            .collect()
    }

    #[test]
    fn create_or_update_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = EntityStore::new(dir.path());
        let mut factory = JsonlFactory::new(store.clone(), "Author");
        let fields = scalar_fields(&[("name", json!("Alice"))]);

        let (first, created) = factory.create_or_update(&id("Author(alice)"), &fields).unwrap();
        assert!(created);
        assert_eq!(first.repr, "Alice");

        let (second, created) = factory.create_or_update(&id("Author(alice)"), &fields).unwrap();
        assert!(!created);
        assert_eq!(first, second);

        // A fresh factory sees what the first one stored
        let mut reopened = JsonlFactory::new(store.clone(), "Author");
        assert_eq!(reopened.locate(&id("Author(alice)")).unwrap(), Some(first));
        assert_eq!(store.read_kind("Author").unwrap().len(), 1);
    }

    #[test]
    fn unchanged_update_keeps_timestamp() {
        let dir = TempDir::new().unwrap();
        let store = EntityStore::new(dir.path());
        let mut factory = JsonlFactory::new(store.clone(), "Author");
        let fields = scalar_fields(&[("name", json!("Alice"))]);

        factory.create_or_update(&id("Author(alice)"), &fields).unwrap();
        let before = store.get(&id("Author(alice)")).unwrap().unwrap();

        factory.create_or_update(&id("Author(alice)"), &fields).unwrap();
        let after = store.get(&id("Author(alice)")).unwrap().unwrap();
        assert_eq!(before.updated_at, after.updated_at);

        let changed = scalar_fields(&[("name", json!("Alicia"))]);
        factory.create_or_update(&id("Author(alice)"), &changed).unwrap();
        let after = store.get(&id("Author(alice)")).unwrap().unwrap();
        assert_eq!(after.fields["name"], json!("Alicia"));
        assert_eq!(after.created_at, before.created_at);
    }

    #[test]
    fn references_are_stored_as_primary_keys() {
        let dir = TempDir::new().unwrap();
        let store = EntityStore::new(dir.path());
        let mut authors = JsonlFactory::new(store.clone(), "Author");
        let mut books = JsonlFactory::new(store.clone(), "Book");

        let alice = authors
            .create(&id("Author(alice)"), &scalar_fields(&[("name", json!("Alice"))]))
            .unwrap();

        let mut fields = scalar_fields(&[("title", json!("Dune"))]);
        fields.insert("author".into(), ResolvedValue::Entity(alice.clone()));
        fields.insert("editor".into(), ResolvedValue::Deferred(id("Author(bob)")));
        books.create(&id("Book(b1)"), &fields).unwrap();

        let stored = store.get(&id("Book(b1)")).unwrap().unwrap();
        assert_eq!(stored.fields["author"], alice.pk);
        assert_eq!(stored.fields["editor"], Value::Null);
    }

    #[test]
    fn repr_falls_back_to_key() {
        let dir = TempDir::new().unwrap();
        let mut factory = JsonlFactory::new(EntityStore::new(dir.path()), "Tag");

        let handle = factory
            .create(&id("Tag(scifi)"), &scalar_fields(&[("weight", json!(3))]))
            .unwrap();
        assert_eq!(handle.repr, "scifi");
        assert_eq!(handle.to_string(), "scifi");
    }

    #[test]
    fn rejects_foreign_kind() {
        let dir = TempDir::new().unwrap();
        let mut factory = JsonlFactory::new(EntityStore::new(dir.path()), "Author");

        let err = factory.locate(&id("Book(b1)")).unwrap_err();
        assert!(err.message().contains("Author factory"));
    }

    #[test]
    fn bind_all_covers_every_kind() {
        let dir = TempDir::new().unwrap();
        let bindings = JsonlFactory::bind_all(&EntityStore::new(dir.path()), ["Author", "Book"]);

        assert_eq!(bindings.kinds().collect::<Vec<_>>(), vec!["Author", "Book"]);
        assert!(bindings.supports_patch("Book"));
    }
}
