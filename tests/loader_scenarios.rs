//! Loader scenarios against the JSONL backend
//!
//! Every factory is wrapped so tests can assert which calls reached the
//! store, or that none did.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use seed_cli::domain::{GraphError, RegistryError, ResolvedFields};
use seed_cli::fixtures::{FileSelection, SelectionMode, TemplateConfig};
use seed_cli::storage::{EntityStore, JsonlFactory};
use seed_cli::{
    EntityFactory, EntityHandle, FactoryBindings, FactoryError, FixtureId, FixturesLoader,
    LoadError, LoaderConfig,
};
use tempfile::TempDir;

type Calls = Rc<RefCell<Vec<String>>>;

/// Records every mutating call before delegating to the JSONL factory
struct Tracked {
    inner: JsonlFactory,
    calls: Calls,
    fail_keys: Vec<String>,
}

impl EntityFactory for Tracked {
    fn locate(&mut self, id: &FixtureId) -> Result<Option<EntityHandle>, FactoryError> {
        self.inner.locate(id)
    }

    fn create(&mut self, id: &FixtureId, fields: &ResolvedFields) -> Result<EntityHandle, FactoryError> {
        self.calls.borrow_mut().push(format!("create {}", id));
        if self.fail_keys.iter().any(|k| k == id.key()) {
            return Err(FactoryError::new(format!("{} violates a constraint", id.key())));
        }
        self.inner.create(id, fields)
    }

    fn update(
        &mut self,
        handle: &EntityHandle,
        id: &FixtureId,
        fields: &ResolvedFields,
    ) -> Result<EntityHandle, FactoryError> {
        self.calls.borrow_mut().push(format!("update {}", id));
        self.inner.update(handle, id, fields)
    }

    fn supports_patch(&self) -> bool {
        self.inner.supports_patch()
    }

    fn patch(
        &mut self,
        handle: &EntityHandle,
        id: &FixtureId,
        fields: &ResolvedFields,
    ) -> Result<EntityHandle, FactoryError> {
        self.calls.borrow_mut().push(format!("patch {}", id));
        self.inner.patch(handle, id, fields)
    }
}

struct Scenario {
    fixtures: TempDir,
    store: TempDir,
    calls: Calls,
}

impl Scenario {
    fn new() -> Self {
        Self {
            fixtures: TempDir::new().unwrap(),
            store: TempDir::new().unwrap(),
            calls: Calls::default(),
        }
    }

    fn file(&self, name: &str, content: &str) -> &Self {
        fs::write(self.fixtures.path().join(name), content).unwrap();
        self
    }

    fn loader(&self, selection: FileSelection, fail_keys: &[&str]) -> FixturesLoader {
        let store = EntityStore::new(self.store.path());
        let mut bindings = FactoryBindings::new();
        for kind in ["Author", "Book", "A", "Employee"] {
            bindings.bind(
                kind,
                Box::new(Tracked {
                    inner: JsonlFactory::new(store.clone(), kind),
                    calls: Rc::clone(&self.calls),
                    fail_keys: fail_keys.iter().map(|k| k.to_string()).collect(),
                }),
            );
        }

        let config = LoaderConfig {
            fixture_dirs: vec![self.fixtures.path().to_path_buf()],
            selection,
            template: TemplateConfig {
                seed: Some(3),
                ..Default::default()
            },
        };
        FixturesLoader::new(config, bindings)
    }

    fn run(&self) -> Result<Vec<(String, bool)>, LoadError> {
        self.run_with(FileSelection::default(), &[])
    }

    fn run_with(
        &self,
        selection: FileSelection,
        fail_keys: &[&str],
    ) -> Result<Vec<(String, bool)>, LoadError> {
        let mut seen = Vec::new();
        let mut observer = |id: &FixtureId, _: &EntityHandle, created: bool| {
            seen.push((id.to_string(), created));
        };
        self.loader(selection, fail_keys).create_all(&mut observer)?;
        Ok(seen)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn stored(&self, kind: &str) -> usize {
        EntityStore::new(self.store.path()).read_kind(kind).unwrap().len()
    }
}

fn pairs(items: &[(&str, bool)]) -> Vec<(String, bool)> {
    items.iter().map(|(id, c)| (id.to_string(), *c)).collect()
}

#[test]
fn author_before_book_in_either_file_order() {
    for (first, second) in [("Author.yaml", "Book.yaml"), ("Book.yaml", "Author.yaml")] {
        let scenario = Scenario::new();
        let content = |name: &str| match name {
            "Author.yaml" => "alice:\n  name: Alice\n",
            _ => "b1:\n  author: Author(alice)\n",
        };
        scenario.file(first, content(first)).file(second, content(second));

        assert_eq!(
            scenario.run().unwrap(),
            pairs(&[("Author(alice)", true), ("Book(b1)", true)])
        );
    }
}

#[test]
fn forward_reference_within_one_file() {
    let scenario = Scenario::new();
    scenario.file(
        "fixtures.yaml",
        "Book:\n  b1: {author: Author(alice)}\nAuthor:\n  alice: {name: Alice}\n",
    );

    assert_eq!(
        scenario.run().unwrap(),
        pairs(&[("Author(alice)", true), ("Book(b1)", true)])
    );
}

#[test]
fn second_run_only_updates() {
    let scenario = Scenario::new();
    scenario
        .file("Author.yaml", "alice: {name: Alice}\nbob: {name: Bob}\n")
        .file("Book.yaml", "b1: {author: Author(alice), editors: \"Author(alice, bob)\"}\n");

    let first = scenario.run().unwrap();
    assert!(first.iter().all(|(_, created)| *created));

    let second = scenario.run().unwrap();
    assert_eq!(second.len(), 3);
    assert!(second.iter().all(|(_, created)| !*created));
    assert_eq!(scenario.stored("Author"), 2);
    assert_eq!(scenario.stored("Book"), 1);
}

#[test]
fn duplicate_identifier_across_files_makes_no_calls() {
    let scenario = Scenario::new();
    scenario
        .file("Author.yaml", "alice: {name: Alice}\n")
        .file("fixtures.yaml", "Author:\n  alice: {name: Other Alice}\n");

    let err = scenario.run().unwrap_err();
    match err {
        LoadError::Registry(RegistryError::DuplicateIdentifier { id, .. }) => {
            assert_eq!(id.to_string(), "Author(alice)")
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(scenario.calls().is_empty());
}

#[test]
fn missing_reference_names_the_identifier() {
    let scenario = Scenario::new();
    scenario
        .file("Author.yaml", "alice: {name: Alice}\n")
        .file("Book.yaml", "b1: {author: Author(ghost)}\n");

    let err = scenario.run().unwrap_err();
    assert!(matches!(
        &err,
        LoadError::Graph(GraphError::UnresolvedReference { missing, .. })
            if missing.to_string() == "Author(ghost)"
    ));
    assert!(err.to_string().contains("Author(ghost)"));
    assert!(scenario.calls().is_empty());
    assert_eq!(scenario.stored("Book"), 0);
}

#[test]
fn mutual_references_are_a_cycle() {
    let scenario = Scenario::new();
    scenario.file("A.yaml", "x: {next: A(y)}\ny: {next: A(x)}\n");

    let err = scenario.run().unwrap_err();
    match &err {
        LoadError::Graph(GraphError::CycleDetected(ids)) => {
            let mut names: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            names.sort();
            assert_eq!(names, vec!["A(x)", "A(y)"]);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(scenario.calls().is_empty());
}

#[test]
fn required_only_loads_named_files() {
    let scenario = Scenario::new();
    scenario
        .file("base.yaml", "Author:\n  alice: {name: Alice}\n")
        .file("Author.yaml", "bob: {name: Bob}\n")
        .file("fixtures.yaml", "Book:\n  b1: {title: Dune}\n");

    let selection = FileSelection {
        required_files: ["base.yaml".to_string()].into(),
        ..FileSelection::default().with_mode(SelectionMode::RequiredOnly)
    };

    assert_eq!(
        scenario.run_with(selection, &[]).unwrap(),
        pairs(&[("Author(alice)", true)])
    );
}

#[test]
fn factory_failure_spares_independent_records() {
    let scenario = Scenario::new();
    scenario
        .file("Author.yaml", "alice: {name: Alice}\nbroken: {name: Broken}\n")
        .file("Book.yaml", "b1: {author: Author(broken)}\nb2: {author: Author(alice)}\n");

    let mut loader = scenario.loader(FileSelection::default(), &["broken"]);
    let mut observer = |_: &FixtureId, _: &EntityHandle, _: bool| {};
    let report = loader.create_all(&mut observer).unwrap();

    assert!(report.is_partial_failure());
    assert_eq!(report.created(), 2);
    assert_eq!(report.failed(), 2);

    let reasons: Vec<String> = report
        .failures()
        .map(|r| format!("{}", serde_json::to_value(r).unwrap()["reason"]))
        .collect();
    assert!(reasons[0].contains("broken violates a constraint"));
    assert!(reasons[1].contains("dependency Author(broken) failed"));

    assert!(!scenario.calls().contains(&"create Book(b1)".to_string()));
    assert_eq!(scenario.stored("Book"), 1);
}

#[test]
fn self_reference_is_patched_with_own_key() {
    let scenario = Scenario::new();
    scenario.file("Employee.yaml", "boss:\n  name: Boss\n  manager: Employee(boss)\n");

    assert_eq!(scenario.run().unwrap(), pairs(&[("Employee(boss)", true)]));
    assert_eq!(
        scenario.calls(),
        vec!["create Employee(boss)", "patch Employee(boss)"]
    );

    let stored = EntityStore::new(scenario.store.path())
        .get(&"Employee(boss)".parse().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(stored.fields["manager"], stored.pk.as_str());
}

#[test]
fn self_reference_rerun_leaves_entity_untouched() {
    let scenario = Scenario::new();
    scenario.file("Employee.yaml", "boss:\n  name: Boss\n  manager: Employee(boss)\n");
    let boss: FixtureId = "Employee(boss)".parse().unwrap();
    let store = EntityStore::new(scenario.store.path());

    scenario.run().unwrap();
    let before = store.get(&boss).unwrap().unwrap();
    scenario.calls.borrow_mut().clear();

    assert_eq!(scenario.run().unwrap(), pairs(&[("Employee(boss)", false)]));
    assert_eq!(scenario.calls(), vec!["update Employee(boss)"]);

    let after = store.get(&boss).unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(after.fields["manager"], after.pk.as_str());
}

#[test]
fn templates_generate_records_and_references() {
    let scenario = Scenario::new();
    scenario
        .file(
            "Author.yaml",
            "{% for i in range(end=3) %}\nauthor{{ i }}:\n  name: Author {{ i }}\n{% endfor %}\n",
        )
        .file(
            "Book.yaml",
            "b1:\n  author: {{ ref(kind=\"Author\", key=\"author1\") }}\n  reviewers: {{ random_models(kind=\"Author\", min=1, max=2) }}\n",
        );

    let seen = scenario.run().unwrap();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen.last().unwrap().0, "Book(b1)");
    assert_eq!(scenario.stored("Author"), 3);
}

#[test]
fn unknown_fixture_directory_is_skipped() {
    let scenario = Scenario::new();
    let mut loader = scenario.loader(FileSelection::default(), &[]);
    let missing: &Path = Path::new("/definitely/not/here");
    let config = LoaderConfig {
        fixture_dirs: vec![missing.to_path_buf()],
        ..loader.config().clone()
    };
    loader = FixturesLoader::new(config, FactoryBindings::new());

    let mut observer = |_: &FixtureId, _: &EntityHandle, _: bool| {};
    let report = loader.create_all(&mut observer).unwrap();
    assert!(report.is_empty());
}
