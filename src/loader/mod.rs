//! # Loader
//!
//! Orchestrates a load run:
//!
//! 1. select fixture files ([`FileSelection`])
//! 2. expand and parse each file, in discovery order
//! 3. register every record ([`IdentifierRegistry`])
//! 4. build the [`DependencyGraph`] and compute the processing order
//! 5. resolve references and call the bound [`EntityFactory`] per record
//!
//! Steps 1-4 are validation: any error there aborts the run before a single
//! factory call. Factory failures in step 5 only fail the affected record
//! and everything depending on it.

mod report;

pub use report::{LoadObserver, LoadOutcome, LoadPlan, LoadReport, LoadResult, PlannedRecord};

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    DependencyGraph, EntityFactory, EntityHandle, FactoryBindings, FactoryError, FieldValue,
    FixtureId, FixtureRecord, GraphError, IdentifierRegistry, RegistryError, Resolution,
    ResolutionState, ResolvedFields, ResolvedValue,
};
use crate::fixtures::{
    DiscoverError, DocumentParser, FileSelection, FixtureFile, ParseError, TemplateConfig,
    TemplateError, TemplateExpander,
};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Discover(#[from] DiscoverError),

    #[error("Failed to read fixture file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("No factory bound for entity kind '{0}'")]
    UnboundKind(String),
}

/// Inputs of a load run besides the factories
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    /// Directories searched for fixture files, in priority order
    pub fixture_dirs: Vec<PathBuf>,
    pub selection: FileSelection,
    pub template: TemplateConfig,
}

/// Validated state of a run, ready for processing
struct Prepared {
    files: Vec<FixtureFile>,
    registry: IdentifierRegistry,
    graph: DependencyGraph,
    order: Vec<FixtureId>,
}

/// Loads fixture files into the stores behind the bound factories
pub struct FixturesLoader {
    config: LoaderConfig,
    bindings: FactoryBindings,
}

impl FixturesLoader {
    pub fn new(config: LoaderConfig, bindings: FactoryBindings) -> Self {
        Self { config, bindings }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Runs the validation pass only
    pub fn plan(&self) -> Result<LoadPlan, LoadError> {
        let prepared = self.prepare()?;

        let records = prepared
            .order
            .iter()
            .map(|id| PlannedRecord {
                id: id.clone(),
                source: prepared
                    .registry
                    .source(id)
                    .map(|p| p.to_path_buf())
                    .unwrap_or_default(),
                depends_on: prepared.graph.dependencies(id),
            })
            .collect();

        Ok(LoadPlan {
            files: prepared.files.into_iter().map(|f| f.path).collect(),
            records,
        })
    }

    /// Creates or updates every selected record
    ///
    /// The observer sees each outcome synchronously, in processing order.
    /// Factory failures are collected in the report; structural errors
    /// (templates, parsing, duplicates, unresolved references, cycles) are
    /// returned before any factory is called.
    pub fn create_all(&mut self, observer: &mut dyn LoadObserver) -> Result<LoadReport, LoadError> {
        let Prepared {
            mut registry,
            graph,
            order,
            ..
        } = self.prepare()?;

        let mut report = LoadReport::default();

        for id in order {
            let result = self.process(&mut registry, &graph, &id)?;
            observer.on_result(&result);
            report.results.push(result);
        }

        info!(
            created = report.created(),
            updated = report.updated(),
            failed = report.failed(),
            "load run finished"
        );

        Ok(report)
    }

    fn prepare(&self) -> Result<Prepared, LoadError> {
        let kinds: Vec<String> = self.bindings.kinds().map(str::to_string).collect();

        let files = self
            .config
            .selection
            .discover(&self.config.fixture_dirs, |name| self.bindings.contains(name))?;
        info!(files = files.len(), "selected fixture files");

        let mut expander = TemplateExpander::new(kinds.iter().cloned(), &self.config.template);
        let parser = DocumentParser::new(kinds.iter().cloned());
        let mut registry = IdentifierRegistry::new();

        for file in &files {
            let text = fs::read_to_string(&file.path).map_err(|source| LoadError::Io {
                path: file.path.clone(),
                source,
            })?;

            let expanded = expander.expand(&file.path, &text)?;
            let records = parser.parse(&file.path, &expanded, &file.layout)?;
            debug!(file = %file.path.display(), records = records.len(), "parsed fixture file");

            for record in records {
                expander.remember(&record);
                registry.register(record, &file.path)?;
            }
        }

        for record in registry.records() {
            if !self.bindings.contains(record.id.kind()) {
                return Err(LoadError::UnboundKind(record.id.kind().to_string()));
            }
        }

        let graph = DependencyGraph::from_registry(&registry, |kind| {
            self.bindings.supports_patch(kind)
        })?;
        let order = graph.processing_order()?;
        debug!(records = order.len(), edges = graph.edge_count(), "computed processing order");

        Ok(Prepared {
            files,
            registry,
            graph,
            order,
        })
    }

    fn process(
        &mut self,
        registry: &mut IdentifierRegistry,
        graph: &DependencyGraph,
        id: &FixtureId,
    ) -> Result<LoadResult, LoadError> {
        let failed_dependency = graph
            .dependencies(id)
            .into_iter()
            .find(|dep| registry.state(dep) == Some(ResolutionState::Failed));

        if let Some(dep) = failed_dependency {
            registry.mark_failed(id)?;
            let reason = format!("dependency {} failed", dep);
            warn!(%id, %reason, "skipping record");
            return Ok(LoadResult::failed(id.clone(), reason));
        }

        let record = registry
            .record(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownIdentifier(id.clone()))?;
        let self_referencing = graph.accepts_self_reference(id);

        registry.mark_in_progress(id)?;

        let factory = self
            .bindings
            .get_mut(id.kind())
            .ok_or_else(|| LoadError::UnboundKind(id.kind().to_string()))?;

        let outcome = if self_referencing {
            create_then_patch(factory, registry, &record)
        } else {
            let fields = resolve_fields(registry, &record)?;
            if let Some(missing) = fields.values().find_map(ResolvedValue::deferred) {
                Err(FactoryError::new(format!("reference {} is not resolved", missing)))
            } else {
                debug!(%id, "create_or_update");
                factory.create_or_update(id, &fields)
            }
        };

        match outcome {
            Ok((handle, created)) => {
                registry.mark_resolved(id, handle.clone())?;
                Ok(LoadResult::loaded(id.clone(), handle, created))
            }
            Err(err) => {
                warn!(%id, error = %err, "factory failed");
                registry.mark_failed(id)?;
                Ok(LoadResult::failed(id.clone(), format!("{:#}", anyhow::Error::new(err))))
            }
        }
    }
}

/// Two-phase load of a record that references itself
///
/// A new record is created with its self reference deferred (null), marked
/// resolved, then patched once its own handle is known. An existing entity
/// already has a handle, so it gets a single update with every reference
/// resolved.
fn create_then_patch(
    factory: &mut dyn EntityFactory,
    registry: &mut IdentifierRegistry,
    record: &FixtureRecord,
) -> Result<(EntityHandle, bool), FactoryError> {
    let id = &record.id;

    if let Some(existing) = factory.locate(id)? {
        registry
            .mark_resolved(id, existing.clone())
            .map_err(|e| FactoryError::new(e.to_string()))?;

        let fields =
            resolve_fields(registry, record).map_err(|e| FactoryError::new(e.to_string()))?;
        debug!(%id, "update with resolved self reference");
        let updated = factory.update(&existing, id, &fields)?;
        registry.refresh_handle(id, updated.clone());

        return Ok((updated, false));
    }

    let deferred = resolve_fields(registry, record).map_err(|e| FactoryError::new(e.to_string()))?;
    debug!(%id, "create with deferred self reference");
    let handle = factory.create(id, &deferred)?;

    registry
        .mark_resolved(id, handle.clone())
        .map_err(|e| FactoryError::new(e.to_string()))?;

    let fields = resolve_fields(registry, record).map_err(|e| FactoryError::new(e.to_string()))?;
    debug!(%id, "patch self reference");
    let patched = factory.patch(&handle, id, &fields)?;
    registry.refresh_handle(id, patched.clone());

    Ok((patched, true))
}

/// Replaces every reference with the current resolution of its target
fn resolve_fields(
    registry: &IdentifierRegistry,
    record: &FixtureRecord,
) -> Result<ResolvedFields, RegistryError> {
    record
        .fields
        .iter()
        .map(|(name, value)| resolve_value(registry, value).map(|v| (name.clone(), v)))
        .collect()
}

fn resolve_value(
    registry: &IdentifierRegistry,
    value: &FieldValue,
) -> Result<ResolvedValue, RegistryError> {
    Ok(match value {
        FieldValue::Scalar(v) => ResolvedValue::Scalar(v.clone()),
        FieldValue::List(items) => ResolvedValue::List(
            items
                .iter()
                .map(|item| resolve_value(registry, item))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        FieldValue::Reference(target) => match registry.resolve(target)? {
            Resolution::Entity(handle) => ResolvedValue::Entity(handle),
            Resolution::Deferred(id) => ResolvedValue::Deferred(id),
        },
    })
}
