//! Outcomes of a load run

use std::path::PathBuf;

use serde::Serialize;

use crate::domain::{EntityHandle, FixtureId};

/// What happened to one record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    Created { entity: EntityHandle },
    Updated { entity: EntityHandle },
    Failed { reason: String },
}

/// Outcome of one record, in processing order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadResult {
    pub id: FixtureId,

    #[serde(flatten)]
    pub outcome: LoadOutcome,
}

impl LoadResult {
    pub fn loaded(id: FixtureId, entity: EntityHandle, created: bool) -> Self {
        let outcome = if created {
            LoadOutcome::Created { entity }
        } else {
            LoadOutcome::Updated { entity }
        };
        Self { id, outcome }
    }

    pub fn failed(id: FixtureId, reason: impl Into<String>) -> Self {
        Self {
            id,
            outcome: LoadOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    /// The entity, unless the record failed
    pub fn entity(&self) -> Option<&EntityHandle> {
        match &self.outcome {
            LoadOutcome::Created { entity } | LoadOutcome::Updated { entity } => Some(entity),
            LoadOutcome::Failed { .. } => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self.outcome, LoadOutcome::Created { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, LoadOutcome::Failed { .. })
    }
}

/// Receives every record outcome as soon as it is known
///
/// Any `FnMut(&FixtureId, &EntityHandle, bool)` closure is an observer of
/// created and updated records.
pub trait LoadObserver {
    fn on_result(&mut self, result: &LoadResult);
}

impl<F> LoadObserver for F
where
    F: FnMut(&FixtureId, &EntityHandle, bool),
{
    fn on_result(&mut self, result: &LoadResult) {
        if let Some(entity) = result.entity() {
            self(&result.id, entity, result.is_created());
        }
    }
}

/// Aggregate of a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub results: Vec<LoadResult>,
}

impl LoadReport {
    pub fn created(&self) -> usize {
        self.results.iter().filter(|r| r.is_created()).count()
    }

    pub fn updated(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, LoadOutcome::Updated { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &LoadResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// True if at least one record could not be loaded
    pub fn is_partial_failure(&self) -> bool {
        self.results.iter().any(|r| r.is_failed())
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// One record of a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRecord {
    pub id: FixtureId,
    pub source: PathBuf,
    pub depends_on: Vec<FixtureId>,
}

/// Result of the validation pass, without any factory call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadPlan {
    pub files: Vec<PathBuf>,
    pub records: Vec<PlannedRecord>,
}

impl LoadPlan {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
