//! `seed load` and `seed entities`

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use super::output::Output;
use crate::domain::{EntityHandle, FixtureId};
use crate::fixtures::SelectionMode;
use crate::loader::{LoadOutcome, LoadPlan};
use crate::storage::Project;

#[derive(Args, Debug, Clone, Default)]
pub struct LoadArgs {
    /// Apps to load fixtures from (defaults to all apps)
    pub apps: Vec<String>,

    /// Only load the required fixture files
    #[arg(long, conflicts_with = "load")]
    pub required: bool,

    /// Only load fixture files with this file name
    #[arg(long, value_name = "FILE")]
    pub load: Option<String>,

    /// Validate and print the processing order without storing anything
    #[arg(long)]
    pub dry_run: bool,
}

impl LoadArgs {
    fn mode(&self) -> SelectionMode {
        match (&self.load, self.required) {
            (Some(name), _) => SelectionMode::Only(name.clone()),
            (None, true) => SelectionMode::RequiredOnly,
            (None, false) => SelectionMode::All,
        }
    }
}

pub fn run(args: LoadArgs, output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let mode = args.mode();
    let selection = project.config().project.selection(mode.clone());

    let names = project.app_names(&args.apps)?;
    if project.fixture_dirs(&names, &selection)?.is_empty() {
        output.success("No fixtures found. Exiting.");
        return Ok(());
    }

    // Only apps with a fixtures directory are listed, app roots still load
    let mut apps_with_fixtures: Vec<String> = names
        .into_iter()
        .filter(|name| project.fixtures_dir(name).is_some())
        .collect();
    apps_with_fixtures.sort();
    output.line(&format!(
        "Loading fixtures from apps: {}",
        apps_with_fixtures.join(", ")
    ));

    let mut loader = project.loader(&args.apps, mode)?;

    if args.dry_run {
        let plan = loader.plan()?;
        print_plan(&plan, output);
        return Ok(());
    }

    let mut observer = |id: &FixtureId, entity: &EntityHandle, created: bool| {
        let action = if created { "Creating" } else { "Updating" };
        output.line(&format!("{} {}: {}", action, id.key(), entity));
    };
    let report = loader.create_all(&mut observer)?;
    info!(store = %project.store_dir().display(), "fixtures stored");

    if output.is_json() {
        output.data(&report);
    }

    for result in report.failures() {
        if let LoadOutcome::Failed { reason } = &result.outcome {
            output.error(&format!("Failed {}: {}", result.id, reason));
        }
    }

    if report.is_partial_failure() {
        bail!(
            "{} of {} fixtures failed to load",
            report.failed(),
            report.results.len()
        );
    }

    output.line("Done loading fixtures. Exiting.");
    Ok(())
}

fn print_plan(plan: &LoadPlan, output: &Output) {
    if output.is_json() {
        output.data(plan);
        return;
    }

    output.line(&format!(
        "{} fixtures from {} files would be loaded in this order:",
        plan.records.len(),
        plan.files.len()
    ));
    for record in &plan.records {
        let depends_on: Vec<String> = record.depends_on.iter().map(|d| d.to_string()).collect();
        if depends_on.is_empty() {
            output.row(&[&record.id.to_string()]);
        } else {
            output.row(&[
                &record.id.to_string(),
                &format!("after {}", depends_on.join(", ")),
            ]);
        }
    }
}

/// Lists the kinds with a store file
pub fn kinds(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let kinds = project.store().kinds()?;

    if output.is_json() {
        output.data(&kinds);
    } else if kinds.is_empty() {
        output.line("No entities stored");
    } else {
        for kind in &kinds {
            output.line(kind);
        }
    }

    Ok(())
}

/// Lists stored entities of one kind
pub fn entities(kind: &str, output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let entities = project.store().read_kind(kind)?;

    if output.is_json() {
        let items: Vec<_> = entities.values().collect();
        output.data(&items);
        return Ok(());
    }

    if entities.is_empty() {
        output.line(&format!("No {} entities stored", kind));
        return Ok(());
    }

    for entity in entities.values() {
        let fields = serde_json::Value::Object(entity.fields.clone()).to_string();
        output.row(&[&entity.pk, &entity.key, &fields]);
    }

    Ok(())
}
