//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

use super::load::{self, LoadArgs};
use super::output::{Output, OutputFormat};
use crate::storage::{Config, Project};

#[derive(Parser)]
#[command(name = "seed")]
#[command(author, version, about = "Load templated YAML fixtures into a data store")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new seed project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Load fixtures into the store
    Load(LoadArgs),

    /// List stored entities of a kind, or the stored kinds
    Entities {
        /// Entity kind, e.g. Author
        kind: Option<String>,
    },
}

/// Runs a parsed command line
pub fn run(cli: Cli) -> Result<()> {
    let format = match cli.format {
        Some(format) => format,
        None => Config::load_global()?.default_format.into(),
    };
    let output = Output::new(format);

    match cli.command {
        Commands::Init { path } => {
            debug!(%path, "initializing project");
            let project = Project::init(&path)?;
            output.success(&format!(
                "Initialized seed project at {}",
                project.root().display()
            ));
        }

        Commands::Load(args) => {
            debug!(?args, "loading fixtures");
            load::run(args, &output)?
        }

        Commands::Entities { kind: Some(kind) } => load::entities(&kind, &output)?,
        Commands::Entities { kind: None } => load::kinds(&output)?,
    }

    debug!("command completed successfully");
    Ok(())
}
