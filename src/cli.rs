use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::error::{Result, StagePilotError};
use crate::stage::WorkflowDefinition;
use crate::store::FileStore;
use crate::workflows::BuiltinWorkflow;

/// stagepilot - replay calibrated UI stages against a desktop application
#[derive(Parser)]
#[command(name = "stagepilot")]
#[command(about = "Replays calibrated click-and-type stages against a desktop application")]
#[command(version)]
pub struct Cli {
    /// Directory holding one sub-directory of configuration per workflow
    #[arg(long, global = true, default_value = "stagepilot")]
    pub config_dir: PathBuf,

    /// Dry-run mode: log UI actions instead of injecting input.
    ///
    /// Stage preconditions and delays still apply, so the run is realistic.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List built-in workflows
    List,
    /// Write a fresh configuration with every position unset
    Init {
        /// Built-in workflow name or path to a workflow definition (.toml)
        workflow: String,
        /// Seconds to wait after each action
        #[arg(long)]
        default_delay: Option<f64>,
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Show recorded positions and stage readiness
    Status {
        /// Built-in workflow name or path to a workflow definition (.toml)
        workflow: String,
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear every position (previous values go to the legacy log)
    Reset {
        /// Built-in workflow name or path to a workflow definition (.toml)
        workflow: String,
    },
    /// Record one position, from arguments or from the live pointer
    Capture {
        /// Built-in workflow name or path to a workflow definition (.toml)
        workflow: String,
        /// Position name
        name: String,
        /// X coordinate (requires --y)
        #[arg(long, requires = "y", allow_negative_numbers = true)]
        x: Option<i32>,
        /// Y coordinate (requires --x)
        #[arg(long, requires = "x", allow_negative_numbers = true)]
        y: Option<i32>,
        /// Capture with Space/Enter in this terminal instead of a mouse click
        #[arg(long, conflicts_with = "x")]
        keyboard: bool,
    },
    /// Interactively capture unset positions
    Calibrate {
        /// Built-in workflow name or path to a workflow definition (.toml)
        workflow: String,
        /// Recapture every position, not only unset ones
        #[arg(long)]
        all: bool,
        /// Seconds to wait for each capture before asking to retry
        #[arg(long)]
        timeout: Option<f64>,
        /// Capture with Space/Enter in this terminal instead of a mouse click
        #[arg(long)]
        keyboard: bool,
    },
    /// Execute every stage of the workflow in order
    Run {
        /// Built-in workflow name or path to a workflow definition (.toml)
        workflow: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Configuration files for a workflow: `<config-dir>/<workflow>/`
    pub fn store_for(&self, definition: &WorkflowDefinition) -> FileStore {
        FileStore::in_dir(self.config_dir.join(&definition.name))
    }
}

/// Resolve a workflow argument: a built-in name first, then a definition file
pub fn resolve_workflow(arg: &str) -> Result<WorkflowDefinition> {
    if let Ok(builtin) = arg.parse::<BuiltinWorkflow>() {
        return Ok(builtin.definition());
    }

    let path = Path::new(arg);
    if path.is_file() {
        return WorkflowDefinition::load_from_file(path);
    }

    let known: Vec<String> = BuiltinWorkflow::all().map(|w| w.to_string()).collect();
    Err(StagePilotError::invalid_definition(format!(
        "'{}' is neither a built-in workflow ({}) nor a definition file",
        arg,
        known.join(", ")
    )))
}
