//! Declarative stage table.
//!
//! A workflow is a named, ordered list of `StageDescriptor`s. Each stage
//! declares the positions it requires and the steps of its body. The
//! position schema of a workflow is derived from the table, so the set of
//! names is known before any configuration is loaded.
//!
//! Workflows are either registered in code (see `workflows`) or loaded from
//! TOML:
//!
//! ```toml
//! name = "message_sender"
//!
//! [[stages]]
//! name = "launch_sender"
//!
//! [[stages.steps]]
//! action = "double_click"
//! target = "icon_position"
//! delay = { default_plus = 2.0 }
//!
//! [[stages.steps]]
//! action = "type_text"
//! text = "1\n"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::action::{Delay, UiAction};
use crate::config_file::DEFAULT_DELAY_SECS;
use crate::error::{Result, StagePilotError};

/// One action of a stage body and the wait that follows it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStep {
    #[serde(flatten)]
    pub action: UiAction,
    #[serde(default)]
    pub delay: Delay,
}

impl StageStep {
    pub fn new(action: UiAction, delay: Delay) -> Self {
        Self { action, delay }
    }
}

/// A named unit of work gated by required positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub name: String,
    /// Positions that must be set before the body runs.
    ///
    /// Targets of click actions are always required too, whether listed
    /// here or not.
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub steps: Vec<StageStep>,
}

impl StageDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Add an explicit precondition
    pub fn requires(mut self, position: impl Into<String>) -> Self {
        self.requires.push(position.into());
        self
    }

    /// Append a step to the body
    pub fn step(mut self, action: UiAction, delay: Delay) -> Self {
        self.steps.push(StageStep::new(action, delay));
        self
    }

    /// Declared requirements followed by action targets, without duplicates
    pub fn required_positions(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.requires
            .iter()
            .map(String::as_str)
            .chain(self.steps.iter().filter_map(|s| s.action.target()))
            .filter(|name| seen.insert(*name))
            .collect()
    }
}

fn default_delay_secs() -> f64 {
    DEFAULT_DELAY_SECS
}

/// A complete workflow: its stages and what a fresh configuration looks like
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    /// Default delay written into a newly initialised configuration
    #[serde(default = "default_delay_secs")]
    pub default_delay: f64,
    /// Wait after each completed stage; none when absent
    #[serde(default)]
    pub stage_gap: Option<Delay>,
    /// Positions to calibrate beyond those the stages require
    #[serde(default)]
    pub positions: Vec<String>,
    pub stages: Vec<StageDescriptor>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_delay: DEFAULT_DELAY_SECS,
            stage_gap: None,
            positions: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, stage: StageDescriptor) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_stage_gap(mut self, gap: Delay) -> Self {
        self.stage_gap = Some(gap);
        self
    }

    pub fn with_default_delay(mut self, seconds: f64) -> Self {
        self.default_delay = seconds;
        self
    }

    /// Position names in calibration order: explicit positions first, then
    /// every stage's requirements in stage order
    pub fn schema(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.positions
            .iter()
            .map(String::as_str)
            .chain(self.stages.iter().flat_map(|s| s.required_positions()))
            .filter(|name| seen.insert(*name))
            .collect()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Validate the definition
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StagePilotError::invalid_definition(
                "workflow name must not be empty",
            ));
        }
        check_seconds("default_delay", self.default_delay)?;
        if let Some(secs) = self.stage_gap.and_then(|d| d.extra_seconds()) {
            check_seconds("stage_gap", secs)?;
        }
        if self.stages.is_empty() {
            return Err(StagePilotError::invalid_definition(format!(
                "workflow '{}' has no stages",
                self.name
            )));
        }

        let mut stage_names = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(StagePilotError::invalid_definition(
                    "stage name must not be empty",
                ));
            }
            if !stage_names.insert(stage.name.as_str()) {
                return Err(StagePilotError::invalid_definition(format!(
                    "duplicate stage '{}'",
                    stage.name
                )));
            }
            for step in &stage.steps {
                if let UiAction::Wait { seconds } = step.action {
                    check_seconds(&format!("wait in stage '{}'", stage.name), seconds)?;
                }
                if let Some(secs) = step.delay.extra_seconds() {
                    check_seconds(&format!("delay in stage '{}'", stage.name), secs)?;
                }
            }
        }

        if self.schema().iter().any(|name| name.trim().is_empty()) {
            return Err(StagePilotError::invalid_definition(
                "position names must not be empty",
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML definition
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let definition: Self = toml::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Load a definition from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }
}

fn check_seconds(what: &str, secs: f64) -> Result<()> {
    if Duration::try_from_secs_f64(secs).is_ok() {
        Ok(())
    } else {
        Err(StagePilotError::invalid_definition(format!(
            "{} must be a non-negative number of seconds within range, got {}",
            what, secs
        )))
    }
}
