//! Workflow Façade
//!
//! Ties a `WorkflowDefinition` to its stored configuration and exposes the
//! operations the CLI needs: `reset`, `capture`, `calibrate`, `execute` and
//! `status`. Construction loads the configuration and fails fast; there is
//! no degraded mode. Every mutation is flushed before the call returns.

use serde::Serialize;
use tracing::{info, warn};

use crate::action::{ActionDispatcher, Sleeper};
use crate::calibration::{CalibrationController, CalibrationOptions, CalibrationReport};
use crate::capture::CaptureSource;
use crate::config_file::WorkflowConfig;
use crate::error::{Result, StagePilotError};
use crate::position::Position;
use crate::position_store::PositionStore;
use crate::runner::{RunReport, StageFailure, StageRunner};
use crate::stage::WorkflowDefinition;
use crate::store::ConfigStore;

/// Readiness of a single stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStatus {
    pub name: String,
    pub requires: Vec<String>,
    /// Every required position is set
    pub ready: bool,
}

/// Snapshot of a workflow's configuration, for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStatus {
    pub workflow: String,
    pub default_delay: f64,
    pub fully_configured: bool,
    pub positions: Vec<Position>,
    pub unset: Vec<String>,
    pub stages: Vec<StageStatus>,
}

/// A loaded workflow bound to its store
#[derive(Debug)]
pub struct Workflow<S: ConfigStore> {
    definition: WorkflowDefinition,
    positions: PositionStore<S>,
}

impl<S: ConfigStore> Workflow<S> {
    /// Load the configuration for `definition` from `store`.
    ///
    /// Positions the stored document lacks are added unset and flushed right
    /// away, so the key set is fixed from here on.
    ///
    /// # Errors
    ///
    /// - `InvalidDefinition` if the stage table is malformed
    /// - `ConfigurationLoad` if the document is missing, malformed, or holds
    ///   positions the workflow does not know
    /// - `Persistence` if newly added positions cannot be flushed
    pub fn open(definition: WorkflowDefinition, mut store: S) -> Result<Self> {
        definition.validate()?;
        let mut config = store.load()?;

        let schema = definition.schema();
        let (added, extra) = config.positions.conform_to_schema(&schema);
        if !extra.is_empty() {
            return Err(StagePilotError::configuration_load(format!(
                "{} holds positions unknown to workflow '{}': {}",
                store.describe(),
                definition.name,
                extra.join(", ")
            )));
        }

        let mut positions = PositionStore::new(store, config);
        if !added.is_empty() {
            warn!(
                "Configuration lacked position(s) {}; added as unset",
                added.join(", ")
            );
            positions.flush()?;
        }

        info!(
            "Loaded workflow '{}' ({} stage(s), {} position(s))",
            definition.name,
            definition.stages.len(),
            positions.positions().len()
        );
        Ok(Self {
            definition,
            positions,
        })
    }

    /// Write a fresh configuration with every position unset, then open it.
    ///
    /// `default_delay` overrides the definition's default.
    pub fn initialize(
        definition: WorkflowDefinition,
        mut store: S,
        default_delay: Option<f64>,
    ) -> Result<Self> {
        definition.validate()?;
        let delay = default_delay.unwrap_or(definition.default_delay);
        let config = WorkflowConfig::new(delay, definition.schema());
        config.validate()?;
        store.flush(&config)?;
        info!(
            "Initialized configuration for '{}' at {}",
            definition.name,
            store.describe()
        );
        Self::open(definition, store)
    }

    /// Log and clear every position
    pub fn reset(&mut self) -> Result<()> {
        self.positions.reset_all()
    }

    /// Record a single position
    pub fn capture(&mut self, name: &str, x: i32, y: i32) -> Result<()> {
        self.positions.set(name, x, y)
    }

    /// Interactively capture positions from `source`
    pub fn calibrate<C: CaptureSource + ?Sized>(
        &mut self,
        source: &mut C,
        options: CalibrationOptions,
    ) -> Result<CalibrationReport> {
        CalibrationController::new(&mut self.positions, options).run(source)
    }

    /// Run every stage once, in order, stopping at the first failure
    pub fn execute<D, Z>(
        &self,
        dispatcher: &mut D,
        sleeper: &mut Z,
    ) -> std::result::Result<RunReport, StageFailure>
    where
        D: ActionDispatcher + ?Sized,
        Z: Sleeper + ?Sized,
    {
        info!("Executing workflow '{}'", self.definition.name);
        StageRunner::new(&self.definition.stages)
            .with_stage_gap(self.definition.stage_gap)
            .execute(
                self.positions.positions(),
                self.positions.config().default_delay(),
                dispatcher,
                sleeper,
            )
    }

    pub fn get(&self, name: &str) -> Result<Position> {
        self.positions.get(name)
    }

    pub fn is_fully_configured(&self) -> bool {
        self.positions.is_fully_configured()
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn position_store(&self) -> &PositionStore<S> {
        &self.positions
    }

    pub fn status(&self) -> WorkflowStatus {
        let collection = self.positions.positions();
        let stages = self
            .definition
            .stages
            .iter()
            .map(|stage| {
                let requires: Vec<String> = stage
                    .required_positions()
                    .into_iter()
                    .map(String::from)
                    .collect();
                let ready = requires
                    .iter()
                    .all(|name| collection.get(name).is_some_and(Position::is_set));
                StageStatus {
                    name: stage.name.clone(),
                    requires,
                    ready,
                }
            })
            .collect();

        WorkflowStatus {
            workflow: self.definition.name.clone(),
            default_delay: self.positions.config().configuration.default_delay,
            fully_configured: collection.is_fully_configured(),
            positions: collection.iter().cloned().collect(),
            unset: collection.unset_names().into_iter().map(String::from).collect(),
            stages,
        }
    }

    pub fn into_store(self) -> S {
        self.positions.into_store()
    }
}
