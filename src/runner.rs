//! Stage Runner
//!
//! Executes an ordered stage table exactly once per `execute()` call and
//! stops at the first failure.
//!
//! # Run Flow
//!
//! ```text
//! Idle
//!   ↓
//! Running(0) → Running(1) → … → Running(n-1)
//!   ↓                                ↓
//! Aborted(i)  (first failure)     Completed
//! ```
//!
//! Transitions only move forward; `Completed` and `Aborted` are terminal.
//! Every `execute()` starts over from `Idle`, there is no resume.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::action::{seconds, ActionDispatcher, Delay, Sleeper, UiAction};
use crate::error::StagePilotError;
use crate::position::{Coordinates, PositionCollection};
use crate::stage::StageDescriptor;

/// Per-run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No stage started yet
    Idle,
    /// Stage at this index is running
    Running(usize),
    /// Every stage finished (terminal)
    Completed,
    /// Stage at this index failed (terminal)
    Aborted(usize),
}

impl RunState {
    /// Returns true for `Completed` and `Aborted`
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running(i) => write!(f, "running stage {}", i + 1),
            Self::Completed => write!(f, "completed"),
            Self::Aborted(i) => write!(f, "aborted at stage {}", i + 1),
        }
    }
}

/// Errors that can occur during run state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunTransitionError {
    /// Attempted to leave a terminal state
    #[error("Cannot transition from terminal state ({from})")]
    FromTerminalState { from: RunState },

    /// Attempted a transition that is not the next step of the run
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: RunState, to: RunState },
}

/// Tracks one run through the stage table and validates every transition.
#[derive(Debug, Clone)]
pub struct RunContext {
    current: RunState,
    stage_count: usize,
    history: Vec<RunState>,
}

impl RunContext {
    pub fn new(stage_count: usize) -> Self {
        Self {
            current: RunState::Idle,
            stage_count,
            history: vec![RunState::Idle],
        }
    }

    #[inline]
    pub fn current(&self) -> RunState {
        self.current
    }

    /// Every state this run has been in, oldest first
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// The state that follows `current` on success
    fn next_state(&self) -> Option<RunState> {
        let next_index = match self.current {
            RunState::Idle => 0,
            RunState::Running(i) => i + 1,
            RunState::Completed | RunState::Aborted(_) => return None,
        };
        if next_index < self.stage_count {
            Some(RunState::Running(next_index))
        } else {
            Some(RunState::Completed)
        }
    }

    /// Move to the next stage, or to `Completed` after the last one.
    ///
    /// # Errors
    ///
    /// `FromTerminalState` if the run already ended.
    pub fn advance(&mut self) -> Result<RunState, RunTransitionError> {
        let next = self
            .next_state()
            .ok_or(RunTransitionError::FromTerminalState { from: self.current })?;
        self.record(next);
        Ok(next)
    }

    /// Abort the running stage.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if the run already ended
    /// - `InvalidTransition` if no stage is running
    pub fn abort(&mut self) -> Result<RunState, RunTransitionError> {
        match self.current {
            RunState::Running(i) => {
                let aborted = RunState::Aborted(i);
                self.record(aborted);
                Ok(aborted)
            }
            RunState::Idle => Err(RunTransitionError::InvalidTransition {
                from: self.current,
                to: RunState::Aborted(0),
            }),
            terminal => Err(RunTransitionError::FromTerminalState { from: terminal }),
        }
    }

    fn record(&mut self, state: RunState) {
        self.current = state;
        self.history.push(state);
    }
}

/// Outcome of a run where every stage completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub completed_stages: Vec<String>,
    pub actions_dispatched: usize,
    /// Total wait requested from the sleeper
    pub waited: Duration,
    pub history: Vec<RunState>,
}

/// The first failing stage of a run
#[derive(Error, Debug)]
#[error("Workflow failed at stage {} '{stage}': {source}", .index + 1)]
pub struct StageFailure {
    /// Zero-based index of the failing stage
    pub index: usize,
    pub stage: String,
    /// Stages that completed before the failure
    pub completed_stages: Vec<String>,
    #[source]
    pub source: StagePilotError,
}

impl StageFailure {
    /// True if the stage failed its precondition and issued no action
    pub fn is_precondition(&self) -> bool {
        self.source.is_precondition()
    }
}

/// Runs a stage table against a position collection
#[derive(Debug, Clone, Copy)]
pub struct StageRunner<'a> {
    stages: &'a [StageDescriptor],
    stage_gap: Option<Delay>,
}

impl<'a> StageRunner<'a> {
    pub fn new(stages: &'a [StageDescriptor]) -> Self {
        Self {
            stages,
            stage_gap: None,
        }
    }

    /// Wait between consecutive stages
    pub fn with_stage_gap(mut self, gap: Option<Delay>) -> Self {
        self.stage_gap = gap;
        self
    }

    /// Run every stage in order, stopping at the first failure.
    ///
    /// No stage after a failing one runs, and completed stages are not
    /// rolled back.
    pub fn execute<D, Z>(
        &self,
        positions: &PositionCollection,
        default_delay: Duration,
        dispatcher: &mut D,
        sleeper: &mut Z,
    ) -> Result<RunReport, StageFailure>
    where
        D: ActionDispatcher + ?Sized,
        Z: Sleeper + ?Sized,
    {
        let mut ctx = RunContext::new(self.stages.len());
        let mut report = RunReport {
            completed_stages: Vec::with_capacity(self.stages.len()),
            actions_dispatched: 0,
            waited: Duration::ZERO,
            history: Vec::new(),
        };

        let mut state = advance(&mut ctx);
        while let RunState::Running(index) = state {
            let stage = &self.stages[index];
            info!(
                "Stage {}/{} '{}' starting",
                index + 1,
                self.stages.len(),
                stage.name
            );

            let outcome = match check_preconditions(stage, positions) {
                Ok(()) => run_body(
                    stage,
                    positions,
                    default_delay,
                    &mut *dispatcher,
                    &mut *sleeper,
                    &mut report,
                ),
                Err(e) => Err(e),
            };

            if let Err(source) = outcome {
                error!("Workflow failed at stage '{}': {}", stage.name, source);
                let _ = ctx.abort();
                return Err(StageFailure {
                    index,
                    stage: stage.name.clone(),
                    completed_stages: report.completed_stages,
                    source,
                });
            }

            info!("Stage '{}' completed", stage.name);
            report.completed_stages.push(stage.name.clone());

            state = advance(&mut ctx);
            if let (RunState::Running(_), Some(gap)) = (state, self.stage_gap) {
                let wait = gap.resolve(default_delay);
                sleeper.sleep(wait);
                report.waited = report.waited.saturating_add(wait);
            }
        }

        info!(
            "Workflow completed: {} stage(s), {} action(s)",
            report.completed_stages.len(),
            report.actions_dispatched
        );
        report.history = ctx.history().to_vec();
        Ok(report)
    }
}

fn advance(ctx: &mut RunContext) -> RunState {
    // Only called on a non-terminal context
    ctx.advance().unwrap_or(RunState::Completed)
}

fn check_preconditions(
    stage: &StageDescriptor,
    positions: &PositionCollection,
) -> Result<(), StagePilotError> {
    for name in stage.required_positions() {
        let is_set = positions.get(name).is_some_and(|p| p.is_set());
        if !is_set {
            return Err(StagePilotError::PreconditionNotMet {
                stage: stage.name.clone(),
                position: name.to_string(),
            });
        }
    }
    Ok(())
}

fn resolve_target(
    stage: &StageDescriptor,
    positions: &PositionCollection,
    target: &str,
) -> Result<Coordinates, StagePilotError> {
    positions
        .get(target)
        .filter(|p| p.is_set())
        .map(|p| p.coordinates)
        .ok_or_else(|| StagePilotError::PreconditionNotMet {
            stage: stage.name.clone(),
            position: target.to_string(),
        })
}

fn run_body<D, Z>(
    stage: &StageDescriptor,
    positions: &PositionCollection,
    default_delay: Duration,
    dispatcher: &mut D,
    sleeper: &mut Z,
    report: &mut RunReport,
) -> Result<(), StagePilotError>
where
    D: ActionDispatcher + ?Sized,
    Z: Sleeper + ?Sized,
{
    for step in &stage.steps {
        debug!("Stage '{}': {}", stage.name, step.action);
        let dispatched = match &step.action {
            UiAction::Click { target } => {
                let at = resolve_target(stage, positions, target)?;
                dispatcher.click(at).map(|()| true)
            }
            UiAction::DoubleClick { target } => {
                let at = resolve_target(stage, positions, target)?;
                dispatcher.double_click(at).map(|()| true)
            }
            UiAction::TypeText { text } => dispatcher.type_text(text).map(|()| true),
            UiAction::Wait { seconds: secs } => {
                let wait = seconds(*secs);
                sleeper.sleep(wait);
                report.waited = report.waited.saturating_add(wait);
                Ok(false)
            }
        }
        .map_err(|e| StagePilotError::ActionDispatch {
            stage: stage.name.clone(),
            action: step.action.to_string(),
            reason: format!("{:#}", e),
        })?;

        if dispatched {
            report.actions_dispatched += 1;
        }

        let wait = step.delay.resolve(default_delay);
        sleeper.sleep(wait);
        report.waited = report.waited.saturating_add(wait);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_context_happy_path() {
        let mut ctx = RunContext::new(2);
        assert_eq!(ctx.current(), RunState::Idle);
        assert_eq!(ctx.advance(), Ok(RunState::Running(0)));
        assert_eq!(ctx.advance(), Ok(RunState::Running(1)));
        assert_eq!(ctx.advance(), Ok(RunState::Completed));
        assert!(ctx.current().is_terminal());
        assert!(matches!(
            ctx.advance(),
            Err(RunTransitionError::FromTerminalState { .. })
        ));
        assert_eq!(ctx.history().len(), 4);
    }

    #[test]
    fn test_run_context_abort() {
        let mut ctx = RunContext::new(3);
        assert!(matches!(
            ctx.abort(),
            Err(RunTransitionError::InvalidTransition { .. })
        ));
        ctx.advance().unwrap();
        ctx.advance().unwrap();
        assert_eq!(ctx.abort(), Ok(RunState::Aborted(1)));
        assert!(ctx.advance().is_err());
        assert!(ctx.abort().is_err());
    }

    #[test]
    fn test_empty_table_completes_immediately() {
        let mut ctx = RunContext::new(0);
        assert_eq!(ctx.advance(), Ok(RunState::Completed));
    }

    #[test]
    fn test_display() {
        assert_eq!(RunState::Running(0).to_string(), "running stage 1");
        assert_eq!(RunState::Aborted(2).to_string(), "aborted at stage 3");
    }
}
