//! stagepilot library
//!
//! Staged UI-automation engine: a named-position store with calibration and
//! reset, and a stage runner that replays timed clicks and keystrokes at the
//! recorded coordinates.

pub mod action;
pub mod calibration;
pub mod capture;
pub mod cli;
pub mod config_file;
#[cfg(feature = "desktop")]
pub mod desktop;
pub mod error;
pub mod legacy_log;
pub mod position;
pub mod position_store;
pub mod runner;
pub mod stage;
pub mod store;
pub mod workflow;
pub mod workflows;

// Re-export main types for convenience
pub use action::{
    ActionDispatcher, Delay, DispatchedAction, DryRunDispatcher, Sleeper, ThreadSleeper, UiAction,
};
pub use calibration::{CalibrationController, CalibrationOptions, CalibrationReport};
pub use capture::{
    CaptureEvent, CaptureSender, CaptureSource, ChannelCaptureSource, ClickCaptureSource,
    PointerLocator, PointerSample, PointerSampler, TerminalCaptureSource,
};
pub use config_file::{Settings, WorkflowConfig};
#[cfg(feature = "desktop")]
pub use desktop::{EnigoBackend, GlobalPointer};
pub use error::{Result, StagePilotError};
pub use position::{Coordinates, Position, PositionCollection, UNSET};
pub use position_store::PositionStore;
pub use runner::{RunContext, RunReport, RunState, RunTransitionError, StageFailure, StageRunner};
pub use stage::{StageDescriptor, StageStep, WorkflowDefinition};
pub use store::{ConfigStore, FileStore, MemoryStore};
pub use workflow::{StageStatus, Workflow, WorkflowStatus};
pub use workflows::BuiltinWorkflow;
