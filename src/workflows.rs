//! Built-in workflow registry.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::action::{Delay, UiAction};
use crate::stage::{StageDescriptor, WorkflowDefinition};

/// Seconds the eye tracker needs to finish its own calibration routine
pub const EYETRACKER_CALIBRATION_SECS: f64 = 30.0;

/// Seconds of gaze data recorded per run
pub const EYETRACKING_RECORD_SECS: f64 = 60.0;

/// Workflows that ship with the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BuiltinWorkflow {
    /// Launch the sender from its desktop icon and start it with random data
    MessageSender,
    /// Open the project, calibrate, record and export in the eye-tracking suite
    Eyetracking,
}

impl BuiltinWorkflow {
    /// One-line summary for `list`
    pub const fn description(self) -> &'static str {
        match self {
            Self::MessageSender => "Double-click the sender icon, pick random data and start",
            Self::Eyetracking => "Calibrate, record and analyse an eye-tracking session",
        }
    }

    /// The stage table of this workflow
    pub fn definition(self) -> WorkflowDefinition {
        match self {
            Self::MessageSender => message_sender(),
            Self::Eyetracking => eyetracking(),
        }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

fn message_sender() -> WorkflowDefinition {
    WorkflowDefinition::new(BuiltinWorkflow::MessageSender.to_string()).stage(
        StageDescriptor::new("launch_sender")
            .step(UiAction::double_click("icon_position"), Delay::DefaultPlus(2.0))
            // '1' selects random data, 's' starts execution
            .step(UiAction::type_text("1\n"), Delay::Default)
            .step(UiAction::type_text("s\n"), Delay::Immediate),
    )
}

fn eyetracking() -> WorkflowDefinition {
    WorkflowDefinition::new(BuiltinWorkflow::Eyetracking.to_string())
        .with_stage_gap(Delay::Default)
        .stage(
            StageDescriptor::new("open_project")
                .step(UiAction::double_click("project_icon"), Delay::DefaultPlus(5.0))
                .step(UiAction::click("open_button"), Delay::Default),
        )
        .stage(
            StageDescriptor::new("calibration")
                .step(UiAction::click("calibrate_button"), Delay::Default)
                .step(UiAction::wait(EYETRACKER_CALIBRATION_SECS), Delay::Immediate),
        )
        .stage(
            StageDescriptor::new("eyetracking_record")
                .step(UiAction::click("record_button"), Delay::Default)
                .step(UiAction::wait(EYETRACKING_RECORD_SECS), Delay::Immediate)
                .step(UiAction::click("stop_button"), Delay::Default),
        )
        .stage(
            StageDescriptor::new("data_analysis")
                .step(UiAction::click("analysis_button"), Delay::Default)
                .step(UiAction::click("export_button"), Delay::Default),
        )
}
