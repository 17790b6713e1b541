//! UI actions and the dispatch boundary.
//!
//! A stage body is a list of `StageStep`s: one `UiAction` plus the `Delay`
//! applied after it. Actions name their target position; the runner
//! resolves it to coordinates before calling the `ActionDispatcher`.
//! Dispatch is fire-and-forget: the target application never acknowledges.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::position::Coordinates;

/// One UI interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UiAction {
    /// Single left click at a recorded position
    Click { target: String },
    /// Double left click at a recorded position
    DoubleClick { target: String },
    /// Type text into whatever has focus
    TypeText { text: String },
    /// Wait for an external operation (e.g. the application's own calibration)
    Wait { seconds: f64 },
}

impl UiAction {
    pub fn click(target: impl Into<String>) -> Self {
        Self::Click {
            target: target.into(),
        }
    }

    pub fn double_click(target: impl Into<String>) -> Self {
        Self::DoubleClick {
            target: target.into(),
        }
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        Self::TypeText { text: text.into() }
    }

    pub fn wait(seconds: f64) -> Self {
        Self::Wait { seconds }
    }

    /// The position this action needs, if any
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Click { target } | Self::DoubleClick { target } => Some(target),
            Self::TypeText { .. } | Self::Wait { .. } => None,
        }
    }
}

impl fmt::Display for UiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click { target } => write!(f, "click on '{}'", target),
            Self::DoubleClick { target } => write!(f, "double-click on '{}'", target),
            Self::TypeText { text } => write!(f, "type {:?}", text),
            Self::Wait { seconds } => write!(f, "wait {}s", seconds),
        }
    }
}

/// What to wait after an action
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delay {
    /// The configured `default_delay`
    #[default]
    Default,
    /// No wait at all
    #[serde(rename = "none")]
    Immediate,
    /// A fixed number of seconds, ignoring `default_delay`
    Fixed(f64),
    /// `default_delay` followed by extra seconds
    DefaultPlus(f64),
}

impl Delay {
    /// Resolve against the configured default delay
    pub fn resolve(&self, default_delay: Duration) -> Duration {
        match *self {
            Self::Default => default_delay,
            Self::Immediate => Duration::ZERO,
            Self::Fixed(secs) => seconds(secs),
            Self::DefaultPlus(secs) => default_delay.saturating_add(seconds(secs)),
        }
    }

    /// Seconds carried by this delay, for validation
    pub fn extra_seconds(&self) -> Option<f64> {
        match *self {
            Self::Fixed(secs) | Self::DefaultPlus(secs) => Some(secs),
            Self::Default | Self::Immediate => None,
        }
    }
}

/// Convert validated seconds.
///
/// Validation rejects anything `Duration` cannot hold; should such a value
/// slip through anyway, an oversized wait saturates instead of vanishing.
pub(crate) fn seconds(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) => duration,
        Err(_) if secs > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

/// Action-dispatch capability (mouse and keyboard injection)
pub trait ActionDispatcher {
    fn click(&mut self, at: Coordinates) -> anyhow::Result<()>;
    fn double_click(&mut self, at: Coordinates) -> anyhow::Result<()>;
    fn type_text(&mut self, text: &str) -> anyhow::Result<()>;
}

impl<D: ActionDispatcher + ?Sized> ActionDispatcher for &mut D {
    fn click(&mut self, at: Coordinates) -> anyhow::Result<()> {
        (**self).click(at)
    }

    fn double_click(&mut self, at: Coordinates) -> anyhow::Result<()> {
        (**self).double_click(at)
    }

    fn type_text(&mut self, text: &str) -> anyhow::Result<()> {
        (**self).type_text(text)
    }
}

/// Something that blocks the current thread for a while
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

impl<T: Sleeper + ?Sized> Sleeper for &mut T {
    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Real sleeps on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// An action as it reached the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchedAction {
    Click(Coordinates),
    DoubleClick(Coordinates),
    TypeText(String),
}

/// Logs and records actions instead of injecting input.
///
/// Backs `--dry-run`.
#[derive(Debug, Default, Clone)]
pub struct DryRunDispatcher {
    dispatched: Vec<DispatchedAction>,
}

impl DryRunDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> &[DispatchedAction] {
        &self.dispatched
    }
}

impl ActionDispatcher for DryRunDispatcher {
    fn click(&mut self, at: Coordinates) -> anyhow::Result<()> {
        info!("[DRY RUN] click at {}", at);
        self.dispatched.push(DispatchedAction::Click(at));
        Ok(())
    }

    fn double_click(&mut self, at: Coordinates) -> anyhow::Result<()> {
        info!("[DRY RUN] double-click at {}", at);
        self.dispatched.push(DispatchedAction::DoubleClick(at));
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> anyhow::Result<()> {
        info!("[DRY RUN] type {:?}", text);
        self.dispatched.push(DispatchedAction::TypeText(text.to_string()));
        Ok(())
    }
}
