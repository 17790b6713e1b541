//! Calibration Controller
//!
//! Walks the schema in order and records a live pointer location for each
//! position. Every successful capture is persisted immediately, so a
//! half-finished calibration is a valid state that survives a crash.

use std::time::Duration;
use tracing::{info, warn};

use crate::capture::{CaptureEvent, CaptureSource};
use crate::error::Result;
use crate::position_store::PositionStore;
use crate::store::ConfigStore;

/// Knobs for one calibration pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalibrationOptions {
    /// Visit positions that are already set, not only unset ones
    pub recalibrate_all: bool,
    /// Give up waiting for a signal after this long; `None` waits forever
    pub timeout: Option<Duration>,
}

/// What a calibration pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalibrationReport {
    /// Positions recorded in this pass, in order
    pub captured: Vec<String>,
    /// Positions left as they were
    pub skipped: Vec<String>,
    /// The user stopped before every position was visited
    pub cancelled: bool,
}

impl CalibrationReport {
    /// Every visited position was captured and nothing was cancelled
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && !self.cancelled
    }
}

enum Visit {
    Captured,
    Skipped,
    Cancelled,
}

/// Drives a `CaptureSource` against a `PositionStore`
pub struct CalibrationController<'a, S: ConfigStore> {
    store: &'a mut PositionStore<S>,
    options: CalibrationOptions,
}

impl<'a, S: ConfigStore> CalibrationController<'a, S> {
    pub fn new(store: &'a mut PositionStore<S>, options: CalibrationOptions) -> Self {
        Self { store, options }
    }

    /// Visit each target position once.
    ///
    /// Terminates when every name has been captured or skipped, or when the
    /// source signals cancel.
    ///
    /// # Errors
    ///
    /// Only errors that make the capture source itself unusable (e.g. the
    /// terminal cannot enter raw mode). Persistence and capture failures for
    /// a single position go through the retry prompt instead.
    pub fn run<C: CaptureSource + ?Sized>(&mut self, source: &mut C) -> Result<CalibrationReport> {
        let targets: Vec<String> = self
            .store
            .positions()
            .iter()
            .filter(|p| self.options.recalibrate_all || !p.is_set())
            .map(|p| p.name.clone())
            .collect();

        info!("Calibrating {} position(s)", targets.len());
        let mut report = CalibrationReport::default();

        for name in targets {
            match self.visit(&name, source)? {
                Visit::Captured => report.captured.push(name),
                Visit::Skipped => report.skipped.push(name),
                Visit::Cancelled => {
                    warn!("Calibration cancelled at '{}'", name);
                    report.cancelled = true;
                    break;
                }
            }
        }

        info!(
            "Calibration finished: {} captured, {} skipped{}",
            report.captured.len(),
            report.skipped.len(),
            if report.cancelled { ", cancelled" } else { "" }
        );
        Ok(report)
    }

    fn visit<C: CaptureSource + ?Sized>(&mut self, name: &str, source: &mut C) -> Result<Visit> {
        loop {
            let failure = match source.wait_for_capture(name, self.options.timeout) {
                Ok(Some(CaptureEvent::Captured { x, y })) => match self.store.set(name, x, y) {
                    Ok(()) => return Ok(Visit::Captured),
                    Err(e) => format!("Could not record '{}' at ({}, {}): {}", name, x, y, e),
                },
                Ok(Some(CaptureEvent::Skip)) => {
                    info!("Skipped '{}'", name);
                    return Ok(Visit::Skipped);
                }
                Ok(Some(CaptureEvent::Cancel)) => return Ok(Visit::Cancelled),
                Ok(None) => format!("No capture signal for '{}'", name),
                Err(e) => format!("Capture failed for '{}': {}", name, e),
            };

            warn!("{}", failure);
            if !source.confirm_retry(name, &failure)? {
                info!("Skipped '{}' after failed capture", name);
                return Ok(Visit::Skipped);
            }
        }
    }
}
