//! Legacy position log.
//!
//! Append-only, human-readable record of position values discarded by a
//! reset. The engine only ever writes it.

use chrono::{DateTime, Local};

use crate::position::PositionCollection;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render the block written before a reset.
pub fn reset_entry(timestamp: DateTime<Local>, positions: &PositionCollection) -> String {
    let mut entry = format!("[{}] Positions reset:\n", timestamp.format(TIMESTAMP_FORMAT));
    for position in positions.iter() {
        entry.push_str(&format!(
            "  {}: x={}, y={}\n",
            position.name, position.coordinates.x, position.coordinates.y
        ));
    }
    entry
}

/// Render the marker appended when a logged reset could not be persisted.
pub fn unpersisted_marker(timestamp: DateTime<Local>, reason: &str) -> String {
    format!(
        "[{}] Reset above was NOT persisted: {}\n",
        timestamp.format(TIMESTAMP_FORMAT),
        reason
    )
}
