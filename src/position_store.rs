//! Position Store
//!
//! Owns the loaded configuration and flushes it through a `ConfigStore` on
//! every mutation, so no in-memory-only change survives a crash undetected.
//!
//! # Reset ordering
//!
//! `reset_all` writes the legacy log first and persists the cleared positions
//! second. These are two separate writes with no transaction. When the second
//! one fails, the in-memory values are restored and a marker line is appended
//! to the legacy log saying the reset above it never took effect.

use chrono::Local;
use tracing::{error, info, warn};

use crate::config_file::WorkflowConfig;
use crate::error::{Result, StagePilotError};
use crate::legacy_log;
use crate::position::{Coordinates, Position, PositionCollection};
use crate::store::ConfigStore;

/// Named-position store bound to a durable backend
#[derive(Debug)]
pub struct PositionStore<S: ConfigStore> {
    store: S,
    config: WorkflowConfig,
}

impl<S: ConfigStore> PositionStore<S> {
    /// Wrap an already loaded configuration
    pub fn new(store: S, config: WorkflowConfig) -> Self {
        Self { store, config }
    }

    /// Look up a position by name.
    ///
    /// # Errors
    ///
    /// `UnknownPosition` if `name` is not part of the schema.
    pub fn get(&self, name: &str) -> Result<Position> {
        self.config
            .positions
            .get(name)
            .cloned()
            .ok_or_else(|| StagePilotError::unknown_position(name))
    }

    /// Record a position and flush the whole configuration.
    ///
    /// `(-1, -1)` clears a single position.
    ///
    /// # Errors
    ///
    /// - `UnknownPosition` if `name` is not part of the schema
    /// - `InvalidCoordinates` for a partially set pair
    /// - `Persistence` if the flush fails; the in-memory value is rolled back
    pub fn set(&mut self, name: &str, x: i32, y: i32) -> Result<()> {
        let coordinates = Coordinates::new(x, y)?;
        let previous = self.config.positions.set(name, coordinates)?;

        if let Err(e) = self.store.flush(&self.config) {
            error!("Failed to persist position '{}': {}", name, e);
            // Restore so memory matches what is on disk
            if let Err(restore_err) = self.config.positions.set(name, previous) {
                warn!("Failed to roll back '{}': {}", name, restore_err);
            }
            return Err(e);
        }

        info!("Position '{}' captured: {}", name, coordinates);
        Ok(())
    }

    /// Log every current value to the legacy log, then unset every position.
    ///
    /// Calling this on an already cleared store still writes a new log block.
    ///
    /// # Errors
    ///
    /// `Persistence` if either the log append or the flush fails.
    pub fn reset_all(&mut self) -> Result<()> {
        let entry = legacy_log::reset_entry(Local::now(), &self.config.positions);
        self.store.append_legacy(&entry).map_err(|e| {
            error!("Failed to write legacy log, positions left unchanged: {}", e);
            e
        })?;

        let snapshot = self.config.positions.clone();
        self.config.positions.clear_all();

        if let Err(e) = self.store.flush(&self.config) {
            error!("Positions were logged but the reset could not be persisted: {}", e);
            self.config.positions = snapshot;
            let marker = legacy_log::unpersisted_marker(Local::now(), &e.to_string());
            if let Err(marker_err) = self.store.append_legacy(&marker) {
                warn!("Failed to append unpersisted-reset marker: {}", marker_err);
            }
            return Err(e);
        }

        info!(
            "All {} position(s) reset; previous values logged",
            self.config.positions.len()
        );
        Ok(())
    }

    /// True iff every position in the schema is set
    pub fn is_fully_configured(&self) -> bool {
        self.config.positions.is_fully_configured()
    }

    /// Names still holding the sentinel, in schema order
    pub fn unset_names(&self) -> Vec<&str> {
        self.config.positions.unset_names()
    }

    pub fn positions(&self) -> &PositionCollection {
        &self.config.positions
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Flush the current configuration without changing it
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush(&self.config)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store_with(names: &[&str]) -> PositionStore<MemoryStore> {
        let config = WorkflowConfig::new(0.0, names.iter().copied());
        let backend = MemoryStore::with_config(&config).unwrap();
        PositionStore::new(backend, config)
    }

    #[test]
    fn test_set_then_get() {
        let mut store = store_with(&["a", "b"]);
        store.set("a", 100, 200).unwrap();
        assert_eq!(store.get("a").unwrap().coordinates, Coordinates { x: 100, y: 200 });
        assert!(!store.is_fully_configured());
        store.set("b", 0, 0).unwrap();
        assert!(store.is_fully_configured());
        assert_eq!(store.store().flush_count(), 2);
    }

    #[test]
    fn test_get_unknown() {
        let store = store_with(&["a"]);
        assert!(matches!(
            store.get("nope"),
            Err(StagePilotError::UnknownPosition { .. })
        ));
    }

    #[test]
    fn test_set_rejects_partial_coordinates() {
        let mut store = store_with(&["a"]);
        assert!(matches!(
            store.set("a", -1, 4),
            Err(StagePilotError::InvalidCoordinates { .. })
        ));
        assert!(!store.get("a").unwrap().is_set());
    }

    #[test]
    fn test_failed_flush_rolls_back() {
        let config = WorkflowConfig::new(0.0, ["a"]);
        let mut backend = MemoryStore::with_config(&config).unwrap();
        backend.fail_flush(true);
        let mut store = PositionStore::new(backend, config);

        let err = store.set("a", 5, 5).unwrap_err();
        assert!(matches!(err, StagePilotError::Persistence(_)));
        assert!(!store.get("a").unwrap().is_set());
    }

    #[test]
    fn test_failed_flush_restores_previous_value() {
        let mut config = WorkflowConfig::new(0.0, ["a", "b"]);
        config
            .positions
            .set("a", Coordinates { x: 3, y: 4 })
            .unwrap();
        let mut backend = MemoryStore::with_config(&config).unwrap();
        backend.fail_flush(true);
        let mut store = PositionStore::new(backend, config.clone());

        assert!(store.set("a", 9, 9).is_err());
        assert_eq!(store.get("a").unwrap().coordinates, Coordinates { x: 3, y: 4 });
        assert_eq!(store.positions(), &config.positions);
    }

    #[test]
    fn test_reset_writes_marker_when_flush_fails() {
        let mut config = WorkflowConfig::new(0.0, ["a"]);
        config
            .positions
            .set("a", Coordinates { x: 7, y: 8 })
            .unwrap();
        let mut backend = MemoryStore::with_config(&config).unwrap();
        backend.fail_flush(true);
        let mut store = PositionStore::new(backend, config);

        assert!(store.reset_all().is_err());
        assert_eq!(store.get("a").unwrap().coordinates, Coordinates { x: 7, y: 8 });

        let entries = store.store().legacy_entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].contains("a: x=7, y=8"));
        assert!(entries[1].contains("NOT persisted"));
    }

    #[test]
    fn test_reset_with_failing_log_changes_nothing() {
        let mut config = WorkflowConfig::new(0.0, ["a"]);
        config
            .positions
            .set("a", Coordinates { x: 1, y: 2 })
            .unwrap();
        let mut backend = MemoryStore::with_config(&config).unwrap();
        backend.fail_legacy(true);
        let mut store = PositionStore::new(backend, config);

        assert!(store.reset_all().is_err());
        assert!(store.get("a").unwrap().is_set());
        assert_eq!(store.store().flush_count(), 0);
    }
}
