//! Workflow configuration document.
//!
//! One TOML file per workflow:
//!
//! ```toml
//! [configuration]
//! default_delay = 1.0
//!
//! [positions.icon_position]
//! x = 120
//! y = 340
//! ```
//!
//! Positions are written in schema order. `-1` in both coordinates marks an
//! unset position.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::action::seconds;
use crate::error::{Result, StagePilotError};
use crate::position::PositionCollection;

/// Delay used when a new configuration is created without one
pub const DEFAULT_DELAY_SECS: f64 = 1.0;

/// The `[configuration]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds to wait after an action whose delay is `default`
    pub default_delay: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_delay: DEFAULT_DELAY_SECS,
        }
    }
}

/// Configuration that is loaded at construction and rewritten on every mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub configuration: Settings,
    #[serde(default)]
    pub positions: PositionCollection,
}

impl WorkflowConfig {
    /// Create a configuration with every schema position unset
    pub fn new<I, S>(default_delay: f64, schema: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            configuration: Settings { default_delay },
            positions: PositionCollection::from_schema(schema),
        }
    }

    /// The configured default delay
    pub fn default_delay(&self) -> Duration {
        seconds(self.configuration.default_delay)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let delay = self.configuration.default_delay;
        if Duration::try_from_secs_f64(delay).is_err() {
            return Err(StagePilotError::configuration_load(format!(
                "default_delay must be a non-negative number of seconds within range, got {}",
                delay
            )));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the document as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to a TOML file, replacing it wholesale
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_string()?;
        fs::write(&path, content)?;
        Ok(())
    }
}
