//! Error handling module for stagepilot
//!
//! Provides the typed error taxonomy shared by the position store, the
//! calibration controller, the stage runner and the workflow façade.
//! Runtime operations return these instead of printing and returning `false`,
//! so callers can tell a missing calibration from a failed click from a
//! failed disk write.

use thiserror::Error;

/// Main error type for stagepilot
#[derive(Error, Debug)]
pub enum StagePilotError {
    /// The configuration could not be loaded (fatal at construction)
    #[error("Configuration load error: {0}")]
    ConfigurationLoad(String),

    /// A position name outside the workflow schema was used
    #[error("Unknown position: {name}")]
    UnknownPosition { name: String },

    /// A stage ran before one of its required positions was calibrated
    #[error("Stage '{stage}' requires position '{position}', which is not set")]
    PreconditionNotMet { stage: String, position: String },

    /// The UI-action boundary raised while a stage body was running
    #[error("Stage '{stage}' failed while dispatching {action}: {reason}")]
    ActionDispatch {
        stage: String,
        action: String,
        reason: String,
    },

    /// A durable write (configuration or legacy log) failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Coordinates that are neither fully set nor the unset sentinel
    #[error("Invalid coordinates ({x}, {y}): both must be >= 0, or both -1")]
    InvalidCoordinates { x: i32, y: i32 },

    /// A workflow definition failed validation
    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// The input-capture boundary failed
    #[error("Capture error: {0}")]
    Capture(String),

    /// IO errors (file operations, terminal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse errors
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Result type alias for stagepilot operations
pub type Result<T> = std::result::Result<T, StagePilotError>;

// Convenient error constructors
impl StagePilotError {
    /// Create a configuration load error
    pub fn configuration_load(msg: impl Into<String>) -> Self {
        Self::ConfigurationLoad(msg.into())
    }

    /// Create an unknown position error
    pub fn unknown_position(name: impl Into<String>) -> Self {
        Self::UnknownPosition { name: name.into() }
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a workflow definition error
    pub fn invalid_definition(msg: impl Into<String>) -> Self {
        Self::InvalidDefinition(msg.into())
    }

    /// Create a capture error
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Returns true for failures detected before any UI action was issued
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::PreconditionNotMet { .. })
    }
}
