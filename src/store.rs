//! Durable storage for a workflow's configuration and legacy log.
//!
//! `ConfigStore` is the explicit flush boundary: the position store calls
//! `flush` after every mutation and `append_legacy` before every reset.
//! `FileStore` is what the binary uses; `MemoryStore` keeps the same TOML
//! round-trip in memory and can be told to fail, for tests.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config_file::WorkflowConfig;
use crate::error::{Result, StagePilotError};

/// Storage backend for one workflow
pub trait ConfigStore {
    /// Read the configuration.
    ///
    /// # Errors
    ///
    /// `ConfigurationLoad` if the document is missing or malformed.
    fn load(&mut self) -> Result<WorkflowConfig>;

    /// Replace the stored configuration wholesale.
    ///
    /// # Errors
    ///
    /// `Persistence` if the write fails.
    fn flush(&mut self, config: &WorkflowConfig) -> Result<()>;

    /// Append a block to the legacy log.
    ///
    /// # Errors
    ///
    /// `Persistence` if the append fails.
    fn append_legacy(&mut self, entry: &str) -> Result<()>;

    /// Human-readable location, for diagnostics
    fn describe(&self) -> String;
}

impl<S: ConfigStore + ?Sized> ConfigStore for &mut S {
    fn load(&mut self) -> Result<WorkflowConfig> {
        (**self).load()
    }

    fn flush(&mut self, config: &WorkflowConfig) -> Result<()> {
        (**self).flush(config)
    }

    fn append_legacy(&mut self, entry: &str) -> Result<()> {
        (**self).append_legacy(entry)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Configuration and legacy log backed by two files
#[derive(Debug, Clone)]
pub struct FileStore {
    config_path: PathBuf,
    legacy_path: PathBuf,
}

impl FileStore {
    pub fn new(config_path: impl Into<PathBuf>, legacy_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            legacy_path: legacy_path.into(),
        }
    }

    /// `<dir>/metadata.toml` and `<dir>/legacy_positions.txt`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("metadata.toml"), dir.join("legacy_positions.txt"))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    /// True if the configuration file exists
    pub fn exists(&self) -> bool {
        self.config_path.is_file()
    }
}

impl ConfigStore for FileStore {
    fn load(&mut self) -> Result<WorkflowConfig> {
        WorkflowConfig::load_from_file(&self.config_path).map_err(|e| {
            StagePilotError::configuration_load(format!(
                "{}: {}",
                self.config_path.display(),
                e
            ))
        })
    }

    fn flush(&mut self, config: &WorkflowConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StagePilotError::persistence(format!("{}: {}", parent.display(), e))
                })?;
            }
        }
        config.save_to_file(&self.config_path).map_err(|e| {
            StagePilotError::persistence(format!("{}: {}", self.config_path.display(), e))
        })?;
        debug!("Flushed configuration to {}", self.config_path.display());
        Ok(())
    }

    fn append_legacy(&mut self, entry: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.legacy_path)
            .map_err(|e| {
                StagePilotError::persistence(format!("{}: {}", self.legacy_path.display(), e))
            })?;
        file.write_all(entry.as_bytes()).map_err(|e| {
            StagePilotError::persistence(format!("{}: {}", self.legacy_path.display(), e))
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.config_path.display().to_string()
    }
}

/// In-memory store holding the serialized TOML document
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    document: Option<String>,
    legacy: Vec<String>,
    flush_count: usize,
    fail_flush: bool,
    fail_legacy: bool,
}

impl MemoryStore {
    /// An empty store; `load` fails until something is flushed
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with `config`
    pub fn with_config(config: &WorkflowConfig) -> Result<Self> {
        Ok(Self {
            document: Some(config.to_toml_string()?),
            ..Self::default()
        })
    }

    /// A store pre-seeded with a raw document
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: Some(document.into()),
            ..Self::default()
        }
    }

    /// Make every following `flush` fail
    pub fn fail_flush(&mut self, fail: bool) {
        self.fail_flush = fail;
    }

    /// Make every following `append_legacy` fail
    pub fn fail_legacy(&mut self, fail: bool) {
        self.fail_legacy = fail;
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn legacy_entries(&self) -> &[String] {
        &self.legacy
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count
    }
}

impl ConfigStore for MemoryStore {
    fn load(&mut self) -> Result<WorkflowConfig> {
        let document = self
            .document
            .as_deref()
            .ok_or_else(|| StagePilotError::configuration_load("no configuration stored"))?;
        WorkflowConfig::from_toml_str(document)
            .map_err(|e| StagePilotError::configuration_load(e.to_string()))
    }

    fn flush(&mut self, config: &WorkflowConfig) -> Result<()> {
        if self.fail_flush {
            return Err(StagePilotError::persistence("simulated flush failure"));
        }
        let document = config
            .to_toml_string()
            .map_err(|e| StagePilotError::persistence(e.to_string()))?;
        self.document = Some(document);
        self.flush_count += 1;
        Ok(())
    }

    fn append_legacy(&mut self, entry: &str) -> Result<()> {
        if self.fail_legacy {
            return Err(StagePilotError::persistence("simulated legacy log failure"));
        }
        self.legacy.push(entry.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}
