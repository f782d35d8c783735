//! Configuration loading traits and types.
//!
//! Every RatExp binary reads its settings from TOML. Any type implementing
//! `serde::de::DeserializeOwned` gets [`ConfigLoader`] for free.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ratexp_common::config::{ConfigLoader, ConfigError, RigIdentity};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct RigFile {
//!     rig: RigIdentity,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let file = RigFile::load(Path::new("rig.toml"))?;
//!     println!("Rig: {}", file.rig.rig_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// File could not be read or parsed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, per-transition tracing.
    Trace,
    /// Debug information useful during rig bring-up.
    Debug,
    /// General information about engine operation.
    #[default]
    Info,
    /// Overruns, dropped records and rejected uploads.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Identity of the rig running the engine.
///
/// # TOML Example
///
/// ```toml
/// [rig]
/// log_level = "debug"
/// rig_name = "training-box-03"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigIdentity {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Human-readable rig identifier, used in log lines.
    pub rig_name: String,
}

impl Default for RigIdentity {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            rig_name: "ratexp".to_string(),
        }
    }
}

impl RigIdentity {
    /// Validate the identity.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `rig_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rig_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "rig_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if the file is unreadable or the TOML is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::ParseError(format!("{}: {e}", path.display()))
            }
        })?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "read config file");
        Self::from_toml_str(&content)
    }

    /// Parse configuration from an in-memory TOML document.
    fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
