//! Startup configuration: engine TOML plus per-machine matrix files.
//!
//! The engine file is an [`EngineConfig`]. Each `[[machines]]` entry names
//! a matrix file, relative paths resolved against the engine file's
//! directory. Matrix files are JSON (`.json`) or TOML (anything else) and
//! are validated here, before any tick runs.

use std::path::{Path, PathBuf};

use ratexp_common::config::{ConfigError, ConfigLoader};
use ratexp_common::fsm::config::EngineConfig;
use ratexp_common::fsm::matrix::{MatrixBlob, MatrixError, StateMatrix};
use thiserror::Error;
use tracing::{debug, info};

// ─── Error Type ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse matrix file {path}: {detail}")]
    MatrixParse { path: PathBuf, detail: String },

    #[error("matrix for machine {machine} ({path}) is invalid: {source}")]
    MatrixInvalid {
        machine: usize,
        path: PathBuf,
        #[source]
        source: MatrixError,
    },
}

// ─── Loaded Config Bundle ───────────────────────────────────────────

/// Validated startup configuration.
#[derive(Debug)]
pub struct LoadedConfig {
    pub engine: EngineConfig,
    /// `(machine index, matrix)` for each configured machine.
    pub matrices: Vec<(usize, MatrixBlob)>,
}

/// Load and validate the engine file and every matrix it names.
pub fn load_config(path: &Path) -> Result<LoadedConfig, LoadError> {
    let engine = EngineConfig::load(path)?;
    engine.validate()?;
    let base = path.parent().unwrap_or(Path::new("."));
    let loaded = resolve_matrices(engine, base)?;
    info!(
        path = %path.display(),
        rig = %loaded.engine.rig.rig_name,
        machines = loaded.engine.num_machines,
        matrices = loaded.matrices.len(),
        "configuration loaded"
    );
    Ok(loaded)
}

/// Load from an in-memory engine document; matrix paths resolve against
/// `base`.
pub fn load_config_from_str(content: &str, base: &Path) -> Result<LoadedConfig, LoadError> {
    let engine = EngineConfig::from_toml_str(content)?;
    engine.validate()?;
    resolve_matrices(engine, base)
}

fn resolve_matrices(engine: EngineConfig, base: &Path) -> Result<LoadedConfig, LoadError> {
    let mut matrices = Vec::with_capacity(engine.machines.len());
    for entry in &engine.machines {
        let path = if entry.matrix.is_absolute() {
            entry.matrix.clone()
        } else {
            base.join(&entry.matrix)
        };
        let blob = load_matrix_file(&path)?;
        StateMatrix::from_blob(blob.clone()).map_err(|source| LoadError::MatrixInvalid {
            machine: entry.index,
            path: path.clone(),
            source,
        })?;
        debug!(machine = entry.index, path = %path.display(), "matrix file accepted");
        matrices.push((entry.index, blob));
    }
    Ok(LoadedConfig { engine, matrices })
}

/// Parse a matrix file without validating it.
pub fn load_matrix_file(path: &Path) -> Result<MatrixBlob, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |detail: String| LoadError::MatrixParse {
        path: path.to_path_buf(),
        detail,
    };
    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))
    } else {
        toml::from_str(&content).map_err(|e| parse_err(e.to_string()))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
