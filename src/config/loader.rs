// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawWorkflowConfig, WorkflowConfig};
use crate::errors::Result;

/// Load a workflow file and return the raw `RawWorkflowConfig`.
///
/// This only performs TOML deserialization; it does **not** expand matrices
/// or check the DAG. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawWorkflowConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a workflow file from path, expand it and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde`).
/// - Expands workflow and task matrices.
/// - Checks for unknown `deps` references and cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowConfig> {
    let raw = load_from_path(path)?;
    WorkflowConfig::try_from(raw)
}

/// Parse and validate a workflow from a TOML string.
pub fn load_from_str(contents: &str) -> Result<WorkflowConfig> {
    let raw: RawWorkflowConfig = toml::from_str(contents)?;
    WorkflowConfig::try_from(raw)
}

/// Workflow file used when none is given: `nanoflow.toml` in the current
/// working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("nanoflow.toml")
}
