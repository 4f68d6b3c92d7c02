// src/config/mod.rs

//! Workflow configuration for nanoflow.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Expand `{placeholder}` templates and matrices (`matrix.rs`).
//! - Load a workflow file from disk (`loader.rs`).
//! - Validate it into a node/dependency map that layers cleanly (`validate.rs`).

pub mod loader;
pub mod matrix;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{Matrix, MatrixValue, RawWorkflowConfig, TaskConfig, WorkflowConfig};
