// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `nanoflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nanoflow",
    version,
    about = "Run dependent shell tasks layer by layer on a shared resource pool.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NANOFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Execute a workflow.
    Run {
        /// Path to the workflow file (TOML).
        #[arg(value_name = "PATH", default_value_os_t = default_config_path())]
        config: PathBuf,

        /// Validate and print the layers, but don't execute any commands.
        #[arg(long)]
        try_run: bool,
    },
    /// Validate a workflow and print its layers without executing anything.
    TryRun {
        /// Path to the workflow file (TOML).
        #[arg(value_name = "PATH", default_value_os_t = default_config_path())]
        config: PathBuf,
    },
}

impl CliCommand {
    pub fn config_path(&self) -> &PathBuf {
        match self {
            CliCommand::Run { config, .. } | CliCommand::TryRun { config } => config,
        }
    }

    pub fn is_try_run(&self) -> bool {
        match self {
            CliCommand::Run { try_run, .. } => *try_run,
            CliCommand::TryRun { .. } => true,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
