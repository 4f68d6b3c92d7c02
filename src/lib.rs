// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod resource;
pub mod types;

use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{WorkflowConfig, load_and_validate};
use crate::dag::layer_nodes;
use crate::engine::Executor;
use crate::errors::Result;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - workflow loading, matrix expansion and validation
/// - try-run listing, or
/// - executor construction (resource pool + tasks + layers) and the run
///
/// A run in which any task failed terminally returns
/// [`NanoflowError::RunFailed`](crate::errors::NanoflowError::RunFailed).
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(args.command.config_path())?;

    if args.command.is_try_run() {
        print_try_run(&cfg)?;
        return Ok(());
    }

    info!(workflow = %cfg.name, tasks = cfg.tasks.len(), "building executor");
    let executor = Executor::from_config(&cfg, None)?;
    let report = executor.run().await;
    report.into_result()
}

/// Print each layer and the command lines it would run.
fn print_try_run(cfg: &WorkflowConfig) -> Result<()> {
    let layers = layer_nodes(&cfg.to_nodes())?;

    println!("nanoflow try-run: {}", cfg.name);
    println!("  resources = {:?}", cfg.resources);
    println!("  on_failure = {:?}", cfg.on_failure);
    println!("  retry = {:?}", cfg.retry);
    println!();

    for (i, layer) in layers.iter().enumerate() {
        println!("Layer {i}");
        for node in layer {
            if let Some(task) = cfg.tasks.get(node) {
                println!("  {node}: {}", task.command_line());
            }
        }
    }

    debug!("try-run complete (no execution)");
    Ok(())
}
