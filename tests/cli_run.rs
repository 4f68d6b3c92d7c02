// tests/cli_run.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use tempfile::tempdir;

use nanoflow::cli::{CliArgs, CliCommand, LogLevel};
use nanoflow::config::default_config_path;
use nanoflow::errors::NanoflowError;
use nanoflow::logging::parse_level_str;

type TestResult = Result<(), Box<dyn Error>>;

fn parse(args: &[&str]) -> CliArgs {
    CliArgs::try_parse_from(args).expect("arguments should parse")
}

fn write_workflow(dir: &Path, body: &str) -> std::io::Result<PathBuf> {
    let path = dir.join("nanoflow.toml");
    fs::write(&path, body)?;
    Ok(path)
}

#[test]
fn run_defaults_to_local_workflow_file() {
    let args = parse(&["nanoflow", "run"]);
    assert_eq!(args.command.config_path(), &default_config_path());

    let sub = parse(&["nanoflow", "try-run"]);
    assert_eq!(sub.command.config_path(), &default_config_path());
    assert!(!args.command.is_try_run());
    assert!(args.log_level.is_none());
}

#[test]
fn try_run_flag_and_subcommand_agree() {
    let flag = parse(&["nanoflow", "run", "wf.toml", "--try-run"]);
    assert!(flag.command.is_try_run());
    assert_eq!(flag.command.config_path(), &PathBuf::from("wf.toml"));

    let sub = parse(&["nanoflow", "try-run", "wf.toml"]);
    assert!(matches!(sub.command, CliCommand::TryRun { .. }));
    assert!(sub.command.is_try_run());
}

#[test]
fn log_level_is_global() {
    let args = parse(&["nanoflow", "run", "--log-level", "debug"]);
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));

    assert!(CliArgs::try_parse_from(["nanoflow", "run", "--log-level", "loud"]).is_err());
    assert!(CliArgs::try_parse_from(["nanoflow"]).is_err());
}

#[test]
fn level_strings_are_case_insensitive() {
    assert_eq!(parse_level_str("DEBUG"), Some(tracing::Level::DEBUG));
    assert_eq!(parse_level_str(" warning "), Some(tracing::Level::WARN));
    assert_eq!(parse_level_str("verbose"), None);
}

#[tokio::test]
async fn try_run_executes_nothing() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let marker = dir.path().join("touched");
    let path = write_workflow(
        dir.path(),
        &format!(
            r#"
name = "dry"

[tasks.touch]
command = "touch {}"
"#,
            marker.display()
        ),
    )?;

    let path = path.to_string_lossy().into_owned();
    nanoflow::run(parse(&["nanoflow", "try-run", &path])).await?;
    assert!(!marker.exists());

    nanoflow::run(parse(&["nanoflow", "run", &path])).await?;
    assert!(marker.exists());
    Ok(())
}

#[tokio::test]
async fn failed_run_reports_failed_tasks() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = write_workflow(
        dir.path(),
        r#"
name = "doomed"
retry = []

[tasks.ok]
command = "true"

[tasks.broken]
command = "exit 1"
"#,
    )?;

    let path = path.to_string_lossy().into_owned();
    match nanoflow::run(parse(&["nanoflow", "run", &path])).await {
        Err(NanoflowError::RunFailed { failed }) => assert_eq!(failed, vec!["broken"]),
        other => panic!("expected RunFailed, got {other:?}"),
    }
    Ok(())
}
