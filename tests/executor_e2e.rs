// tests/executor_e2e.rs

mod common;
use crate::common::builders::{TaskConfigBuilder, WorkflowConfigBuilder};
use crate::common::{ScriptedProbe, init_tracing, with_timeout};

use std::error::Error;
use std::sync::{Arc, Mutex};

use tokio::time::Duration;

use nanoflow::config::WorkflowConfig;
use nanoflow::engine::{Executor, FailurePolicy, ProgressSnapshot, RunReport};
use nanoflow::errors::{NanoflowError, TaskError};
use nanoflow::exec::{RetrySchedule, Task, UpdateHook, work_fn};
use nanoflow::resource::DynamicPool;

type TestResult = Result<(), Box<dyn Error>>;

type Captured = Arc<Mutex<Vec<(String, String)>>>;

fn capture_hook() -> (UpdateHook, Captured) {
    let lines: Captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let hook: UpdateHook = Arc::new(move |task: &str, line: &[u8]| {
        sink.lock()
            .unwrap()
            .push((task.to_string(), String::from_utf8_lossy(line).into_owned()));
    });
    (hook, lines)
}

fn lines_of(captured: &Captured, task: &str) -> Vec<String> {
    captured
        .lock()
        .unwrap()
        .iter()
        .filter(|(t, _)| t == task)
        .map(|(_, line)| line.clone())
        .collect()
}

fn three_node_workflow() -> WorkflowConfig {
    WorkflowConfigBuilder::new("chain")
        .with_task("t1", TaskConfigBuilder::new("echo t1").build())
        .with_task("t2", TaskConfigBuilder::new("echo t2").after("t1").build())
        .with_task(
            "t3",
            TaskConfigBuilder::new("echo t3").after("t1").after("t2").build(),
        )
        .build()
}

#[tokio::test]
async fn chain_runs_to_completion() -> TestResult {
    init_tracing();

    let cfg = three_node_workflow();
    let executor = Executor::from_config(&cfg, None)?;
    assert_eq!(executor.name(), "chain");
    assert_eq!(
        executor.layer_names(),
        vec![vec!["t1"], vec!["t2"], vec!["t3"]]
    );

    let state = executor.state();
    assert_eq!(
        state.snapshot(),
        ProgressSnapshot {
            total: 3,
            running: 0,
            completed: 0,
            failed: 0
        }
    );

    let report = with_timeout(executor.run()).await;

    let expected = ProgressSnapshot {
        total: 3,
        running: 0,
        completed: 3,
        failed: 0,
    };
    assert_eq!(report.snapshot, expected);
    assert_eq!(state.snapshot(), expected);
    assert_eq!(state.progress(), "3/3");
    assert_eq!(report.layers_run, 3);
    assert_eq!(report.layers_total, 3);
    assert!(report.is_success());
    report.into_result()?;
    Ok(())
}

#[tokio::test]
async fn layers_run_in_strict_sequence() -> TestResult {
    init_tracing();

    let cfg = WorkflowConfigBuilder::new("barrier")
        .with_task("slow", TaskConfigBuilder::new("sleep 0.2; echo slow").build())
        .with_task("fast", TaskConfigBuilder::new("echo fast").build())
        .with_task("next", TaskConfigBuilder::new("echo next").after("fast").build())
        .build();

    let (hook, captured) = capture_hook();
    let executor = Executor::from_config(&cfg, Some(hook))?;
    assert_eq!(
        executor.layer_names(),
        vec![vec!["fast", "slow"], vec!["next"]]
    );

    let report = with_timeout(executor.run()).await;
    assert!(report.is_success());

    // "next" only depends on "fast", but waits for the whole first layer.
    let order: Vec<String> = captured
        .lock()
        .unwrap()
        .iter()
        .map(|(task, _)| task.clone())
        .collect();
    assert_eq!(order, vec!["fast", "slow", "next"]);
    Ok(())
}

fn failing_workflow(policy: FailurePolicy) -> WorkflowConfig {
    WorkflowConfigBuilder::new("partial")
        .on_failure(policy)
        .with_task("bad", TaskConfigBuilder::new("exit 3").build())
        .with_task("good", TaskConfigBuilder::new("sleep 0.2; echo good").build())
        .with_task("after", TaskConfigBuilder::new("echo after").after("good").build())
        .build()
}

#[tokio::test]
async fn halt_policy_drains_layer_and_skips_the_rest() -> TestResult {
    init_tracing();

    let (hook, captured) = capture_hook();
    let executor = Executor::from_config(&failing_workflow(FailurePolicy::Halt), Some(hook))?;
    let report = with_timeout(executor.run()).await;

    // The failing sibling did not cancel "good".
    assert_eq!(lines_of(&captured, "good"), vec!["good\n"]);
    assert!(lines_of(&captured, "after").is_empty());

    assert_eq!(report.layers_run, 1);
    assert_eq!(report.layers_total, 2);
    assert_eq!(report.failed_tasks(), vec!["bad"]);
    assert!(matches!(
        report.failures[0].error,
        TaskError::NonZeroExit { code: 3, .. }
    ));
    assert_eq!(
        report.snapshot,
        ProgressSnapshot {
            total: 3,
            running: 0,
            completed: 1,
            failed: 1
        }
    );

    match report.into_result() {
        Err(NanoflowError::RunFailed { failed }) => assert_eq!(failed, vec!["bad"]),
        other => panic!("expected RunFailed, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn continue_policy_runs_every_layer() -> TestResult {
    init_tracing();

    let (hook, captured) = capture_hook();
    let executor =
        Executor::from_config(&failing_workflow(FailurePolicy::Continue), Some(hook))?;
    let report = with_timeout(executor.run()).await;

    assert_eq!(lines_of(&captured, "after"), vec!["after\n"]);
    assert_eq!(report.layers_run, 2);
    assert_eq!(report.snapshot.completed, 2);
    assert_eq!(report.snapshot.failed, 1);
    assert!(!report.is_success());
    Ok(())
}

#[tokio::test]
async fn hook_receives_stdout_and_stderr_lines() -> TestResult {
    init_tracing();

    let cfg = WorkflowConfigBuilder::new("chatty")
        .with_task(
            "talk",
            TaskConfigBuilder::new("printf 'one\\ntwo\\n'; echo oops >&2").build(),
        )
        .build();

    let (hook, captured) = capture_hook();
    let report = with_timeout(Executor::from_config(&cfg, Some(hook))?.run()).await;
    assert!(report.is_success());

    let mut lines = lines_of(&captured, "talk");
    lines.sort();
    assert_eq!(lines, vec!["one\n", "oops\n", "two\n"]);
    Ok(())
}

#[tokio::test]
async fn custom_resources_are_exported_to_commands() -> TestResult {
    init_tracing();

    let cfg = WorkflowConfigBuilder::new("labelled")
        .with_resources(&["slot-a"])
        .with_task("first", TaskConfigBuilder::new("echo $NANOFLOW_RESOURCE").build())
        .with_task("second", TaskConfigBuilder::new("echo $NANOFLOW_RESOURCE").build())
        .build();

    let (hook, captured) = capture_hook();
    let report = with_timeout(Executor::from_config(&cfg, Some(hook))?.run()).await;
    assert!(report.is_success());

    assert_eq!(lines_of(&captured, "first"), vec!["slot-a\n"]);
    assert_eq!(lines_of(&captured, "second"), vec!["slot-a\n"]);
    Ok(())
}

#[tokio::test]
async fn accelerator_pool_sets_device_environment() -> TestResult {
    init_tracing();

    let cfg = WorkflowConfigBuilder::new("gpu")
        .with_gpus()
        .with_task(
            "train",
            TaskConfigBuilder::new("echo \"$CUDA_VISIBLE_DEVICES $FORCE_COLOR\"").build(),
        )
        .build();

    let probe = ScriptedProbe::new(&["3"]);
    let pool = Arc::new(DynamicPool::with_poll_interval(
        probe.clone(),
        Duration::from_millis(10),
    ));

    let (hook, captured) = capture_hook();
    let executor = Executor::from_config_with_pool(&cfg, pool.clone(), Some(hook))?;
    let report = with_timeout(executor.run()).await;
    assert!(report.is_success());

    assert_eq!(lines_of(&captured, "train"), vec!["3 1\n"]);
    assert!(probe.calls() >= 1);
    assert!(pool.in_use().is_empty());
    Ok(())
}

#[tokio::test]
async fn hand_built_executor_runs_closures() -> TestResult {
    init_tracing();

    let log = Arc::new(Mutex::new(Vec::new()));
    let step = |name: &'static str| {
        let log = Arc::clone(&log);
        Task::new(
            name,
            work_fn(move || {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push(name);
                    Ok::<(), TaskError>(())
                }
            }),
        )
        .with_retry(RetrySchedule::none())
    };

    let executor = Executor::new(
        "closures",
        vec![vec![step("a"), step("b")], vec![step("c")]],
        FailurePolicy::default(),
    );
    let report = with_timeout(executor.run()).await;

    assert!(report.is_success());
    assert_eq!(report.snapshot.completed, 3);
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[2], "c");
    Ok(())
}

#[test]
fn from_config_builds_one_task_per_node() -> TestResult {
    let cfg = WorkflowConfigBuilder::new("layers")
        .with_task("a", TaskConfigBuilder::new("true").build())
        .with_task("b", TaskConfigBuilder::new("true").build())
        .with_task("c", TaskConfigBuilder::new("true").after("a").after("b").build())
        .with_task("d", TaskConfigBuilder::new("true").after("a").build())
        .with_task("e", TaskConfigBuilder::new("true").after("b").build())
        .build();

    let executor = Executor::from_config(&cfg, None)?;
    assert_eq!(
        executor.layer_names(),
        vec![vec!["a", "b"], vec!["c", "d", "e"]]
    );
    assert_eq!(executor.state().total(), 5);
    Ok(())
}

fn sleeper(name: &'static str, secs: u64) -> Task<()> {
    Task::new(
        name,
        work_fn(move || async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            Ok::<(), TaskError>(())
        }),
    )
    .with_retry(RetrySchedule::none())
}

#[tokio::test(start_paused = true)]
async fn progress_is_readable_while_a_layer_runs() -> TestResult {
    init_tracing();

    let executor = Executor::new(
        "timed",
        vec![
            vec![sleeper("short", 10), sleeper("long", 20)],
            vec![sleeper("last", 5)],
        ],
        FailurePolicy::Halt,
    );
    let state = executor.state();
    let run = tokio::spawn(async move { executor.run().await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        state.snapshot(),
        ProgressSnapshot {
            total: 3,
            running: 2,
            completed: 0,
            failed: 0
        }
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(state.progress(), "1/3");
    assert_eq!(state.snapshot().running, 1);
    assert_eq!(state.snapshot().remaining(), 2);

    // t = 21: "long" settled, "last" running in the second layer.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(
        state.snapshot(),
        ProgressSnapshot {
            total: 3,
            running: 1,
            completed: 2,
            failed: 0
        }
    );

    let report = run.await?;
    assert!(report.is_success());
    assert_eq!(state.progress(), "3/3");
    assert_eq!(state.snapshot().running, 0);
    Ok(())
}

#[test]
fn failed_count_without_recorded_failure_is_not_success() {
    let report = RunReport {
        snapshot: ProgressSnapshot {
            total: 2,
            running: 0,
            completed: 1,
            failed: 1,
        },
        failures: Vec::new(),
        layers_run: 1,
        layers_total: 1,
    };

    assert!(!report.is_success());
    assert!(report.into_result().is_err());
}
