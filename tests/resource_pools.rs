// tests/resource_pools.rs

mod common;
use crate::common::{ScriptedProbe, init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::time::{Duration, timeout};

use nanoflow::errors::ProbeError;
use nanoflow::resource::gpu::{parse_gpu_query, parse_gpu_readings};
use nanoflow::resource::{
    DynamicPool, NvidiaSmiProbe, ResourceId, ResourceLease, ResourcePool, ResourceProbe,
    StaticPool, UnlimitedPool,
};

type TestResult = Result<(), Box<dyn Error>>;

const POLL: Duration = Duration::from_millis(10);

fn ids(values: &[&str]) -> Vec<ResourceId> {
    values.iter().map(|v| ResourceId::from(*v)).collect()
}

#[tokio::test]
async fn static_pool_suspends_extra_acquirer_until_release() -> TestResult {
    init_tracing();

    let pool = Arc::new(StaticPool::with_poll_interval(["a", "b"], POLL));
    let first = pool.acquire().await?;
    let second = pool.acquire().await?;
    assert_ne!(first, second);
    assert_eq!(pool.in_use(), 2);

    // Third acquirer has to wait.
    assert!(
        timeout(Duration::from_millis(100), pool.acquire())
            .await
            .is_err()
    );

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!waiter.is_finished());

    pool.release(&first);
    let third = with_timeout(waiter).await??;
    assert_eq!(third, first);
    assert_eq!(pool.in_use(), 2);
    Ok(())
}

#[tokio::test]
async fn static_pool_never_exceeds_its_size() -> TestResult {
    init_tracing();

    let pool = Arc::new(StaticPool::with_poll_interval(["gpu0", "gpu1"], POLL));
    let holders = Arc::new(AtomicUsize::new(0));
    let max_holders = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::new();
    for _ in 0..8 {
        let pool = Arc::clone(&pool);
        let holders = Arc::clone(&holders);
        let max_holders = Arc::clone(&max_holders);
        workers.push(tokio::spawn(async move {
            let id = pool.acquire().await?;
            let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
            max_holders.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            holders.fetch_sub(1, Ordering::SeqCst);
            pool.release(&id);
            Ok::<_, ProbeError>(())
        }));
    }

    for worker in workers {
        with_timeout(worker).await??;
    }

    assert_eq!(max_holders.load(Ordering::SeqCst), 2);
    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.len(), 2);
    Ok(())
}

#[test]
#[should_panic(expected = "not checked out")]
fn releasing_a_free_resource_panics() {
    let pool = StaticPool::new(["a"]);
    pool.release(&ResourceId::from("a"));
}

#[test]
#[should_panic(expected = "not checked out")]
fn releasing_an_unknown_resource_panics() {
    let pool = StaticPool::new(["a"]);
    pool.release(&ResourceId::from("zzz"));
}

#[tokio::test]
async fn lease_releases_on_drop() -> TestResult {
    let pool = Arc::new(StaticPool::new(["only"]));
    let id = pool.acquire().await?;
    assert_eq!(pool.in_use(), 1);

    let lease = ResourceLease::new(pool.clone(), id);
    assert_eq!(lease.id().as_str(), "only");
    drop(lease);

    assert_eq!(pool.in_use(), 0);
    Ok(())
}

#[tokio::test]
async fn dynamic_pool_keeps_held_resource_until_released() -> TestResult {
    init_tracing();

    let probe = ScriptedProbe::new(&["0", "1"]);
    let pool = DynamicPool::with_poll_interval(probe.clone(), POLL);

    let held = pool.acquire().await?;
    assert_eq!(held, ResourceId::from("0"));
    assert_eq!(pool.in_use(), ids(&["0"]));

    // "0" disappears from the probe while checked out.
    probe.set(&["1"]);
    pool.refresh().await?;
    assert_eq!(pool.resources(), ids(&["0", "1"]));

    pool.release(&held);
    assert!(pool.in_use().is_empty());
    assert_eq!(pool.resources(), ids(&["0", "1"]));

    pool.refresh().await?;
    assert_eq!(pool.resources(), ids(&["1"]));
    Ok(())
}

#[tokio::test]
async fn dynamic_pool_adds_newly_reported_resources() -> TestResult {
    let probe = ScriptedProbe::new(&["1"]);
    let pool = DynamicPool::with_poll_interval(probe.clone(), POLL);

    pool.refresh().await?;
    assert_eq!(pool.resources(), ids(&["1"]));

    probe.set(&["1", "2"]);
    pool.refresh().await?;
    assert_eq!(pool.resources(), ids(&["1", "2"]));
    Ok(())
}

#[tokio::test]
async fn dynamic_pool_waits_for_a_resource_to_appear() -> TestResult {
    init_tracing();

    let probe = ScriptedProbe::new(&[]);
    let pool = Arc::new(DynamicPool::with_poll_interval(probe.clone(), POLL));

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());
    assert!(probe.calls() >= 2, "every attempt re-probes");

    probe.set(&["5"]);
    let id = with_timeout(waiter).await??;
    assert_eq!(id, ResourceId::from("5"));
    assert_eq!(pool.in_use(), ids(&["5"]));
    Ok(())
}

#[tokio::test]
async fn dynamic_pool_surfaces_probe_errors() {
    let probe = ScriptedProbe::new(&["0"]);
    probe.fail_next(1);
    let pool = DynamicPool::with_poll_interval(probe.clone(), POLL);

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, ProbeError::QueryFailed { code: 9, .. }));

    // The next attempt probes again and succeeds.
    let id = pool.acquire().await.unwrap();
    assert_eq!(id, ResourceId::from("0"));
}

#[tokio::test]
async fn unlimited_pool_hands_out_the_same_token() -> TestResult {
    let pool = UnlimitedPool::default();

    let mut taken = Vec::new();
    for _ in 0..5 {
        taken.push(with_timeout(pool.acquire()).await?);
    }
    assert!(taken.iter().all(|id| id == pool.resource()));
    assert_eq!(pool.resource().as_str(), "unlimited");

    for id in taken.iter() {
        pool.release(id);
    }
    pool.release(&ResourceId::from("anything"));
    Ok(())
}

#[test]
fn gpu_query_keeps_idle_devices_only() -> TestResult {
    let output = "\
0, 0, 10, 16000
1, 50, 8000, 16000
2, 3, 0, 0
3, 4, 400, 16000
";

    let free = parse_gpu_query(output, 0.05)?;
    let free: Vec<ResourceId> = free.into_iter().collect();
    assert_eq!(free, ids(&["0", "3"]));

    let readings = parse_gpu_readings(output)?;
    assert_eq!(readings.len(), 4);
    assert_eq!(readings[1].utilization, 0.5);
    assert_eq!(readings[2].memory_ratio, 1.0);
    Ok(())
}

#[test]
fn gpu_query_threshold_is_inclusive() -> TestResult {
    let free = parse_gpu_query("7, 5, 500, 10000\n", 0.05)?;
    assert!(free.contains(&ResourceId::from(7usize)));
    Ok(())
}

#[test]
fn gpu_query_ignores_blank_lines() -> TestResult {
    assert!(parse_gpu_query("\n  \n", 0.05)?.is_empty());
    Ok(())
}

#[test]
fn gpu_without_numeric_readings_counts_as_busy() -> TestResult {
    let output = "\
0, 0, 10, 16000
1, [N/A], 0, 16000
2, 0, [Not Supported], [Not Supported]
";

    let free: Vec<ResourceId> = parse_gpu_query(output, 0.05)?.into_iter().collect();
    assert_eq!(free, ids(&["0"]));

    let readings = parse_gpu_readings(output)?;
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].index, 0);
    Ok(())
}

#[test]
fn gpu_query_rejects_malformed_lines() {
    let err = parse_gpu_query("0, 12\n", 0.05).unwrap_err();
    assert!(matches!(err, ProbeError::Parse { .. }));

    let err = parse_gpu_query("zero, 0, 0, 100\n", 0.05).unwrap_err();
    match err {
        ProbeError::Parse { line, reason } => {
            assert_eq!(line, "zero, 0, 0, 100");
            assert!(reason.contains("index"));
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_probe_program_is_a_spawn_error() {
    let probe = NvidiaSmiProbe::default().with_program("nanoflow-no-such-program");
    assert_eq!(probe.threshold(), 0.05);

    let err = probe.available().await.unwrap_err();
    assert!(matches!(err, ProbeError::Spawn(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn failing_probe_program_is_a_query_error() {
    let probe = NvidiaSmiProbe::new(0.1).with_program("false");

    let err = probe.available().await.unwrap_err();
    assert!(matches!(err, ProbeError::QueryFailed { code: 1, .. }));
}
