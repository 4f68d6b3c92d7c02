use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use nanoflow::errors::TaskError;
use nanoflow::exec::{Work, work_fn};

/// Work that fails its first `failures` attempts and then succeeds,
/// counting every attempt.
pub fn flaky_work(name: &str, failures: usize) -> (Work<usize>, Arc<AtomicUsize>) {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let name = name.to_string();

    let work = work_fn(move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        let name = name.clone();
        async move {
            if attempt <= failures {
                Err(TaskError::Failed {
                    task: name,
                    reason: format!("scripted failure on attempt {attempt}"),
                })
            } else {
                Ok(attempt)
            }
        }
    });

    (work, attempts)
}

/// Work that always fails.
pub fn failing_work(name: &str) -> (Work<usize>, Arc<AtomicUsize>) {
    flaky_work(name, usize::MAX)
}
