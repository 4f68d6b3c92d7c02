// src/resource/static_pool.rs

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use super::{AcquireFuture, DEFAULT_POLL_INTERVAL, Guards, ResourceId, ResourcePool};

/// Pool over a fixed set of resources.
///
/// Never hands out more than `len()` resources at once; further callers poll
/// every `poll_interval` until something is released.
#[derive(Debug)]
pub struct StaticPool {
    guards: Mutex<Guards>,
    poll_interval: Duration,
}

impl StaticPool {
    pub fn new<I, R>(resources: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        Self::with_poll_interval(resources, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval<I, R>(resources: I, poll_interval: Duration) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        let guards = Guards::from_ids(resources.into_iter().map(Into::into));
        Self {
            guards: Mutex::new(guards),
            poll_interval,
        }
    }

    /// Number of resources in the pool.
    pub fn len(&self) -> usize {
        self.lock().ids().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of resources currently checked out.
    pub fn in_use(&self) -> usize {
        self.lock().held_count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Guards> {
        self.guards.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResourcePool for StaticPool {
    fn acquire(&self) -> AcquireFuture<'_> {
        Box::pin(async move {
            loop {
                let taken = self.lock().try_take();
                if let Some(id) = taken {
                    info!(resource = %id, "acquired resource");
                    return Ok(id);
                }
                debug!(
                    poll_ms = self.poll_interval.as_millis() as u64,
                    "all resources busy; waiting"
                );
                tokio::time::sleep(self.poll_interval).await;
            }
        })
    }

    fn release(&self, id: &ResourceId) {
        self.lock().give_back(id);
    }
}
