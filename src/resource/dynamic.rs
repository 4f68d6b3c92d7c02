// src/resource/dynamic.rs

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use super::{AcquireFuture, DEFAULT_POLL_INTERVAL, Guards, ResourceId, ResourcePool};
use crate::errors::ProbeError;

pub type ProbeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BTreeSet<ResourceId>, ProbeError>> + Send + 'a>>;

/// Source of the set of resources that are available right now.
///
/// Production code uses [`NvidiaSmiProbe`](super::NvidiaSmiProbe); tests can
/// provide a probe whose answer they control.
pub trait ResourceProbe: Send + Sync {
    fn available(&self) -> ProbeFuture<'_>;
}

#[derive(Debug, Default)]
struct DynamicState {
    guards: Guards,
    /// Resources currently checked out; never pruned by a refresh.
    in_use: BTreeSet<ResourceId>,
}

/// Pool whose membership follows a [`ResourceProbe`].
///
/// Every acquisition attempt refreshes the membership first:
/// - newly reported resources are added,
/// - resources no longer reported are dropped, unless they are checked out,
///   in which case they stay until released and a later refresh omits them.
///
/// Probe errors are not retried here; they are returned from `acquire`.
#[derive(Debug)]
pub struct DynamicPool<P> {
    probe: P,
    state: Mutex<DynamicState>,
    poll_interval: Duration,
}

impl<P: ResourceProbe> DynamicPool<P> {
    pub fn new(probe: P) -> Self {
        Self::with_poll_interval(probe, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(probe: P, poll_interval: Duration) -> Self {
        Self {
            probe,
            state: Mutex::new(DynamicState::default()),
            poll_interval,
        }
    }

    /// Re-read the probe and update membership.
    pub async fn refresh(&self) -> Result<(), ProbeError> {
        let available = self.probe.available().await?;

        let mut state = self.lock();
        for id in available.iter() {
            if !state.guards.contains(id) {
                info!(resource = %id, "adding new resource");
                state.guards.insert_free(id.clone());
            }
        }

        let gone: Vec<ResourceId> = state
            .guards
            .ids()
            .filter(|id| !available.contains(*id) && !state.in_use.contains(*id))
            .cloned()
            .collect();
        for id in gone {
            info!(resource = %id, "removing resource");
            state.guards.remove(&id);
        }

        Ok(())
    }

    /// Current membership, sorted.
    pub fn resources(&self) -> Vec<ResourceId> {
        self.lock().guards.ids().cloned().collect()
    }

    /// Resources currently checked out, sorted.
    pub fn in_use(&self) -> Vec<ResourceId> {
        self.lock().in_use.iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, DynamicState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_take(&self) -> Option<ResourceId> {
        let mut state = self.lock();
        let id = state.guards.try_take()?;
        state.in_use.insert(id.clone());
        Some(id)
    }
}

impl<P: ResourceProbe> ResourcePool for DynamicPool<P> {
    fn acquire(&self) -> AcquireFuture<'_> {
        Box::pin(async move {
            loop {
                self.refresh().await?;
                if let Some(id) = self.try_take() {
                    info!(resource = %id, "acquired resource");
                    return Ok(id);
                }
                debug!(
                    poll_ms = self.poll_interval.as_millis() as u64,
                    "no free resource reported; waiting"
                );
                tokio::time::sleep(self.poll_interval).await;
            }
        })
    }

    fn release(&self, id: &ResourceId) {
        let mut state = self.lock();
        state.guards.give_back(id);
        state.in_use.remove(id);
    }
}
