// src/resource/mod.rs

//! Resource pools.
//!
//! A pool hands out exclusive-use [`ResourceId`] tokens. All variants share
//! the [`ResourcePool`] contract:
//!
//! - `acquire` suspends until a token is free and returns it;
//! - `release` returns exactly one token previously obtained from `acquire`.
//!   Releasing a token that is not checked out is a programming error and
//!   panics.
//!
//! Variants:
//! - [`StaticPool`]: fixed membership.
//! - [`DynamicPool`]: membership re-read from a [`ResourceProbe`] on every
//!   acquisition attempt; checked-out tokens survive refreshes.
//! - [`UnlimitedPool`]: always returns the same constant immediately.
//!
//! Waiting is a fixed-interval poll, so there is no fairness between waiters.

pub mod dynamic;
pub mod gpu;
pub mod static_pool;
pub mod unlimited;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::errors::ProbeError;

pub use dynamic::{DynamicPool, ResourceProbe};
pub use gpu::NvidiaSmiProbe;
pub use static_pool::StaticPool;
pub use unlimited::UnlimitedPool;

/// Default delay between two scans of a busy pool.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Opaque token identifying one exclusive resource (device index, label, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<usize> for ResourceId {
    fn from(index: usize) -> Self {
        Self(index.to_string())
    }
}

pub type AcquireFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ResourceId, ProbeError>> + Send + 'a>>;

/// Shared acquire/release contract of all pool variants.
pub trait ResourcePool: Send + Sync {
    /// Wait for a free resource and take it.
    ///
    /// Only a failing probe (dynamic pools) makes this return an error.
    fn acquire(&self) -> AcquireFuture<'_>;

    /// Give back a resource obtained from [`acquire`](Self::acquire).
    ///
    /// # Panics
    ///
    /// If `id` is not currently checked out from this pool.
    fn release(&self, id: &ResourceId);
}

/// Exclusivity guards keyed by resource.
///
/// `true` means the resource is currently held.
#[derive(Debug, Default)]
pub(crate) struct Guards {
    slots: BTreeMap<ResourceId, bool>,
}

impl Guards {
    pub(crate) fn from_ids(ids: impl IntoIterator<Item = ResourceId>) -> Self {
        Self {
            slots: ids.into_iter().map(|id| (id, false)).collect(),
        }
    }

    /// Take the first free resource, if any.
    pub(crate) fn try_take(&mut self) -> Option<ResourceId> {
        let (id, held) = self.slots.iter_mut().find(|(_, held)| !**held)?;
        *held = true;
        Some(id.clone())
    }

    /// Mark `id` free again; panics on an unmatched release.
    pub(crate) fn give_back(&mut self, id: &ResourceId) {
        match self.slots.get_mut(id) {
            Some(held) if *held => *held = false,
            _ => panic!("release of resource '{id}' that is not checked out"),
        }
    }

    pub(crate) fn contains(&self, id: &ResourceId) -> bool {
        self.slots.contains_key(id)
    }

    pub(crate) fn insert_free(&mut self, id: ResourceId) {
        self.slots.entry(id).or_insert(false);
    }

    pub(crate) fn remove(&mut self, id: &ResourceId) {
        self.slots.remove(id);
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.slots.keys()
    }

    pub(crate) fn held_count(&self) -> usize {
        self.slots.values().filter(|held| **held).count()
    }
}

/// A checked-out resource that is released when dropped.
///
/// Dropping happens on every exit path of a task attempt, including
/// failure, panic of the awaiting future and cancellation.
pub struct ResourceLease {
    pool: Arc<dyn ResourcePool>,
    id: ResourceId,
}

impl ResourceLease {
    pub fn new(pool: Arc<dyn ResourcePool>, id: ResourceId) -> Self {
        Self { pool, id }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }
}

impl fmt::Debug for ResourceLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLease")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for ResourceLease {
    fn drop(&mut self) {
        self.pool.release(&self.id);
        info!(resource = %self.id, "released resource");
    }
}
