// src/resource/unlimited.rs

use super::{AcquireFuture, ResourceId, ResourcePool};

/// Pool without a limit: every `acquire` returns the same constant at once
/// and `release` does nothing.
///
/// Lets unconstrained tasks go through the same acquire/release path as
/// constrained ones.
#[derive(Debug, Clone)]
pub struct UnlimitedPool {
    resource: ResourceId,
}

impl UnlimitedPool {
    pub fn new(resource: impl Into<ResourceId>) -> Self {
        Self {
            resource: resource.into(),
        }
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }
}

impl Default for UnlimitedPool {
    fn default() -> Self {
        Self::new("unlimited")
    }
}

impl ResourcePool for UnlimitedPool {
    fn acquire(&self) -> AcquireFuture<'_> {
        let id = self.resource.clone();
        Box::pin(async move { Ok(id) })
    }

    fn release(&self, _id: &ResourceId) {}
}
