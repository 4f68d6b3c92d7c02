use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use nanoflow::errors::ProbeError;
use nanoflow::resource::dynamic::{ProbeFuture, ResourceProbe};
use nanoflow::resource::ResourceId;

/// A probe whose answer is set by the test.
///
/// Clones share state, so a test can keep one clone and hand the other to a
/// `DynamicPool`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbe {
    inner: Arc<Mutex<ProbeScript>>,
}

#[derive(Debug, Default)]
struct ProbeScript {
    available: BTreeSet<ResourceId>,
    fail_remaining: usize,
    calls: usize,
}

impl ScriptedProbe {
    pub fn new(ids: &[&str]) -> Self {
        let probe = Self::default();
        probe.set(ids);
        probe
    }

    /// Replace the reported set.
    pub fn set(&self, ids: &[&str]) {
        let mut script = self.inner.lock().unwrap();
        script.available = ids.iter().map(|id| ResourceId::from(*id)).collect();
    }

    /// Make the next `n` probes fail.
    pub fn fail_next(&self, n: usize) {
        self.inner.lock().unwrap().fail_remaining = n;
    }

    /// Number of times the probe was queried.
    pub fn calls(&self) -> usize {
        self.inner.lock().unwrap().calls
    }
}

impl ResourceProbe for ScriptedProbe {
    fn available(&self) -> ProbeFuture<'_> {
        let result = {
            let mut script = self.inner.lock().unwrap();
            script.calls += 1;
            if script.fail_remaining > 0 {
                script.fail_remaining -= 1;
                Err(ProbeError::QueryFailed {
                    code: 9,
                    stderr: "scripted probe failure".to_string(),
                })
            } else {
                Ok(script.available.clone())
            }
        };
        Box::pin(async move { result })
    }
}
