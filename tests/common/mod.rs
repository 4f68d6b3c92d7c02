// tests/common/mod.rs
#![allow(dead_code, unused_imports)]

pub use nanoflow_test_utils::builders;
pub use nanoflow_test_utils::fake_probe::ScriptedProbe;
pub use nanoflow_test_utils::flaky_work::{failing_work, flaky_work};
pub use nanoflow_test_utils::{init_tracing, with_timeout};
