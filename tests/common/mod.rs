#![allow(dead_code)]

pub use procflow_test_utils::builders::{NodeConfigBuilder, ProcessBuilder};
pub use procflow_test_utils::harness::ProcessHarness;
pub use procflow_test_utils::{init_tracing, with_timeout};

use procflow::config::ProcessDefinition;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// start -> approve (userTask) -> done
/// expire (timer boundary on approve) -> expired
pub fn approval(interrupting: bool, duration: &str) -> ProcessDefinition {
    ProcessBuilder::new("approval")
        .start("start")
        .user_task("approve")
        .boundary("expire", "approve", interrupting, duration)
        .end("done")
        .end("expired")
        .flow("f1", "start", "approve")
        .flow("f2", "approve", "done")
        .flow("f3", "expire", "expired")
        .build()
}
