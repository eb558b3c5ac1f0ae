//! Fixtures shared by the end-to-end tests.

#![allow(dead_code)]

use std::time::Duration;

use stagehand_core::{typed, ActorRef};
use stagehand_runtime::{ActorSystem, RuntimeConfig};
use stagehand_testing::{init_tracing, TestProbe};

pub const WAIT: Duration = Duration::from_secs(1);

/// What actors under test tell their probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report(pub String);

typed!(Report);

pub fn report(to: &ActorRef, what: impl Into<String>) {
    let _ = to.tell(Report(what.into()), None);
}

pub async fn next_report(probe: &mut TestProbe) -> String {
    probe.expect_msg::<Report>(WAIT).await.0
}

/// Collects `n` reports in arrival order.
pub async fn reports(probe: &mut TestProbe, n: usize) -> Vec<String> {
    let mut collected = Vec::with_capacity(n);
    for _ in 0..n {
        collected.push(next_report(probe).await);
    }
    collected
}

pub fn system() -> ActorSystem {
    system_with(RuntimeConfig::default())
}

pub fn system_with(config: RuntimeConfig) -> ActorSystem {
    init_tracing();
    match ActorSystem::new(config.with_shutdown_grace(Duration::from_secs(2))) {
        Ok(system) => system,
        Err(e) => panic!("actor system: {e}"),
    }
}
