#![allow(dead_code)]

//! Shared fixtures for the integration tests.

use std::sync::Arc;
use std::time::Duration;

use procdag::api::AppState;
use procdag::config::RunnerSection;
use procdag::flow::{ExecutionRun, WorkflowExecutor};
use procdag::graph::MemoryGraphStore;
use procdag::service::{MemoryServiceStore, ServiceRegistry};
use procdag::types::{RunStatus, ServiceState};
use procdag_test_utils::fake_backend::FakeProcessBackend;
use procdag_test_utils::fake_node_runner::FakeNodeRunner;
use uuid::Uuid;

pub use procdag_test_utils::init_tracing;

/// Fast runner timings so lifecycle tests settle quickly.
pub fn test_runner_cfg() -> RunnerSection {
    RunnerSection {
        metrics_interval_secs: 1,
        kill_grace_secs: 1,
    }
}

pub fn test_registry(backend: FakeProcessBackend) -> ServiceRegistry<FakeProcessBackend> {
    ServiceRegistry::new(
        backend,
        Box::new(MemoryServiceStore::new()),
        test_runner_cfg(),
    )
}

pub fn test_executor(runner: FakeNodeRunner) -> WorkflowExecutor<FakeNodeRunner> {
    WorkflowExecutor::new(runner, Duration::from_millis(100))
}

pub fn test_state(
    backend: FakeProcessBackend,
    runner: FakeNodeRunner,
) -> AppState<FakeProcessBackend, FakeNodeRunner> {
    AppState {
        registry: test_registry(backend),
        graphs: Arc::new(MemoryGraphStore::new()),
        executor: test_executor(runner),
    }
}

/// Poll until the service reaches `state`, failing the test after 2s.
pub async fn wait_for_state(
    registry: &ServiceRegistry<FakeProcessBackend>,
    id: Uuid,
    state: ServiceState,
) {
    for _ in 0..200 {
        if let Ok(entry) = registry.snapshot(id) {
            if entry.runtime.state == state {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let observed = registry.snapshot(id).map(|e| e.runtime.state);
    panic!("service {id} never reached {state} (last observed: {observed:?})");
}

/// Poll until the run's status is terminal, failing the test after 2s.
pub async fn wait_for_run_terminal(
    executor: &WorkflowExecutor<FakeNodeRunner>,
    run_id: Uuid,
) -> ExecutionRun {
    for _ in 0..200 {
        let run = executor.run(run_id).expect("run exists");
        if run.status != RunStatus::Running {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} never reached a terminal status");
}
