// src/flow/executor.rs

//! Async shell that drives graph runs.
//!
//! `start_run` returns immediately with a fresh run record; a spawned driver
//! task walks the graph in waves, dispatching every eligible node
//! concurrently and waiting for the whole wave to settle before computing
//! the next one. All scheduling decisions live in [`WavePlan`]; this module
//! only does IO and bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{ProcdagError, Result};
use crate::flow::node_runner::{NodeOutcome, NodeRunner, NodeSpec};
use crate::flow::run::ExecutionRun;
use crate::flow::wave::WavePlan;
use crate::graph::{validate, TaskGraph};
use crate::types::{NodeStatus, RunStatus};

pub struct WorkflowExecutor<R: NodeRunner> {
    inner: Arc<Inner<R>>,
}

impl<R: NodeRunner> Clone for WorkflowExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<R> {
    runner: R,
    kill_grace: Duration,
    runs: Mutex<HashMap<Uuid, ExecutionRun>>,
    cancels: Mutex<HashMap<Uuid, watch::Sender<bool>>>,
}

impl<R: NodeRunner + 'static> WorkflowExecutor<R> {
    pub fn new(runner: R, kill_grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                kill_grace,
                runs: Mutex::new(HashMap::new()),
                cancels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Validate and start executing `graph`. Returns the run record
    /// immediately; progress is observed by polling [`Self::run`].
    pub fn start_run(&self, graph: &TaskGraph) -> Result<ExecutionRun> {
        validate(graph)?;

        let run = ExecutionRun::new(graph);
        let run_id = run.id;

        let (cancel_tx, cancel_rx) = watch::channel(false);

        self.inner.runs.lock().insert(run_id, run.clone());
        self.inner.cancels.lock().insert(run_id, cancel_tx);

        info!(run_id = %run_id, graph_id = %graph.id, "starting graph run");

        let inner = Arc::clone(&self.inner);
        let graph = graph.clone();
        tokio::spawn(async move {
            drive(inner, graph, run_id, cancel_rx).await;
        });

        Ok(run)
    }

    pub fn run(&self, id: Uuid) -> Result<ExecutionRun> {
        self.inner
            .runs
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| ProcdagError::NotFound(format!("run {id}")))
    }

    /// All runs for one graph, oldest first.
    pub fn runs_for_graph(&self, graph_id: Uuid) -> Vec<ExecutionRun> {
        let mut runs: Vec<ExecutionRun> = self
            .inner
            .runs
            .lock()
            .values()
            .filter(|r| r.graph_id == graph_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    /// Request cancellation of a running run.
    ///
    /// Not-yet-started nodes will be skipped; in-flight nodes get the
    /// graceful-stop protocol. Returns the (still settling) run record.
    pub fn cancel(&self, id: Uuid) -> Result<ExecutionRun> {
        let snapshot = self.run(id)?;
        if snapshot.status.is_terminal() {
            return Err(ProcdagError::Conflict(format!(
                "run {id} already finished ({:?})",
                snapshot.status
            )));
        }

        info!(run_id = %id, "cancelling run");
        if let Some(tx) = self.inner.cancels.lock().get(&id) {
            let _ = tx.send(true);
        }

        self.run(id)
    }
}

impl<R> Inner<R> {
    fn with_run<F: FnOnce(&mut ExecutionRun)>(&self, id: Uuid, f: F) {
        if let Some(run) = self.runs.lock().get_mut(&id) {
            f(run);
        }
    }
}

async fn drive<R: NodeRunner>(
    inner: Arc<Inner<R>>,
    graph: TaskGraph,
    run_id: Uuid,
    cancel_rx: watch::Receiver<bool>,
) {
    let mut plan = WavePlan::new(&graph);
    let mut cancelled = false;

    loop {
        if *cancel_rx.borrow() {
            cancelled = true;
            break;
        }

        let wave = plan.eligible();
        if wave.is_empty() {
            break;
        }

        debug!(run_id = %run_id, ?wave, "dispatching wave");

        let dispatched_at = Utc::now();
        inner.with_run(run_id, |run| {
            for id in &wave {
                if let Some(rec) = run.nodes.get_mut(id) {
                    rec.status = NodeStatus::Running;
                    rec.started_at = Some(dispatched_at);
                }
            }
        });
        plan.mark_running(&wave);

        let mut handles = Vec::with_capacity(wave.len());
        for id in &wave {
            let Some(node) = graph.node(id) else {
                // Cannot happen on a validated graph.
                warn!(run_id = %run_id, node = %id, "scheduled node missing from graph");
                continue;
            };
            let spec = NodeSpec {
                run_id,
                node_id: node.id.clone(),
                kind: node.kind,
                command: node.command.clone(),
                kill_grace: inner.kill_grace,
            };
            let fut = inner.runner.run_node(spec, cancel_rx.clone());
            handles.push((id.clone(), tokio::spawn(fut)));
        }

        // Wave barrier: the next eligibility computation only happens once
        // every node dispatched above has reached a terminal status.
        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => NodeOutcome::Failed {
                    exit_code: -1,
                    error: Some(format!("node task panicked: {err}")),
                },
            };
            apply_outcome(&inner, run_id, &mut plan, &id, outcome, &mut cancelled);
        }
    }

    if *cancel_rx.borrow() {
        cancelled = true;
    }

    let finished_at = Utc::now();
    let skipped = plan.skip_idle();
    let overall = if cancelled {
        RunStatus::Canceled
    } else {
        plan.overall()
    };

    inner.with_run(run_id, |run| {
        for id in &skipped {
            if let Some(rec) = run.nodes.get_mut(id) {
                rec.status = NodeStatus::Skipped;
                rec.finished_at = Some(finished_at);
            }
        }
        run.status = overall;
        run.finished_at = Some(finished_at);
    });

    inner.cancels.lock().remove(&run_id);

    info!(run_id = %run_id, status = ?overall, "graph run finished");
}

fn apply_outcome<R>(
    inner: &Inner<R>,
    run_id: Uuid,
    plan: &mut WavePlan,
    node_id: &str,
    outcome: NodeOutcome,
    cancelled: &mut bool,
) {
    let (success, exit_code, error) = match outcome {
        NodeOutcome::Completed { exit_code } => (true, Some(exit_code), None),
        NodeOutcome::Failed { exit_code, error } => (false, Some(exit_code), error),
        NodeOutcome::Canceled { exit_code } => {
            *cancelled = true;
            (false, exit_code, Some("stopped by run cancellation".to_string()))
        }
    };

    let newly_skipped = plan.record(node_id, success);
    let now = Utc::now();

    inner.with_run(run_id, |run| {
        if let Some(rec) = run.nodes.get_mut(node_id) {
            rec.status = if success {
                NodeStatus::Completed
            } else {
                NodeStatus::Failed
            };
            rec.exit_code = exit_code;
            rec.error = error;
            rec.finished_at = Some(now);
        }
        for id in &newly_skipped {
            if let Some(rec) = run.nodes.get_mut(id) {
                rec.status = NodeStatus::Skipped;
                rec.finished_at = Some(now);
            }
        }
    });
}
