// src/flow/node_runner.rs

//! Per-node runnable abstraction.
//!
//! Production runs node commands as OS processes through
//! [`CommandNodeRunner`]; tests substitute a runner that resolves outcomes
//! without spawning anything.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::runner::stop::terminate;
use crate::types::{NodeKind, StopSignal};
use uuid::Uuid;

/// Everything a runner needs to execute one node.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub run_id: Uuid,
    pub node_id: String,
    pub kind: NodeKind,
    pub command: String,
    pub kill_grace: Duration,
}

/// Outcome of a single node execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Completed { exit_code: i32 },
    Failed { exit_code: i32, error: Option<String> },
    /// The run was cancelled while this node was in flight; the process got
    /// the graceful-stop protocol.
    Canceled { exit_code: Option<i32> },
}

/// Trait abstracting how a scheduled node is executed.
///
/// Returned futures own everything they need, so the executor can spawn one
/// per node in a wave.
pub trait NodeRunner: Send + Sync {
    fn run_node(
        &self,
        spec: NodeSpec,
        cancel: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = NodeOutcome> + Send>>;
}

/// Production node runner: one OS process per node.
#[derive(Debug, Clone)]
pub struct CommandNodeRunner;

impl CommandNodeRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CommandNodeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRunner for CommandNodeRunner {
    fn run_node(
        &self,
        spec: NodeSpec,
        cancel: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = NodeOutcome> + Send>> {
        Box::pin(run_node_process(spec, cancel))
    }
}

/// Map a node kind to its interpreter invocation.
fn node_command(kind: NodeKind, command_line: &str) -> Command {
    let (program, flag) = match kind {
        NodeKind::Shell => ("sh", "-c"),
        NodeKind::Python => ("python3", "-c"),
        NodeKind::Node => ("node", "-e"),
    };
    let mut cmd = Command::new(program);
    cmd.arg(flag).arg(command_line);
    cmd
}

async fn run_node_process(spec: NodeSpec, mut cancel: watch::Receiver<bool>) -> NodeOutcome {
    info!(
        run_id = %spec.run_id,
        node = %spec.node_id,
        kind = ?spec.kind,
        cmd = %spec.command,
        "starting node process"
    );

    let mut cmd = node_command(spec.kind, &spec.command);
    cmd.stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(run_id = %spec.run_id, node = %spec.node_id, error = %err, "failed to spawn node process");
            return NodeOutcome::Failed {
                exit_code: -1,
                error: Some(format!("spawning node process: {err}")),
            };
        }
    };

    let pid = child.id().unwrap_or(0);

    tokio::select! {
        status_res = child.wait() => {
            match status_res {
                Ok(status) => {
                    let code = status.code().unwrap_or(-1);
                    info!(
                        run_id = %spec.run_id,
                        node = %spec.node_id,
                        exit_code = code,
                        "node process exited"
                    );
                    if status.success() {
                        NodeOutcome::Completed { exit_code: code }
                    } else {
                        NodeOutcome::Failed { exit_code: code, error: None }
                    }
                }
                Err(err) => NodeOutcome::Failed {
                    exit_code: -1,
                    error: Some(format!("waiting for node process: {err}")),
                },
            }
        }

        _ = cancel_requested(&mut cancel) => {
            debug!(run_id = %spec.run_id, node = %spec.node_id, "run cancelled; stopping node process");
            let exit_code = terminate(&mut child, pid, StopSignal::Term, spec.kill_grace).await;
            NodeOutcome::Canceled { exit_code }
        }
    }
}

async fn cancel_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
