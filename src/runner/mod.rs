// src/runner/mod.rs

//! Process execution backend.
//!
//! The service registry talks to a [`ProcessBackend`] instead of spawning
//! OS processes directly. Production uses [`ShellProcessBackend`]; tests
//! provide their own implementation that emits [`SupervisorEvent`]s without
//! touching the OS.
//!
//! One `supervise` call covers one full process lifecycle: pre-exec hook,
//! main command, metric sampling, timeout policy, stop protocol, post-exec
//! hook. The future resolves only after the exit has been observed, which is
//! what makes restart non-overlapping for the caller.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::types::StopSignal;

pub mod metrics;
pub mod process;
pub mod stop;

pub use process::ShellProcessBackend;

/// Flattened launch instructions handed to a process backend.
///
/// Derived from a service definition by the registry; the backend never
/// reads definitions itself.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub service_id: Uuid,
    pub name: String,
    pub exec_command: String,
    pub pre_exec_command: Option<String>,
    pub post_exec_command: Option<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    /// Resolved environment, in definition order.
    pub env: Vec<(String, String)>,
    pub stop_signal: StopSignal,
    pub valid_exit_codes: BTreeSet<i32>,
    pub timeout: Option<Duration>,
    pub metrics_interval: Duration,
    pub kill_grace: Duration,
}

/// Why a supervised process lifecycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReport {
    /// Exit code was in `valid_exit_codes`. A failing post-exec hook is
    /// carried here; it never flips the result.
    Completed {
        exit_code: i32,
        post_exec_error: Option<String>,
    },
    /// Launch failure or an exit code outside `valid_exit_codes`.
    Failed {
        exit_code: i32,
        error: Option<String>,
    },
    /// `timeout` elapsed and the stop protocol was applied.
    TimedOut,
    /// An operator stop request ended the process.
    Stopped { exit_code: Option<i32> },
}

/// Events flowing from a process backend to the registry.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// The main command is confirmed alive.
    Started { service_id: Uuid, pid: u32 },
    /// Periodic resource sample for a running process.
    Sample {
        service_id: Uuid,
        metrics: BTreeMap<String, f64>,
    },
    /// The lifecycle ended. Always the final event of a `supervise` call
    /// that got past spawning.
    Exited {
        service_id: Uuid,
        report: ExitReport,
    },
}

/// Trait abstracting how one service process lifecycle is executed.
pub trait ProcessBackend: Send + Sync {
    /// Drive one full lifecycle for `spec`, emitting events along the way.
    ///
    /// `stop` flips to `true` when an operator requested a stop; the
    /// implementation applies the graceful-stop protocol and reports
    /// `ExitReport::Stopped`.
    fn supervise(
        &self,
        spec: LaunchSpec,
        events: mpsc::Sender<SupervisorEvent>,
        stop: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}
