use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a supervised service, as exposed to API consumers.
///
/// `Stopped` is both the initial state and re-enterable; the terminal-ish
/// states (`Failed`, `Completed`, `Timeout`) can always transition back to
/// `Running` via start/restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Stopped,
    Running,
    Failed,
    Completed,
    Timeout,
}

impl ServiceState {
    /// Whether the state allows a fresh launch.
    pub fn is_startable(self) -> bool {
        !matches!(self, ServiceState::Running)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Stopped => "STOPPED",
            ServiceState::Running => "RUNNING",
            ServiceState::Failed => "FAILED",
            ServiceState::Completed => "COMPLETED",
            ServiceState::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

/// Distinguishes a state the registry has *requested* from one the process
/// backend has *observed*.
///
/// `start` flips a service to `Running`/`Requested` before the OS process is
/// confirmed alive; the backend's started callback promotes it to `Observed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatePhase {
    Requested,
    Observed,
}

/// Signal used to request graceful termination before escalating to KILL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StopSignal {
    Term,
    Int,
    Kill,
}

impl StopSignal {
    /// Raw signal number for `libc::kill`.
    pub fn as_raw(self) -> libc::c_int {
        match self {
            StopSignal::Term => libc::SIGTERM,
            StopSignal::Int => libc::SIGINT,
            StopSignal::Kill => libc::SIGKILL,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        StopSignal::Term
    }
}

impl FromStr for StopSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TERM" | "SIGTERM" => Ok(StopSignal::Term),
            "INT" | "SIGINT" => Ok(StopSignal::Int),
            "KILL" | "SIGKILL" => Ok(StopSignal::Kill),
            other => Err(format!(
                "invalid stop signal: {other} (expected \"TERM\", \"INT\" or \"KILL\")"
            )),
        }
    }
}

/// What the registry does when a supervised process exits on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never relaunch automatically.
    None,
    /// Relaunch after `FAILED` or `TIMEOUT` exits.
    OnFailure,
    /// Relaunch after any exit, including `COMPLETED`.
    Always,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::None
    }
}

impl RestartPolicy {
    /// Whether this policy asks for a relaunch after the given exit state.
    pub fn applies_to(self, state: ServiceState) -> bool {
        match self {
            RestartPolicy::None => false,
            RestartPolicy::OnFailure => {
                matches!(state, ServiceState::Failed | ServiceState::Timeout)
            }
            RestartPolicy::Always => matches!(
                state,
                ServiceState::Failed | ServiceState::Timeout | ServiceState::Completed
            ),
        }
    }
}

/// Runnable variant for a graph node. Selects how the node's command line is
/// interpreted; dispatch is a closed `match`, not inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Shell,
    Python,
    Node,
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Shell
    }
}

/// Per-node status within one execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped
        )
    }
}

/// Overall status of one execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    /// No node failed directly, but some were skipped. See the run-status
    /// notes in DESIGN.md.
    Partial,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}
