// src/runner/stop.rs

//! Graceful-stop protocol shared by service supervision and graph node
//! execution: configured signal first, KILL after the grace period.

use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

use crate::types::StopSignal;

/// Deliver `signal` to `pid` via kill(2).
///
/// A failure usually means the process already exited; that is fine, the
/// caller observes the real outcome through `wait`.
pub(crate) fn send_signal(pid: u32, signal: StopSignal) {
    // SAFETY: kill(2) with a validated signal number; no memory involved.
    let rc = unsafe { libc::kill(pid as libc::pid_t, signal.as_raw()) };
    if rc != 0 {
        debug!(pid, ?signal, "kill(2) failed; process may have exited already");
    }
}

/// Request graceful termination and escalate to KILL if the process does not
/// exit within `grace`. Returns the observed exit code, if any.
pub(crate) async fn terminate(
    child: &mut Child,
    pid: u32,
    signal: StopSignal,
    grace: Duration,
) -> Option<i32> {
    send_signal(pid, signal);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => status.code(),
        Ok(Err(err)) => {
            warn!(pid, error = %err, "waiting for signalled process failed");
            None
        }
        Err(_elapsed) => {
            warn!(pid, "process did not exit within grace period; sending KILL");
            if let Err(err) = child.kill().await {
                warn!(pid, error = %err, "failed to KILL process");
            }
            match child.wait().await {
                Ok(status) => status.code(),
                Err(_) => None,
            }
        }
    }
}
