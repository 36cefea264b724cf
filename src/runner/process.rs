// src/runner/process.rs

//! Production process backend.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::runner::metrics::CpuTracker;
use crate::runner::stop::terminate;
use crate::runner::{ExitReport, LaunchSpec, ProcessBackend, SupervisorEvent};

/// Runs service commands through `sh -c` on the host.
#[derive(Debug, Default)]
pub struct ShellProcessBackend;

impl ShellProcessBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessBackend for ShellProcessBackend {
    fn supervise(
        &self,
        spec: LaunchSpec,
        events: mpsc::Sender<SupervisorEvent>,
        stop: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(supervise_process(spec, events, stop))
    }
}

async fn supervise_process(
    spec: LaunchSpec,
    events: mpsc::Sender<SupervisorEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let service_id = spec.service_id;

    let report = run_lifecycle(&spec, &events, &mut stop).await;

    let _ = events
        .send(SupervisorEvent::Exited { service_id, report })
        .await;
}

async fn run_lifecycle(
    spec: &LaunchSpec,
    events: &mpsc::Sender<SupervisorEvent>,
    stop: &mut watch::Receiver<bool>,
) -> ExitReport {
    // Pre-exec gate: must finish successfully before the main command may
    // start. An operator stop during the hook aborts the launch.
    if let Some(pre) = &spec.pre_exec_command {
        info!(service = %spec.name, cmd = %pre, "running pre-exec command");
        match run_hook(pre, spec, Some(&mut *stop)).await {
            HookResult::Success => {}
            HookResult::Stopped => return ExitReport::Stopped { exit_code: None },
            HookResult::Failed(code, err) => {
                warn!(service = %spec.name, exit_code = code, "pre-exec command failed; aborting launch");
                return ExitReport::Failed {
                    exit_code: code,
                    error: Some(err),
                };
            }
        }
    }

    let mut cmd = build_command(&spec.exec_command, spec);
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(service = %spec.name, error = %err, "failed to spawn process");
            return ExitReport::Failed {
                exit_code: -1,
                error: Some(format!("spawning process: {err}")),
            };
        }
    };

    let pid = child.id().unwrap_or(0);
    info!(service = %spec.name, pid, cmd = %spec.exec_command, "process started");

    let _ = events
        .send(SupervisorEvent::Started {
            service_id: spec.service_id,
            pid,
        })
        .await;

    attach_output_loggers(&mut child, &spec.name);

    let mut cpu = CpuTracker::new(pid);
    let mut sampler = tokio::time::interval(spec.metrics_interval);

    let timeout = spec.timeout;
    let timeout_fut = async move {
        match timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(timeout_fut);

    loop {
        tokio::select! {
            status_res = child.wait() => {
                return match status_res {
                    Ok(status) => {
                        let code = status.code().unwrap_or(-1);
                        info!(service = %spec.name, pid, exit_code = code, "process exited");
                        if spec.valid_exit_codes.contains(&code) {
                            let post_exec_error = run_post_exec(spec).await;
                            ExitReport::Completed { exit_code: code, post_exec_error }
                        } else {
                            ExitReport::Failed { exit_code: code, error: None }
                        }
                    }
                    Err(err) => ExitReport::Failed {
                        exit_code: -1,
                        error: Some(format!("waiting for process: {err}")),
                    },
                };
            }

            _ = sampler.tick() => {
                if let Some(metrics) = cpu.sample() {
                    let _ = events
                        .send(SupervisorEvent::Sample {
                            service_id: spec.service_id,
                            metrics,
                        })
                        .await;
                }
            }

            _ = stop_requested(stop) => {
                info!(service = %spec.name, pid, signal = ?spec.stop_signal, "stop requested");
                let exit_code = terminate(&mut child, pid, spec.stop_signal, spec.kill_grace).await;
                return ExitReport::Stopped { exit_code };
            }

            _ = &mut timeout_fut => {
                warn!(service = %spec.name, pid, "timeout elapsed; stopping process");
                terminate(&mut child, pid, spec.stop_signal, spec.kill_grace).await;
                return ExitReport::TimedOut;
            }
        }
    }
}

/// Resolves when an operator stop has been requested. Parks forever if the
/// stop handle was dropped, so supervision falls back to the other branches.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

enum HookResult {
    Success,
    Stopped,
    Failed(i32, String),
}

/// Run a pre/post hook command to completion under the service's
/// environment. `stop` is only honoured for pre-exec.
async fn run_hook(
    command: &str,
    spec: &LaunchSpec,
    stop: Option<&mut watch::Receiver<bool>>,
) -> HookResult {
    let mut cmd = build_command(command, spec);
    cmd.stdout(Stdio::null()).stderr(Stdio::null()).kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => return HookResult::Failed(-1, format!("spawning hook: {err}")),
    };

    let status = match stop {
        Some(stop) => {
            tokio::select! {
                status = child.wait() => status,
                _ = stop_requested(stop) => {
                    let pid = child.id().unwrap_or(0);
                    terminate(&mut child, pid, spec.stop_signal, spec.kill_grace).await;
                    return HookResult::Stopped;
                }
            }
        }
        None => child.wait().await,
    };

    match status {
        Ok(status) if status.success() => HookResult::Success,
        Ok(status) => {
            let code = status.code().unwrap_or(-1);
            HookResult::Failed(code, format!("hook exited with code {code}"))
        }
        Err(err) => HookResult::Failed(-1, format!("waiting for hook: {err}")),
    }
}

async fn run_post_exec(spec: &LaunchSpec) -> Option<String> {
    let post = spec.post_exec_command.as_deref()?;
    info!(service = %spec.name, cmd = %post, "running post-exec command");

    match run_hook(post, spec, None).await {
        HookResult::Success => None,
        HookResult::Stopped => None,
        HookResult::Failed(code, err) => {
            // Recorded on the runtime, but a COMPLETED result stands.
            warn!(service = %spec.name, exit_code = code, "post-exec command failed");
            Some(err)
        }
    }
}

/// Build a `sh -c` command carrying the service's working dir, environment
/// and (numeric) user/group.
fn build_command(command_line: &str, spec: &LaunchSpec) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command_line);

    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    #[cfg(unix)]
    {
        // Privilege switching needs numeric ids; name resolution is not
        // attempted (see DESIGN.md).
        if let Some(uid) = spec.user.as_deref().and_then(|u| u.parse::<u32>().ok()) {
            cmd.uid(uid);
        } else if spec.user.is_some() {
            debug!(service = %spec.name, "non-numeric user; launching without uid switch");
        }
        if let Some(gid) = spec.group.as_deref().and_then(|g| g.parse::<u32>().ok()) {
            cmd.gid(gid);
        } else if spec.group.is_some() {
            debug!(service = %spec.name, "non-numeric group; launching without gid switch");
        }
    }

    cmd
}

/// Always consume stdout/stderr so pipe buffers don't fill; log at debug.
fn attach_output_loggers(child: &mut Child, name: &str) {
    if let Some(stdout) = child.stdout.take() {
        let service = name.to_string();
        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(service = %service, "stdout: {}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let service = name.to_string();
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(service = %service, "stderr: {}", line);
            }
        });
    }
}
