// src/service/registry.rs

//! Service registry: owns definition + runtime pairs and mediates every
//! lifecycle transition.
//!
//! Operations on one service id are strictly serialized through a per-id
//! async lock; operations on different ids proceed independently. The
//! registry never touches a process itself: it flattens the definition into
//! a [`LaunchSpec`](crate::runner::LaunchSpec), hands it to the process
//! backend and applies the events that come back.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RunnerSection;
use crate::errors::{ProcdagError, Result};
use crate::runner::{ExitReport, ProcessBackend, SupervisorEvent};
use crate::service::model::{ServiceDefinition, ServiceDraft};
use crate::service::runtime::ServiceRuntime;
use crate::service::store::ServiceStore;
use crate::types::{ServiceState, StatePhase};

/// Definition plus last-observed runtime, as handed to API consumers.
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub definition: ServiceDefinition,
    pub runtime: ServiceRuntime,
}

pub struct ServiceRegistry<B> {
    inner: Arc<RegistryInner<B>>,
}

impl<B> Clone for ServiceRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct RegistryInner<B> {
    backend: B,
    store: Box<dyn ServiceStore>,
    runner_cfg: RunnerSection,
    runtime: Mutex<HashMap<Uuid, RuntimeSlot>>,
    /// Per-service operation locks (see module docs).
    ops: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

struct RuntimeSlot {
    runtime: ServiceRuntime,
    stop_tx: Option<watch::Sender<bool>>,
    supervision: Option<JoinHandle<()>>,
}

impl RuntimeSlot {
    fn new() -> Self {
        Self {
            runtime: ServiceRuntime::stopped(),
            stop_tx: None,
            supervision: None,
        }
    }
}

impl<B: ProcessBackend + 'static> ServiceRegistry<B> {
    pub fn new(backend: B, store: Box<dyn ServiceStore>, runner_cfg: RunnerSection) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                backend,
                store,
                runner_cfg,
                runtime: Mutex::new(HashMap::new()),
                ops: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Validate and register a new service. Starts it immediately when
    /// `autoStart` is set (and the service is enabled).
    pub async fn create(&self, draft: ServiceDraft) -> Result<ServiceEntry> {
        draft.validate()?;

        if self.inner.store.name_taken(&draft.name, None) {
            return Err(ProcdagError::Validation(vec![format!(
                "name '{}' is already in use",
                draft.name
            )]));
        }

        let def = ServiceDefinition::from_draft(Uuid::new_v4(), draft);
        let id = def.id;
        let auto_start = def.draft.auto_start;
        let enabled = def.draft.enabled;

        self.inner.store.insert(def.clone())?;
        self.inner.runtime.lock().insert(id, RuntimeSlot::new());

        info!(service = %def.name(), id = %id, "service created");

        if auto_start {
            if enabled {
                self.start(id).await?;
            } else {
                debug!(service = %def.name(), "autoStart set but service is disabled; not starting");
            }
        }

        self.snapshot(id)
    }

    pub fn snapshot(&self, id: Uuid) -> Result<ServiceEntry> {
        let definition = self.inner.store.get(id)?;
        let runtime = self
            .inner
            .runtime
            .lock()
            .get(&id)
            .map(|slot| slot.runtime.clone())
            .ok_or_else(|| ProcdagError::NotFound(format!("service {id}")))?;
        Ok(ServiceEntry {
            definition,
            runtime,
        })
    }

    pub fn list(&self) -> Vec<ServiceEntry> {
        let runtime = self.inner.runtime.lock();
        self.inner
            .store
            .list()
            .into_iter()
            .filter_map(|definition| {
                let rt = runtime.get(&definition.id)?.runtime.clone();
                Some(ServiceEntry {
                    definition,
                    runtime: rt,
                })
            })
            .collect()
    }

    /// Replace the definition wholesale. A running service keeps its live
    /// process untouched; the new definition applies on the next
    /// (re)start.
    pub async fn update(&self, id: Uuid, draft: ServiceDraft) -> Result<ServiceEntry> {
        let _op = self.op_guard(id).await;

        draft.validate()?;
        self.inner.store.get(id)?;

        if self.inner.store.name_taken(&draft.name, Some(id)) {
            return Err(ProcdagError::Validation(vec![format!(
                "name '{}' is already in use",
                draft.name
            )]));
        }

        let def = ServiceDefinition::from_draft(id, draft);
        self.inner.store.replace(def)?;

        self.snapshot(id)
    }

    /// Remove a service. There is no implicit force-stop; callers must stop
    /// a running service first.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let _op = self.op_guard(id).await;

        {
            let runtime = self.inner.runtime.lock();
            let slot = runtime
                .get(&id)
                .ok_or_else(|| ProcdagError::NotFound(format!("service {id}")))?;
            if slot.runtime.state == ServiceState::Running {
                return Err(ProcdagError::Conflict(
                    "cannot delete a running service; stop it first".to_string(),
                ));
            }
        }

        // Let any finishing supervision task drain before the slot goes
        // away; signal it in case it is between restart-policy attempts.
        let stale = {
            let mut runtime = self.inner.runtime.lock();
            runtime.get_mut(&id).and_then(|slot| {
                if let Some(tx) = &slot.stop_tx {
                    let _ = tx.send(true);
                }
                slot.supervision.take()
            })
        };
        if let Some(handle) = stale {
            let _ = handle.await;
        }

        self.inner.store.remove(id)?;
        self.inner.runtime.lock().remove(&id);
        self.inner.ops.lock().remove(&id);

        info!(id = %id, "service deleted");
        Ok(())
    }

    pub async fn start(&self, id: Uuid) -> Result<ServiceEntry> {
        let _op = self.op_guard(id).await;
        self.start_locked(id).await?;
        self.snapshot(id)
    }

    pub async fn stop(&self, id: Uuid) -> Result<ServiceEntry> {
        let _op = self.op_guard(id).await;

        let handle = {
            let mut runtime = self.inner.runtime.lock();
            let slot = runtime
                .get_mut(&id)
                .ok_or_else(|| ProcdagError::NotFound(format!("service {id}")))?;
            if slot.runtime.state != ServiceState::Running {
                return Err(ProcdagError::Conflict(format!(
                    "service is not running (state {})",
                    slot.runtime.state
                )));
            }
            if let Some(tx) = &slot.stop_tx {
                let _ = tx.send(true);
            }
            slot.supervision.take()
        };

        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.snapshot(id)
    }

    /// Stop-if-running, then start. Allowed from any state; the new process
    /// is only launched after the old one's exit has been observed.
    pub async fn restart(&self, id: Uuid) -> Result<ServiceEntry> {
        let _op = self.op_guard(id).await;

        let handle = {
            let mut runtime = self.inner.runtime.lock();
            let slot = runtime
                .get_mut(&id)
                .ok_or_else(|| ProcdagError::NotFound(format!("service {id}")))?;
            // Signal regardless of observed state: the supervision task may
            // be between restart-policy attempts right now.
            if let Some(tx) = &slot.stop_tx {
                let _ = tx.send(true);
            }
            slot.supervision.take()
        };

        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let def = self.inner.store.get(id)?;
        if !def.draft.enabled {
            return Err(ProcdagError::Conflict(format!(
                "service '{}' is disabled",
                def.name()
            )));
        }

        self.begin_launch(def);
        self.snapshot(id)
    }

    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<ServiceEntry> {
        let _op = self.op_guard(id).await;

        let mut def = self.inner.store.get(id)?;

        if !enabled {
            let running = self
                .inner
                .runtime
                .lock()
                .get(&id)
                .map(|slot| slot.runtime.state == ServiceState::Running)
                .unwrap_or(false);
            if running {
                return Err(ProcdagError::Conflict(
                    "stop the service before disabling it".to_string(),
                ));
            }
        }

        def.draft.enabled = enabled;
        self.inner.store.replace(def)?;
        self.snapshot(id)
    }

    async fn start_locked(&self, id: Uuid) -> Result<()> {
        let def = self.inner.store.get(id)?;

        {
            let runtime = self.inner.runtime.lock();
            let slot = runtime
                .get(&id)
                .ok_or_else(|| ProcdagError::NotFound(format!("service {id}")))?;
            if slot.runtime.state == ServiceState::Running {
                return Err(ProcdagError::Conflict(format!(
                    "service '{}' is already running",
                    def.name()
                )));
            }
        }

        if !def.draft.enabled {
            return Err(ProcdagError::Conflict(format!(
                "service '{}' is disabled",
                def.name()
            )));
        }

        // The old supervision task may still be finalizing, or sitting
        // between restart-policy attempts; tell it to stand down first.
        let stale = {
            let mut runtime = self.inner.runtime.lock();
            runtime.get_mut(&id).and_then(|slot| {
                if let Some(tx) = &slot.stop_tx {
                    let _ = tx.send(true);
                }
                slot.supervision.take()
            })
        };
        if let Some(handle) = stale {
            let _ = handle.await;
        }

        self.begin_launch(def);
        Ok(())
    }

    /// Transition to RUNNING/requested and hand the definition to the
    /// backend. Launch failures are observed asynchronously via the
    /// supervision events, never returned here.
    fn begin_launch(&self, def: ServiceDefinition) {
        let id = def.id;
        let (stop_tx, stop_rx) = watch::channel(false);

        {
            let mut runtime = self.inner.runtime.lock();
            if let Some(slot) = runtime.get_mut(&id) {
                slot.runtime.state = ServiceState::Running;
                slot.runtime.phase = StatePhase::Requested;
                slot.runtime.pid = None;
                slot.runtime.started_at = None;
                slot.runtime.last_error = None;
                slot.runtime.metrics.clear();
                slot.runtime.restarts_attempted = 0;
                slot.stop_tx = Some(stop_tx);
            }
        }

        info!(service = %def.name(), id = %id, "start requested");

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(supervision_loop(inner, id, stop_rx));

        if let Some(slot) = self.inner.runtime.lock().get_mut(&id) {
            slot.supervision = Some(handle);
        }
    }

    async fn op_guard(&self, id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut ops = self.inner.ops.lock();
            ops.entry(id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl<B> RegistryInner<B> {
    fn update_runtime<F: FnOnce(&mut ServiceRuntime)>(&self, id: Uuid, f: F) {
        if let Some(slot) = self.runtime.lock().get_mut(&id) {
            f(&mut slot.runtime);
        }
    }
}

/// Drives launches of one service until it settles.
///
/// One iteration is one full process lifecycle; the loop continues when the
/// restart policy asks for an automatic relaunch. The task is the single
/// writer of this service's runtime while it is alive (API operations only
/// touch it under the per-id op lock once this task has been awaited).
async fn supervision_loop<B: ProcessBackend>(
    inner: Arc<RegistryInner<B>>,
    id: Uuid,
    stop_rx: watch::Receiver<bool>,
) {
    loop {
        // Re-read the definition each attempt so policy-driven relaunches
        // pick up edits.
        let def = match inner.store.get(id) {
            Ok(def) => def,
            Err(_) => return,
        };

        let spec = def.launch_spec(&inner.runner_cfg);
        let (ev_tx, mut ev_rx) = mpsc::channel::<SupervisorEvent>(16);

        let sup = tokio::spawn(inner.backend.supervise(spec, ev_tx, stop_rx.clone()));

        let mut report: Option<ExitReport> = None;
        while let Some(event) = ev_rx.recv().await {
            match event {
                SupervisorEvent::Started { pid, .. } => {
                    debug!(service = %def.name(), pid, "process start observed");
                    inner.update_runtime(id, |rt| {
                        rt.phase = StatePhase::Observed;
                        rt.pid = Some(pid);
                        rt.started_at = Some(chrono::Utc::now());
                    });
                }
                SupervisorEvent::Sample { metrics, .. } => {
                    inner.update_runtime(id, |rt| rt.metrics = metrics);
                }
                SupervisorEvent::Exited { report: rep, .. } => {
                    report = Some(rep);
                }
            }
        }
        let _ = sup.await;

        let report = report.unwrap_or_else(|| ExitReport::Failed {
            exit_code: -1,
            error: Some("backend ended without an exit report".to_string()),
        });

        let (state, exit_code, error) = match report {
            ExitReport::Completed {
                exit_code,
                post_exec_error,
            } => (ServiceState::Completed, Some(exit_code), post_exec_error),
            ExitReport::Failed { exit_code, error } => {
                (ServiceState::Failed, Some(exit_code), error)
            }
            ExitReport::TimedOut => (ServiceState::Timeout, None, None),
            ExitReport::Stopped { exit_code } => (ServiceState::Stopped, exit_code, None),
        };

        inner.update_runtime(id, |rt| {
            rt.state = state;
            rt.phase = StatePhase::Observed;
            rt.pid = None;
            if exit_code.is_some() {
                rt.last_exit_code = exit_code;
            }
            if error.is_some() {
                rt.last_error = error.clone();
            }
        });

        info!(service = %def.name(), id = %id, state = %state, "service settled");

        // An operator-requested stop always wins over the restart policy.
        if *stop_rx.borrow() || state == ServiceState::Stopped {
            break;
        }

        let attempted = inner
            .runtime
            .lock()
            .get(&id)
            .map(|slot| slot.runtime.restarts_attempted)
            .unwrap_or(0);

        if def.draft.restart_policy.applies_to(state) && attempted < def.draft.retries {
            warn!(
                service = %def.name(),
                attempt = attempted + 1,
                retries = def.draft.retries,
                "restart policy triggered; relaunching"
            );
            inner.update_runtime(id, |rt| {
                rt.restarts_attempted += 1;
                rt.state = ServiceState::Running;
                rt.phase = StatePhase::Requested;
                rt.metrics.clear();
            });
            continue;
        }

        break;
    }

    if let Some(slot) = inner.runtime.lock().get_mut(&id) {
        slot.stop_tx = None;
    }
}
