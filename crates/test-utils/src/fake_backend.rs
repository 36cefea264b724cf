use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use procdag::runner::{ExitReport, LaunchSpec, ProcessBackend, SupervisorEvent};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Scripted lifecycle for one service name.
#[derive(Debug, Clone)]
pub enum FakeLifecycle {
    /// Emit Started, then exit with this code after `delay`. The exit is
    /// classified against the spec's `valid_exit_codes`, like the real
    /// backend does.
    ExitWith { code: i32, delay: Duration },
    /// Emit Started, then run until a stop is requested.
    RunUntilStopped,
    /// Fail before a Started event is emitted (spawn/pre-exec failure).
    FailToLaunch { error: String },
    /// Emit Started, then report TimedOut after `after` unless stopped
    /// first.
    TimeoutAfter { after: Duration },
}

#[derive(Default)]
struct Shared {
    behaviours: Mutex<HashMap<String, FakeLifecycle>>,
    launches: Mutex<Vec<String>>,
    pid_counter: AtomicU32,
    active: Mutex<HashMap<Uuid, u32>>,
    overlap: AtomicBool,
}

/// A process backend that never touches the OS.
///
/// - Records every launch by service name.
/// - Detects overlapping lifecycles for the same service id, which is how
///   tests verify restart never runs two processes at once.
#[derive(Clone, Default)]
pub struct FakeProcessBackend {
    shared: Arc<Shared>,
}

impl FakeProcessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behaviour(&self, service_name: &str, behaviour: FakeLifecycle) {
        self.shared
            .behaviours
            .lock()
            .unwrap()
            .insert(service_name.to_string(), behaviour);
    }

    /// Every launch so far, in order, by service name.
    pub fn launches(&self) -> Vec<String> {
        self.shared.launches.lock().unwrap().clone()
    }

    pub fn launch_count(&self, service_name: &str) -> usize {
        self.shared
            .launches
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == service_name)
            .count()
    }

    /// Whether two lifecycles for the same service id ever ran at once.
    pub fn overlap_detected(&self) -> bool {
        self.shared.overlap.load(Ordering::SeqCst)
    }
}

impl ProcessBackend for FakeProcessBackend {
    fn supervise(
        &self,
        spec: LaunchSpec,
        events: mpsc::Sender<SupervisorEvent>,
        stop: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let shared = Arc::clone(&self.shared);

        Box::pin(async move {
            shared.launches.lock().unwrap().push(spec.name.clone());

            {
                let mut active = shared.active.lock().unwrap();
                let n = active.entry(spec.service_id).or_insert(0);
                *n += 1;
                if *n > 1 {
                    shared.overlap.store(true, Ordering::SeqCst);
                }
            }

            let report = run_fake(&shared, &spec, &events, stop).await;

            {
                let mut active = shared.active.lock().unwrap();
                if let Some(n) = active.get_mut(&spec.service_id) {
                    *n = n.saturating_sub(1);
                }
            }

            let _ = events
                .send(SupervisorEvent::Exited {
                    service_id: spec.service_id,
                    report,
                })
                .await;
        })
    }
}

async fn run_fake(
    shared: &Shared,
    spec: &LaunchSpec,
    events: &mpsc::Sender<SupervisorEvent>,
    mut stop: watch::Receiver<bool>,
) -> ExitReport {
    let behaviour = shared
        .behaviours
        .lock()
        .unwrap()
        .get(&spec.name)
        .cloned()
        .unwrap_or(FakeLifecycle::ExitWith {
            code: 0,
            delay: Duration::from_millis(5),
        });

    if let FakeLifecycle::FailToLaunch { error } = &behaviour {
        return ExitReport::Failed {
            exit_code: -1,
            error: Some(error.clone()),
        };
    }

    let pid = 1000 + shared.pid_counter.fetch_add(1, Ordering::SeqCst);
    let _ = events
        .send(SupervisorEvent::Started {
            service_id: spec.service_id,
            pid,
        })
        .await;

    let _ = events
        .send(SupervisorEvent::Sample {
            service_id: spec.service_id,
            metrics: BTreeMap::from([("cpu".to_string(), 1.0), ("memory".to_string(), 10.0)]),
        })
        .await;

    match behaviour {
        FakeLifecycle::ExitWith { code, delay } => {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if spec.valid_exit_codes.contains(&code) {
                        ExitReport::Completed { exit_code: code, post_exec_error: None }
                    } else {
                        ExitReport::Failed { exit_code: code, error: None }
                    }
                }
                _ = wait_stop(&mut stop) => ExitReport::Stopped { exit_code: None },
            }
        }
        FakeLifecycle::RunUntilStopped => {
            wait_stop(&mut stop).await;
            ExitReport::Stopped { exit_code: Some(0) }
        }
        FakeLifecycle::TimeoutAfter { after } => {
            tokio::select! {
                _ = tokio::time::sleep(after) => ExitReport::TimedOut,
                _ = wait_stop(&mut stop) => ExitReport::Stopped { exit_code: None },
            }
        }
        FakeLifecycle::FailToLaunch { .. } => ExitReport::Failed {
            exit_code: -1,
            error: None,
        },
    }
}

async fn wait_stop(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
