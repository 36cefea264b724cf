use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use procdag::flow::{NodeOutcome, NodeRunner, NodeSpec};
use tokio::sync::watch;

#[derive(Default)]
struct Shared {
    exit_codes: Mutex<HashMap<String, i32>>,
    delays: Mutex<HashMap<String, Duration>>,
    started: Mutex<Vec<String>>,
}

/// A node runner that resolves scripted outcomes instead of spawning
/// processes.
///
/// - Records dispatch order by node id.
/// - Unconfigured nodes complete with exit code 0 after a short delay.
/// - Honours cancellation while a node is "running".
#[derive(Clone, Default)]
pub struct FakeNodeRunner {
    shared: Arc<Shared>,
}

impl FakeNodeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_exit_code(&self, node_id: &str, code: i32) {
        self.shared
            .exit_codes
            .lock()
            .unwrap()
            .insert(node_id.to_string(), code);
    }

    pub fn set_delay(&self, node_id: &str, delay: Duration) {
        self.shared
            .delays
            .lock()
            .unwrap()
            .insert(node_id.to_string(), delay);
    }

    /// Node ids in the order they were dispatched.
    pub fn started(&self) -> Vec<String> {
        self.shared.started.lock().unwrap().clone()
    }
}

impl NodeRunner for FakeNodeRunner {
    fn run_node(
        &self,
        spec: NodeSpec,
        mut cancel: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = NodeOutcome> + Send>> {
        let shared = Arc::clone(&self.shared);

        Box::pin(async move {
            shared.started.lock().unwrap().push(spec.node_id.clone());

            let delay = shared
                .delays
                .lock()
                .unwrap()
                .get(&spec.node_id)
                .copied()
                .unwrap_or(Duration::from_millis(2));

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_cancel(&mut cancel) => {
                    return NodeOutcome::Canceled { exit_code: None };
                }
            }

            let code = shared
                .exit_codes
                .lock()
                .unwrap()
                .get(&spec.node_id)
                .copied()
                .unwrap_or(0);

            if code == 0 {
                NodeOutcome::Completed { exit_code: 0 }
            } else {
                NodeOutcome::Failed {
                    exit_code: code,
                    error: None,
                }
            }
        })
    }
}

async fn wait_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
