// src/flow/wave.rs

//! Pure per-run scheduling state.
//!
//! `WavePlan` decides which nodes are eligible for the next wave and how a
//! failure propagates to dependents. It never performs IO; the async
//! executor feeds outcomes in and reads decisions out, which keeps the
//! semantics unit-testable without Tokio or processes.

use std::collections::BTreeMap;

use tracing::debug;

use crate::graph::{GraphIndex, TaskGraph};
use crate::types::{NodeStatus, RunStatus};

#[derive(Debug)]
pub struct WavePlan {
    index: GraphIndex,
    status: BTreeMap<String, NodeStatus>,
}

impl WavePlan {
    pub fn new(graph: &TaskGraph) -> Self {
        let index = GraphIndex::from_graph(graph);
        let status = index
            .node_ids()
            .map(|id| (id.to_string(), NodeStatus::Idle))
            .collect();
        Self { index, status }
    }

    pub fn status_of(&self, id: &str) -> Option<NodeStatus> {
        self.status.get(id).copied()
    }

    /// Idle nodes whose dependencies have all completed, in ascending id
    /// order. An empty result with non-terminal nodes left means the run is
    /// blocked forever (upstream failure) and the caller should finalize.
    pub fn eligible(&self) -> Vec<String> {
        self.status
            .iter()
            .filter(|(id, status)| {
                **status == NodeStatus::Idle
                    && self
                        .index
                        .dependencies_of(id)
                        .iter()
                        .all(|dep| self.status.get(dep) == Some(&NodeStatus::Completed))
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn mark_running(&mut self, ids: &[String]) {
        for id in ids {
            if let Some(s) = self.status.get_mut(id) {
                *s = NodeStatus::Running;
            }
        }
    }

    /// Record a node outcome.
    ///
    /// On failure, every transitive dependent that has not started is marked
    /// `Skipped` and the newly skipped ids are returned so the caller can
    /// stamp their timeline entries. Independent branches are untouched.
    pub fn record(&mut self, id: &str, success: bool) -> Vec<String> {
        let outcome = if success {
            NodeStatus::Completed
        } else {
            NodeStatus::Failed
        };

        if let Some(s) = self.status.get_mut(id) {
            *s = outcome;
        }

        if success {
            return Vec::new();
        }

        debug!(node = %id, "node failed; skipping transitive dependents");
        self.skip_dependents(id)
    }

    fn skip_dependents(&mut self, failed: &str) -> Vec<String> {
        let mut stack: Vec<String> = self
            .index
            .dependents_of(failed)
            .iter()
            .cloned()
            .collect();

        let mut newly_skipped = Vec::new();

        while let Some(id) = stack.pop() {
            match self.status.get_mut(&id) {
                Some(s @ NodeStatus::Idle) => {
                    *s = NodeStatus::Skipped;
                    newly_skipped.push(id.clone());
                    stack.extend(self.index.dependents_of(&id).iter().cloned());
                }
                // Already terminal, running, or previously skipped via
                // another failed upstream path.
                _ => {}
            }
        }

        newly_skipped.sort();
        newly_skipped
    }

    /// Mark every node that never started as skipped (cancellation path).
    pub fn skip_idle(&mut self) -> Vec<String> {
        let mut skipped = Vec::new();
        for (id, s) in self.status.iter_mut() {
            if *s == NodeStatus::Idle {
                *s = NodeStatus::Skipped;
                skipped.push(id.clone());
            }
        }
        skipped
    }

    pub fn all_terminal(&self) -> bool {
        self.status.values().all(|s| s.is_terminal())
    }

    /// Overall run status once no further wave can be dispatched.
    pub fn overall(&self) -> RunStatus {
        if self.status.values().any(|s| *s == NodeStatus::Failed) {
            RunStatus::Failed
        } else if self.status.values().any(|s| *s == NodeStatus::Skipped) {
            RunStatus::Partial
        } else {
            RunStatus::Completed
        }
    }
}
