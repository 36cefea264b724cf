// src/flow/run.rs

//! Execution-run history records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::TaskGraph;
use crate::types::{NodeStatus, RunStatus};

/// Status timeline of one node within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub status: NodeStatus,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeRecord {
    fn idle() -> Self {
        Self {
            status: NodeStatus::Idle,
            exit_code: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// One execution of a task graph.
///
/// Owned by the workflow executor; a graph may have many runs, and a run is
/// read-only history once `status` is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRun {
    pub id: Uuid,
    pub graph_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub nodes: BTreeMap<String, NodeRecord>,
}

impl ExecutionRun {
    /// Fresh run record with every node idle.
    pub fn new(graph: &TaskGraph) -> Self {
        Self {
            id: Uuid::new_v4(),
            graph_id: graph.id,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            nodes: graph
                .nodes
                .iter()
                .map(|n| (n.id.clone(), NodeRecord::idle()))
                .collect(),
        }
    }

    pub fn node_status(&self, id: &str) -> Option<NodeStatus> {
        self.nodes.get(id).map(|r| r.status)
    }
}
