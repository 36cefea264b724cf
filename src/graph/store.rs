// src/graph/store.rs

//! Graph persistence boundary.
//!
//! The control plane talks to a `GraphStore` instead of an ambient map, so a
//! persistence engine can be swapped in without touching the executor or the
//! API layer. The in-memory implementation is what the daemon ships with.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::errors::{ProcdagError, Result};
use crate::graph::model::TaskGraph;

/// Storage interface for task graphs.
///
/// `put` has replace-on-save semantics: the UI authors a graph as a whole
/// and saves the whole document.
pub trait GraphStore: Send + Sync {
    fn put(&self, graph: TaskGraph) -> Result<TaskGraph>;
    fn get(&self, id: Uuid) -> Result<TaskGraph>;
    fn list(&self) -> Vec<TaskGraph>;
    fn delete(&self, id: Uuid) -> Result<()>;
}

/// In-memory graph store.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    graphs: Mutex<HashMap<Uuid, TaskGraph>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for MemoryGraphStore {
    fn put(&self, graph: TaskGraph) -> Result<TaskGraph> {
        let mut graphs = self.graphs.lock();
        graphs.insert(graph.id, graph.clone());
        Ok(graph)
    }

    fn get(&self, id: Uuid) -> Result<TaskGraph> {
        self.graphs
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| ProcdagError::NotFound(format!("graph {id}")))
    }

    fn list(&self) -> Vec<TaskGraph> {
        let mut all: Vec<TaskGraph> = self.graphs.lock().values().cloned().collect();
        all.sort_by_key(|g| g.id);
        all
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        self.graphs
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ProcdagError::NotFound(format!("graph {id}")))
    }
}
