// src/graph/model.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::NodeKind;

/// One task in a graph.
///
/// `id` is unique within the graph and is what edges reference. The struct
/// doubles as the wire representation consumed by the diagram UI; scheduling
/// never reads it directly but goes through [`GraphIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub kind: NodeKind,

    pub command: String,
}

/// A dependency edge: `to` depends on `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// A whole task graph, authored and saved as one document
/// (replace-on-save semantics).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub id: Uuid,

    #[serde(default)]
    pub name: String,

    pub nodes: Vec<TaskNode>,

    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl TaskGraph {
    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Adjacency view over a validated [`TaskGraph`].
///
/// Keyed by node id; `BTreeMap` keeps iteration in ascending id order, which
/// is what makes scheduling decisions reproducible.
#[derive(Debug, Clone)]
pub struct GraphIndex {
    deps: BTreeMap<String, Vec<String>>,
    dependents: BTreeMap<String, Vec<String>>,
}

impl GraphIndex {
    /// Build adjacency from a graph.
    ///
    /// Assumes the graph passed structural validation: every edge endpoint
    /// exists and there are no cycles.
    pub fn from_graph(graph: &TaskGraph) -> Self {
        let mut deps: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for node in &graph.nodes {
            deps.entry(node.id.clone()).or_default();
            dependents.entry(node.id.clone()).or_default();
        }

        for edge in &graph.edges {
            if let Some(d) = deps.get_mut(&edge.to) {
                d.push(edge.from.clone());
            }
            if let Some(d) = dependents.get_mut(&edge.from) {
                d.push(edge.to.clone());
            }
        }

        // Deterministic neighbour order regardless of edge-list order.
        for list in deps.values_mut().chain(dependents.values_mut()) {
            list.sort();
            list.dedup();
        }

        Self { deps, dependents }
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.deps.keys().map(|s| s.as_str())
    }

    /// Immediate dependencies of a node (edges pointing into it).
    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.deps.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Immediate dependents of a node (edges pointing out of it).
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }
}
