// src/graph/topo.rs

//! Deterministic topological ordering.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{ProcdagError, Result};
use crate::graph::model::{GraphIndex, TaskGraph};
use crate::graph::validate;

/// Produce a topological order over the graph's node ids.
///
/// Nodes become eligible once every dependency has been emitted; ties among
/// simultaneously eligible nodes break by ascending node id, so the same
/// graph always yields the same order.
///
/// Validates first, so a cyclic graph surfaces as `Cycle` rather than a
/// truncated ordering.
pub fn topological_order(graph: &TaskGraph) -> Result<Vec<String>> {
    validate::validate(graph)?;

    let index = GraphIndex::from_graph(graph);

    let mut remaining: BTreeMap<&str, usize> = index
        .node_ids()
        .map(|id| (id, index.dependencies_of(id).len()))
        .collect();

    // BTreeSet pops in ascending order, which is the tie-break rule.
    let mut eligible: BTreeSet<&str> = remaining
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(remaining.len());

    while let Some(id) = eligible.pop_first() {
        order.push(id.to_string());

        for dependent in index.dependents_of(id) {
            if let Some(n) = remaining.get_mut(dependent.as_str()) {
                *n -= 1;
                if *n == 0 {
                    eligible.insert(dependent.as_str());
                }
            }
        }
    }

    // validate() already rejected cycles, so every node must have been
    // emitted; anything else is a programming error worth surfacing.
    if order.len() != graph.nodes.len() {
        let leftover: Vec<String> = remaining
            .keys()
            .filter(|id| !order.iter().any(|o| o.as_str() == **id))
            .map(|id| id.to_string())
            .collect();
        return Err(ProcdagError::Cycle { path: leftover });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{Edge, TaskGraph, TaskNode};
    use crate::types::NodeKind;
    use uuid::Uuid;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> TaskGraph {
        TaskGraph {
            id: Uuid::new_v4(),
            name: String::new(),
            nodes: nodes
                .iter()
                .map(|id| TaskNode {
                    id: id.to_string(),
                    label: String::new(),
                    kind: NodeKind::Shell,
                    command: format!("echo {id}"),
                })
                .collect(),
            edges: edges
                .iter()
                .map(|(f, t)| Edge {
                    from: f.to_string(),
                    to: t.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn diamond_orders_ties_by_ascending_id() {
        let g = graph(
            &["D", "B", "C", "A"],
            &[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")],
        );
        let order = topological_order(&g).unwrap();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn independent_roots_emit_in_id_order() {
        let g = graph(&["z", "a", "m"], &[]);
        let order = topological_order(&g).unwrap();
        assert_eq!(order, vec!["a", "m", "z"]);
    }
}
