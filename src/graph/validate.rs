// src/graph/validate.rs

//! Structural validation of task graphs.
//!
//! Checks run in order: duplicate node ids, dangling edge endpoints,
//! self-loops, then cycle detection. The cheap list-based checks come first
//! so the DFS only ever sees a well-formed edge set.

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{ProcdagError, Result};
use crate::graph::model::{GraphIndex, TaskGraph};

/// Validate a graph against every structural invariant.
///
/// Field-level problems are reported together in one `Validation` error;
/// a cycle is reported as `Cycle` with the full offending path.
pub fn validate(graph: &TaskGraph) -> Result<()> {
    let mut problems = Vec::new();

    let mut seen = BTreeSet::new();
    for node in &graph.nodes {
        if node.id.trim().is_empty() {
            problems.push("node id must not be empty".to_string());
        } else if !seen.insert(node.id.as_str()) {
            problems.push(format!("duplicate node id '{}'", node.id));
        }
        if node.command.trim().is_empty() {
            problems.push(format!("node '{}' has an empty command", node.id));
        }
    }

    for edge in &graph.edges {
        if !seen.contains(edge.from.as_str()) {
            problems.push(format!(
                "edge references unknown node '{}' in `from`",
                edge.from
            ));
        }
        if !seen.contains(edge.to.as_str()) {
            problems.push(format!("edge references unknown node '{}' in `to`", edge.to));
        }
        if edge.from == edge.to {
            problems.push(format!("node '{}' cannot depend on itself", edge.from));
        }
    }

    if !problems.is_empty() {
        return Err(ProcdagError::Validation(problems));
    }

    detect_cycle(graph)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Depth-first cycle detection with three-colour marking.
///
/// The first back-edge found aborts the traversal; the error carries the
/// node ids along the cycle so a caller can highlight all of them.
fn detect_cycle(graph: &TaskGraph) -> Result<()> {
    let index = GraphIndex::from_graph(graph);

    let mut colour: BTreeMap<&str, Colour> =
        index.node_ids().map(|id| (id, Colour::White)).collect();

    // Iterate roots in ascending id order so the reported cycle is stable.
    let ids: Vec<&str> = index.node_ids().collect();
    for id in ids {
        if colour[id] == Colour::White {
            let mut path = Vec::new();
            visit(id, &index, &mut colour, &mut path)?;
        }
    }

    Ok(())
}

fn visit<'a>(
    id: &'a str,
    index: &'a GraphIndex,
    colour: &mut BTreeMap<&'a str, Colour>,
    path: &mut Vec<&'a str>,
) -> Result<()> {
    colour.insert(id, Colour::Grey);
    path.push(id);

    for dep in index.dependents_of(id) {
        match colour[dep.as_str()] {
            Colour::White => visit(dep, index, colour, path)?,
            Colour::Grey => {
                // Back-edge: the cycle is the path suffix starting at `dep`.
                let start = path
                    .iter()
                    .position(|n| *n == dep.as_str())
                    .unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.clone());
                return Err(ProcdagError::Cycle { path: cycle });
            }
            Colour::Black => {}
        }
    }

    path.pop();
    colour.insert(id, Colour::Black);
    Ok(())
}
