// tests/graph_validation.rs

use procdag::errors::ProcdagError;
use procdag::graph::{topological_order, validate};
use procdag_test_utils::builders::TaskGraphBuilder;

#[test]
fn diamond_without_closing_edge_validates() {
    let graph = TaskGraphBuilder::new("diamond")
        .node("A", "echo A")
        .node("B", "echo B")
        .node("C", "echo C")
        .edge("A", "B")
        .edge("A", "C")
        .build();

    assert!(validate(&graph).is_ok());
}

#[test]
fn three_node_cycle_is_rejected_naming_all_nodes() {
    let graph = TaskGraphBuilder::new("ring")
        .node("A", "echo A")
        .node("B", "echo B")
        .node("C", "echo C")
        .edge("A", "B")
        .edge("B", "C")
        .edge("C", "A")
        .build();

    match validate(&graph) {
        Err(ProcdagError::Cycle { path }) => {
            for id in ["A", "B", "C"] {
                assert!(path.iter().any(|n| n == id), "cycle {path:?} misses {id}");
            }
        }
        other => panic!("expected CycleError, got {other:?}"),
    }
}

#[test]
fn dangling_edge_is_rejected_before_cycle_detection() {
    let graph = TaskGraphBuilder::new("broken")
        .node("A", "echo A")
        .edge("A", "missing")
        .build();

    match validate(&graph) {
        Err(ProcdagError::Validation(problems)) => {
            assert!(problems.iter().any(|p| p.contains("'missing'")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn duplicate_node_ids_are_rejected() {
    let graph = TaskGraphBuilder::new("dupes")
        .node("A", "echo 1")
        .node("A", "echo 2")
        .build();

    match validate(&graph) {
        Err(ProcdagError::Validation(problems)) => {
            assert!(problems.iter().any(|p| p.contains("duplicate node id 'A'")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn self_loop_is_rejected() {
    let graph = TaskGraphBuilder::new("loop")
        .node("A", "echo A")
        .edge("A", "A")
        .build();

    assert!(matches!(
        validate(&graph),
        Err(ProcdagError::Validation(_))
    ));
}

#[test]
fn topological_order_is_deterministic_and_respects_edges() {
    let graph = TaskGraphBuilder::new("diamond")
        .node("D", "echo D")
        .node("C", "echo C")
        .node("B", "echo B")
        .node("A", "echo A")
        .edge("A", "B")
        .edge("A", "C")
        .edge("B", "D")
        .edge("C", "D")
        .build();

    let order = topological_order(&graph).unwrap();
    assert_eq!(order, vec!["A", "B", "C", "D"]);
    assert_eq!(topological_order(&graph).unwrap(), order);
}

#[test]
fn topological_order_rejects_cycles() {
    let graph = TaskGraphBuilder::new("ring")
        .node("A", "echo A")
        .node("B", "echo B")
        .edge("A", "B")
        .edge("B", "A")
        .build();

    assert!(matches!(
        topological_order(&graph),
        Err(ProcdagError::Cycle { .. })
    ));
}
