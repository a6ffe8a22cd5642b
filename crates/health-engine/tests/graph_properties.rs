//! Property-based tests for the dependency graph and propagation
//!
//! - No sequence of inserts leaves a cycle behind
//! - Ancestor order always puts children before parents
//! - Every composite node ends up with the worst status of its children

use health_engine::{DependencyGraph, NodeRef, PropagationEngine, Status};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use vigil_core::ManualClock;

const NODES: i64 = 8;

fn node(id: i64) -> NodeRef {
    NodeRef::service(id)
}

fn any_status() -> impl Strategy<Value = Status> {
    prop::sample::select(Status::ALL.to_vec())
}

fn is_acyclic(graph: &DependencyGraph) -> bool {
    // Repeatedly peel nodes whose children are all gone.
    let mut remaining: HashSet<NodeRef> = graph.nodes().cloned().collect();
    loop {
        let peel: Vec<NodeRef> = remaining
            .iter()
            .filter(|n| graph.children(n).iter().all(|c| !remaining.contains(c)))
            .cloned()
            .collect();
        if peel.is_empty() {
            return remaining.is_empty();
        }
        for n in peel {
            remaining.remove(&n);
        }
    }
}

proptest! {
    #[test]
    fn prop_graph_stays_acyclic(edges in prop::collection::vec((0..NODES, 0..NODES), 0..40)) {
        let mut graph = DependencyGraph::new();
        for (parent, child) in edges {
            let _ = graph.add_edge(&node(parent), &node(child));
            prop_assert!(is_acyclic(&graph));
        }
    }

    #[test]
    fn prop_ancestors_children_first(edges in prop::collection::vec((0..NODES, 0..NODES), 0..40)) {
        let mut graph = DependencyGraph::new();
        for (parent, child) in edges {
            let _ = graph.add_edge(&node(parent), &node(child));
        }

        for origin in 0..NODES {
            let order = graph.affected_ancestors(&node(origin));
            let position: HashMap<&NodeRef, usize> =
                order.iter().enumerate().map(|(i, n)| (n, i)).collect();
            for ancestor in &order {
                for parent in graph.parents(ancestor) {
                    prop_assert!(position[&parent] > position[ancestor]);
                }
            }
        }
    }

    #[test]
    fn prop_composites_hold_worst_child(
        edges in prop::collection::vec((0..NODES, 0..NODES), 1..30),
        reports in prop::collection::vec((0..NODES, any_status()), 1..40),
    ) {
        let engine = PropagationEngine::new(Arc::new(ManualClock::default()));
        for (parent, child) in edges {
            let _ = engine.add_dependency(&node(parent), &node(child));
        }
        for (leaf, status) in reports {
            // Composite targets are rejected and leave state untouched.
            let _ = engine.on_leaf_status_changed(&node(leaf), status);
        }

        for entry in engine.nodes() {
            let children = engine.children(&entry.node);
            if children.is_empty() {
                continue;
            }
            let worst = Status::aggregate(
                children.iter().map(|c| engine.status(c).unwrap_or(Status::Unknown)),
            );
            prop_assert_eq!(Some(entry.status), worst, "node {}", entry.node);
        }
    }
}
