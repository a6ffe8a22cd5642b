//! Status dependency graph
//!
//! Arena of monitored objects indexed by `(type, id)` with parent and child
//! adjacency sets. The graph is kept acyclic on every insert.

use std::collections::{BTreeSet, HashMap};
use vigil_core::{DependencyEdge, NodeRef, Result, VigilError};

type Slot = usize;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    index: HashMap<NodeRef, Slot>,
    nodes: Vec<NodeRef>,
    parents: Vec<BTreeSet<Slot>>,
    children: Vec<BTreeSet<Slot>>,
    edge_count: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `node`, allocating one if the node is new.
    pub fn insert_node(&mut self, node: &NodeRef) -> Slot {
        if let Some(&slot) = self.index.get(node) {
            return slot;
        }
        let slot = self.nodes.len();
        self.index.insert(node.clone(), slot);
        self.nodes.push(node.clone());
        self.parents.push(BTreeSet::new());
        self.children.push(BTreeSet::new());
        slot
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        self.index.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Adds `parent -> child`. Rejects self loops and any edge that would
    /// close a cycle; the graph is untouched on rejection.
    pub fn add_edge(&mut self, parent: &NodeRef, child: &NodeRef) -> Result<()> {
        let cycle = || VigilError::CycleDetected {
            parent: parent.clone(),
            child: child.clone(),
        };

        if parent == child {
            return Err(cycle());
        }

        if let (Some(&p), Some(&c)) = (self.index.get(parent), self.index.get(child)) {
            if self.children[p].contains(&c) {
                return Err(VigilError::DuplicateEdge {
                    parent: parent.clone(),
                    child: child.clone(),
                });
            }
            if self.reaches(c, p) {
                return Err(cycle());
            }
        }

        let p = self.insert_node(parent);
        let c = self.insert_node(child);
        self.children[p].insert(c);
        self.parents[c].insert(p);
        self.edge_count += 1;
        Ok(())
    }

    /// Idempotent; returns whether an edge was removed.
    pub fn remove_edge(&mut self, parent: &NodeRef, child: &NodeRef) -> bool {
        let (Some(&p), Some(&c)) = (self.index.get(parent), self.index.get(child)) else {
            return false;
        };
        if !self.children[p].remove(&c) {
            return false;
        }
        self.parents[c].remove(&p);
        self.edge_count -= 1;
        true
    }

    pub fn parents(&self, node: &NodeRef) -> BTreeSet<NodeRef> {
        self.neighbours(node, &self.parents)
    }

    pub fn children(&self, node: &NodeRef) -> BTreeSet<NodeRef> {
        self.neighbours(node, &self.children)
    }

    /// Borrowing iterator over direct children, ordered by the slot each
    /// child got when it first entered the graph (not by edge insertion).
    pub fn children_iter<'a>(&'a self, node: &NodeRef) -> impl Iterator<Item = &'a NodeRef> + 'a {
        self.index
            .get(node)
            .into_iter()
            .flat_map(move |&slot| self.children[slot].iter())
            .map(move |&child| &self.nodes[child])
    }

    /// Nodes with no children hold reported status; everything else is
    /// derived. Unknown nodes count as leaves.
    pub fn is_leaf(&self, node: &NodeRef) -> bool {
        self.index
            .get(node)
            .map_or(true, |&slot| self.children[slot].is_empty())
    }

    /// Every transitive parent of `node`, children before parents.
    ///
    /// Kahn's algorithm restricted to the ancestor set: an ancestor becomes
    /// ready once none of its children are pending. Ties break on arena
    /// slot so the order is stable for a given graph.
    pub fn affected_ancestors(&self, node: &NodeRef) -> Vec<NodeRef> {
        let Some(&origin) = self.index.get(node) else {
            return Vec::new();
        };

        let mut ancestors = BTreeSet::new();
        let mut stack: Vec<Slot> = self.parents[origin].iter().copied().collect();
        while let Some(slot) = stack.pop() {
            if ancestors.insert(slot) {
                stack.extend(self.parents[slot].iter().copied());
            }
        }

        let mut pending: HashMap<Slot, usize> = ancestors
            .iter()
            .map(|&slot| {
                let blocking = self.children[slot]
                    .iter()
                    .filter(|child| ancestors.contains(*child))
                    .count();
                (slot, blocking)
            })
            .collect();

        let mut ready: BTreeSet<Slot> = pending
            .iter()
            .filter(|(_, blocking)| **blocking == 0)
            .map(|(&slot, _)| slot)
            .collect();

        let mut ordered = Vec::with_capacity(ancestors.len());
        while let Some(slot) = ready.pop_first() {
            ordered.push(self.nodes[slot].clone());
            for parent in &self.parents[slot] {
                if let Some(blocking) = pending.get_mut(parent) {
                    *blocking -= 1;
                    if *blocking == 0 {
                        ready.insert(*parent);
                    }
                }
            }
        }
        ordered
    }

    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = self
            .children
            .iter()
            .enumerate()
            .flat_map(|(parent, children)| {
                children.iter().map(move |&child| DependencyEdge {
                    parent: self.nodes[parent].clone(),
                    child: self.nodes[child].clone(),
                })
            })
            .collect();
        edges.sort();
        edges
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeRef> {
        self.nodes.iter()
    }

    fn neighbours(&self, node: &NodeRef, adjacency: &[BTreeSet<Slot>]) -> BTreeSet<NodeRef> {
        self.index
            .get(node)
            .map(|&slot| {
                adjacency[slot]
                    .iter()
                    .map(|&other| self.nodes[other].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Depth-first search over child edges from `from`.
    fn reaches(&self, from: Slot, target: Slot) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(slot) = stack.pop() {
            if slot == target {
                return true;
            }
            if std::mem::replace(&mut visited[slot], true) {
                continue;
            }
            stack.extend(self.children[slot].iter().copied());
        }
        false
    }
}
