//! Status Propagation Engine
//!
//! Owns the dependency graph and the status store behind one lock. Every
//! pass (leaf report, recompute, topology edit) stages its writes and only
//! commits once the whole ancestor chain aggregated cleanly, so readers
//! never observe a half-propagated graph.

use crate::graph::DependencyGraph;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use status_events::EventSink;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use vigil_core::{
    DependencyEdge, NodeRef, Result, SharedClock, Status, StatusChange, StatusNode, VigilError,
};

/// Current status of every monitored object plus the set of nodes changed
/// since the last drain.
#[derive(Debug, Default)]
pub struct StatusStore {
    nodes: HashMap<NodeRef, StatusNode>,
    dirty: BTreeSet<NodeRef>,
}

impl StatusStore {
    pub fn get(&self, node: &NodeRef) -> Option<&StatusNode> {
        self.nodes.get(node)
    }

    pub fn status(&self, node: &NodeRef) -> Status {
        self.nodes
            .get(node)
            .map_or(Status::Unknown, |entry| entry.status)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn ensure(&mut self, node: &NodeRef, now: DateTime<Utc>) -> &mut StatusNode {
        self.nodes.entry(node.clone()).or_insert_with(|| StatusNode {
            node: node.clone(),
            status: Status::Unknown,
            last_updated: now,
        })
    }

    fn write(&mut self, node: &NodeRef, status: Status, now: DateTime<Utc>) {
        let entry = self.ensure(node, now);
        entry.status = status;
        entry.last_updated = now;
        self.dirty.insert(node.clone());
    }
}

#[derive(Debug, Default)]
struct HealthState {
    graph: DependencyGraph,
    statuses: StatusStore,
}

/// Result of one propagation pass: the node that triggered it and every
/// status transition it committed, in commit order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropagationReport {
    pub node: NodeRef,
    pub changes: Vec<StatusChange>,
}

impl PropagationReport {
    fn unchanged(node: &NodeRef) -> Self {
        Self {
            node: node.clone(),
            changes: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    /// Status `node` ended up with, if this pass changed it.
    pub fn status_of(&self, node: &NodeRef) -> Option<Status> {
        self.changes
            .iter()
            .rev()
            .find(|change| &change.node == node)
            .map(|change| change.new)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub leaf_reports: u64,
    pub passes: u64,
    pub status_changes: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct EngineCounters {
    leaf_reports: AtomicU64,
    passes: AtomicU64,
    status_changes: AtomicU64,
    rejected: AtomicU64,
}

/// Status writes staged during a pass, committed only on success.
#[derive(Debug, Default)]
struct StagedPass {
    writes: Vec<(NodeRef, Status)>,
}

impl StagedPass {
    fn status(&self, store: &StatusStore, node: &NodeRef) -> Status {
        self.writes
            .iter()
            .rev()
            .find(|(staged, _)| staged == node)
            .map_or_else(|| store.status(node), |(_, status)| *status)
    }

    fn stage(&mut self, node: NodeRef, status: Status) {
        self.writes.push((node, status));
    }
}

#[derive(Clone)]
pub struct PropagationEngine {
    state: Arc<Mutex<HealthState>>,
    clock: SharedClock,
    sink: Option<Arc<dyn EventSink>>,
    counters: Arc<EngineCounters>,
}

impl std::fmt::Debug for PropagationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PropagationEngine")
            .field("nodes", &state.statuses.len())
            .field("edges", &state.graph.edge_count())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl PropagationEngine {
    pub fn new(clock: SharedClock) -> Self {
        info!("Initializing status propagation engine");
        Self {
            state: Arc::new(Mutex::new(HealthState::default())),
            clock,
            sink: None,
            counters: Arc::new(EngineCounters::default()),
        }
    }

    /// Publish every committed [`StatusChange`] to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Makes `node` known to the engine, starting at UNKNOWN.
    pub fn register_node(&self, node: &NodeRef) -> StatusNode {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.graph.insert_node(node);
        state.statuses.ensure(node, now).clone()
    }

    /// Applies a freshly evaluated status to a leaf and re-aggregates every
    /// ancestor.
    #[instrument(skip(self, node, status), fields(node = %node, status = %status))]
    pub fn on_leaf_status_changed(&self, node: &NodeRef, status: Status) -> Result<PropagationReport> {
        self.counters.leaf_reports.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.apply_leaf(&mut state, node, status, now)
    }

    /// Marks a silent leaf with `status` when it has not been updated since
    /// `cutoff`. Checked and applied under the same lock as reports, so a
    /// heartbeat racing the watchdog always wins.
    pub fn mark_stale(
        &self,
        node: &NodeRef,
        cutoff: DateTime<Utc>,
        status: Status,
    ) -> Result<Option<PropagationReport>> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if !state.graph.is_leaf(node) {
            return Ok(None);
        }
        let Some(entry) = state.statuses.get(node) else {
            return Ok(None);
        };
        if entry.last_updated >= cutoff || entry.status == status {
            return Ok(None);
        }

        warn!(node = %node, last_updated = %entry.last_updated, "Heartbeat missed, marking {}", status);
        self.apply_leaf(&mut state, node, status, now).map(Some)
    }

    /// Re-aggregates `node` from its children and carries any change up to
    /// its ancestors.
    #[instrument(skip(self, node), fields(node = %node))]
    pub fn recompute(&self, node: &NodeRef) -> Result<PropagationReport> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.run_pass(&mut state, node, true, StagedPass::default(), now)
    }

    /// Adds `parent -> child` and re-derives `parent` and its ancestors in
    /// the same pass.
    #[instrument(skip(self, parent, child), fields(parent = %parent, child = %child))]
    pub fn add_dependency(&self, parent: &NodeRef, child: &NodeRef) -> Result<PropagationReport> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if let Err(e) = state.graph.add_edge(parent, child) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            warn!("Dependency rejected: {}", e);
            return Err(e);
        }
        state.statuses.ensure(parent, now);
        state.statuses.ensure(child, now);

        match self.run_pass(&mut state, parent, true, StagedPass::default(), now) {
            Ok(report) => {
                info!("Dependency added, {} status change(s)", report.changes.len());
                Ok(report)
            }
            Err(e) => {
                state.graph.remove_edge(parent, child);
                Err(e)
            }
        }
    }

    /// Removes `parent -> child`. Returns `None` when the edge did not
    /// exist. A parent left without children becomes a leaf and keeps its
    /// last derived status.
    #[instrument(skip(self, parent, child), fields(parent = %parent, child = %child))]
    pub fn remove_dependency(
        &self,
        parent: &NodeRef,
        child: &NodeRef,
    ) -> Result<Option<PropagationReport>> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if !state.graph.remove_edge(parent, child) {
            debug!("Dependency already absent");
            return Ok(None);
        }

        if state.graph.is_leaf(parent) {
            info!("Parent became a leaf, keeping its last status");
            return Ok(Some(PropagationReport::unchanged(parent)));
        }

        self.run_pass(&mut state, parent, true, StagedPass::default(), now)
            .map(Some)
    }

    pub fn snapshot(&self, node: &NodeRef) -> Option<StatusNode> {
        self.state.lock().statuses.get(node).cloned()
    }

    pub fn status(&self, node: &NodeRef) -> Option<Status> {
        self.state.lock().statuses.get(node).map(|entry| entry.status)
    }

    /// Every known node, ordered by `(type, id)`.
    pub fn nodes(&self) -> Vec<StatusNode> {
        let state = self.state.lock();
        let mut nodes: Vec<StatusNode> = state.statuses.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.node.cmp(&b.node));
        nodes
    }

    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.state.lock().graph.edges()
    }

    pub fn parents(&self, node: &NodeRef) -> Vec<NodeRef> {
        self.state.lock().graph.parents(node).into_iter().collect()
    }

    pub fn children(&self, node: &NodeRef) -> Vec<NodeRef> {
        self.state.lock().graph.children(node).into_iter().collect()
    }

    pub fn is_leaf(&self, node: &NodeRef) -> bool {
        self.state.lock().graph.is_leaf(node)
    }

    pub fn affected_ancestors(&self, node: &NodeRef) -> Vec<NodeRef> {
        self.state.lock().graph.affected_ancestors(node)
    }

    /// Nodes changed since the previous drain.
    pub fn drain_dirty(&self) -> Vec<NodeRef> {
        let mut state = self.state.lock();
        std::mem::take(&mut state.statuses.dirty).into_iter().collect()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            leaf_reports: self.counters.leaf_reports.load(Ordering::Relaxed),
            passes: self.counters.passes.load(Ordering::Relaxed),
            status_changes: self.counters.status_changes.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    fn apply_leaf(
        &self,
        state: &mut HealthState,
        node: &NodeRef,
        status: Status,
        now: DateTime<Utc>,
    ) -> Result<PropagationReport> {
        if !state.graph.is_leaf(node) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(VigilError::CompositeNode { node: node.clone() });
        }

        state.graph.insert_node(node);
        let entry = state.statuses.ensure(node, now);
        if entry.status == status {
            // Still counts as a heartbeat.
            entry.last_updated = now;
            debug!("Status unchanged");
            return Ok(PropagationReport::unchanged(node));
        }

        let mut staged = StagedPass::default();
        staged.stage(node.clone(), status);
        self.run_pass(state, node, false, staged, now)
    }

    /// Aggregates `origin` (when `include_origin`) and then each ancestor in
    /// order, staging writes on top of `staged`. Nothing is written unless
    /// every aggregate succeeds.
    fn run_pass(
        &self,
        state: &mut HealthState,
        origin: &NodeRef,
        include_origin: bool,
        mut staged: StagedPass,
        now: DateTime<Utc>,
    ) -> Result<PropagationReport> {
        self.counters.passes.fetch_add(1, Ordering::Relaxed);

        let mut chain = Vec::new();
        if include_origin {
            chain.push(origin.clone());
        }
        chain.extend(state.graph.affected_ancestors(origin));

        for node in chain {
            let aggregate = Status::aggregate(
                state
                    .graph
                    .children_iter(&node)
                    .map(|child| staged.status(&state.statuses, child)),
            );
            let Some(aggregate) = aggregate else {
                error!(node = %node, "Aggregate requested for a node with no children");
                return Err(VigilError::InconsistentAggregate { node });
            };
            if aggregate != staged.status(&state.statuses, &node) {
                staged.stage(node, aggregate);
            }
        }

        let mut changes = Vec::with_capacity(staged.writes.len());
        for (node, status) in staged.writes {
            let old = state.statuses.status(&node);
            state.statuses.write(&node, status, now);
            changes.push(StatusChange {
                node,
                old,
                new: status,
                at: now,
            });
        }

        self.counters
            .status_changes
            .fetch_add(changes.len() as u64, Ordering::Relaxed);
        if let Some(sink) = &self.sink {
            for change in &changes {
                sink.publish(change);
            }
        }
        for change in &changes {
            info!(node = %change.node, old = %change.old, new = %change.new, "Status changed");
        }

        Ok(PropagationReport {
            node: origin.clone(),
            changes,
        })
    }
}
