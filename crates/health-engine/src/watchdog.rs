//! Missed-heartbeat watchdog
//!
//! Nodes bound to a schedule are expected to report every interval. When a
//! leaf stays silent past `interval × missed_factor` the watchdog evaluates
//! the absent observation and pushes the result through the engine.

use crate::engine::PropagationEngine;
use crate::evaluator::{HeartbeatEvaluator, Observation};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use vigil_core::{NodeRef, Schedule, ScheduleId, ScheduleThresholds, SharedClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    pub scan_every: std::time::Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            scan_every: std::time::Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    interval: Duration,
    thresholds: ScheduleThresholds,
}

/// A node may be probed by several schedules; it only counts as silent
/// once every schedule binding it is overdue.
#[derive(Debug, Clone)]
pub struct Watchdog {
    engine: PropagationEngine,
    evaluator: HeartbeatEvaluator,
    clock: SharedClock,
    config: WatchdogConfig,
    bindings: Arc<DashMap<NodeRef, BTreeMap<ScheduleId, Binding>>>,
}

impl Watchdog {
    pub fn new(
        engine: PropagationEngine,
        evaluator: HeartbeatEvaluator,
        clock: SharedClock,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            engine,
            evaluator,
            clock,
            config,
            bindings: Arc::new(DashMap::new()),
        }
    }

    /// Expect `node` to report at `schedule`'s interval from now on.
    /// Re-watching under the same schedule replaces its interval.
    pub fn watch(&self, node: &NodeRef, schedule: &Schedule) {
        self.engine.register_node(node);
        self.bindings.entry(node.clone()).or_default().insert(
            schedule.id,
            Binding {
                interval: schedule.interval(),
                thresholds: schedule.thresholds,
            },
        );
        debug!(node = %node, schedule_id = schedule.id, "Watching node");
    }

    /// Drops one schedule's binding. The node stays watched while any
    /// other schedule still binds it.
    pub fn unwatch(&self, node: &NodeRef, schedule_id: ScheduleId) -> bool {
        let removed = match self.bindings.get_mut(node) {
            Some(mut schedules) => schedules.remove(&schedule_id).is_some(),
            None => false,
        };
        self.bindings.remove_if(node, |_, schedules| schedules.is_empty());
        removed
    }

    /// Number of distinct nodes being watched.
    pub fn watched(&self) -> usize {
        self.bindings.len()
    }

    /// Schedules currently binding `node`, in id order.
    pub fn schedules_for(&self, node: &NodeRef) -> Vec<ScheduleId> {
        self.bindings
            .get(node)
            .map(|schedules| schedules.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Marks every silent bound leaf and returns the nodes that changed.
    pub fn scan(&self, now: DateTime<Utc>) -> Vec<NodeRef> {
        // Snapshot first so no shard lock is held across engine calls.
        let due: Vec<(NodeRef, Vec<Binding>)> = self
            .bindings
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().values().cloned().collect()))
            .collect();

        let mut marked = Vec::new();
        for (node, bindings) in due {
            // The most lenient binding decides.
            let Some(slowest) = bindings
                .iter()
                .max_by_key(|binding| self.evaluator.missed_window(binding.interval))
            else {
                continue;
            };
            let window = self.evaluator.missed_window(slowest.interval);
            let Some(cutoff) = now.checked_sub_signed(window) else {
                continue;
            };
            let status = self
                .evaluator
                .evaluate(&Observation::Missed, &slowest.thresholds);

            match self.engine.mark_stale(&node, cutoff, status) {
                Ok(Some(_)) => {
                    info!(node = %node, window_secs = window.num_seconds(), "Missed heartbeat");
                    marked.push(node);
                }
                Ok(None) => {}
                Err(e) => error!(node = %node, "Watchdog could not mark node: {}", e),
            }
        }
        marked
    }

    /// Runs [`Watchdog::scan`] on the configured period until aborted.
    pub fn spawn(&self) -> JoinHandle<()> {
        let watchdog = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(watchdog.config.scan_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let marked = watchdog.scan(watchdog.clock.now());
                if !marked.is_empty() {
                    info!(count = marked.len(), "Watchdog marked silent nodes");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{Clock, ManualClock, Status};

    fn setup() -> (Watchdog, PropagationEngine, ManualClock, Schedule) {
        let clock = ManualClock::default();
        let engine = PropagationEngine::new(Arc::new(clock.clone()));
        let watchdog = Watchdog::new(
            engine.clone(),
            HeartbeatEvaluator::default(),
            Arc::new(clock.clone()),
            WatchdogConfig::default(),
        );
        let schedule = Schedule::new(1, "ping", 10, ScheduleThresholds::new(200, 400)).unwrap();
        (watchdog, engine, clock, schedule)
    }

    #[test]
    fn test_silent_leaf_turns_unknown_and_propagates() {
        let (watchdog, engine, clock, schedule) = setup();
        let instance = NodeRef::instance(1);
        let service = NodeRef::service(1);

        engine.add_dependency(&service, &instance).unwrap();
        watchdog.watch(&instance, &schedule);
        engine.on_leaf_status_changed(&instance, Status::Healthy).unwrap();
        assert_eq!(engine.status(&service), Some(Status::Healthy));

        clock.advance(Duration::seconds(30));
        assert!(watchdog.scan(clock.now()).is_empty());

        clock.advance(Duration::seconds(1));
        assert_eq!(watchdog.scan(clock.now()), vec![instance.clone()]);
        assert_eq!(engine.status(&instance), Some(Status::Unknown));
        assert_eq!(engine.status(&service), Some(Status::Unknown));

        // Already unknown: nothing more to do.
        clock.advance(Duration::seconds(60));
        assert!(watchdog.scan(clock.now()).is_empty());
    }

    #[test]
    fn test_composite_and_unwatched_nodes_are_skipped() {
        let (watchdog, engine, clock, schedule) = setup();
        let service = NodeRef::service(1);
        let instance = NodeRef::instance(1);

        watchdog.watch(&service, &schedule);
        engine.add_dependency(&service, &instance).unwrap();
        engine.on_leaf_status_changed(&instance, Status::Warning).unwrap();

        clock.advance(Duration::seconds(120));
        assert!(watchdog.scan(clock.now()).is_empty());
        assert_eq!(engine.status(&service), Some(Status::Warning));

        assert!(watchdog.unwatch(&service, schedule.id));
        assert!(!watchdog.unwatch(&service, schedule.id));
        assert_eq!(watchdog.watched(), 0);
    }

    #[test]
    fn test_shared_node_needs_every_schedule_overdue() {
        let (watchdog, engine, clock, fast) = setup();
        let slow = Schedule::new(2, "slow", 60, ScheduleThresholds::new(200, 400)).unwrap();
        let instance = NodeRef::instance(1);

        watchdog.watch(&instance, &fast);
        watchdog.watch(&instance, &slow);
        engine.on_leaf_status_changed(&instance, Status::Healthy).unwrap();
        assert_eq!(watchdog.watched(), 1);
        assert_eq!(watchdog.schedules_for(&instance), vec![1, 2]);

        // Past the fast schedule's window, still inside the slow one's.
        clock.advance(Duration::seconds(31));
        assert!(watchdog.scan(clock.now()).is_empty());

        clock.advance(Duration::seconds(150));
        assert_eq!(watchdog.scan(clock.now()), vec![instance.clone()]);
        assert_eq!(engine.status(&instance), Some(Status::Unknown));
    }

    #[test]
    fn test_unwatching_one_schedule_keeps_the_other() {
        let (watchdog, engine, clock, first) = setup();
        let second = Schedule::new(2, "ping-2", 10, ScheduleThresholds::new(200, 400)).unwrap();
        let instance = NodeRef::instance(1);

        watchdog.watch(&instance, &first);
        watchdog.watch(&instance, &second);
        assert!(watchdog.unwatch(&instance, first.id));
        assert_eq!(watchdog.watched(), 1);
        assert_eq!(watchdog.schedules_for(&instance), vec![2]);

        engine.on_leaf_status_changed(&instance, Status::Healthy).unwrap();
        clock.advance(Duration::seconds(31));
        assert_eq!(watchdog.scan(clock.now()), vec![instance]);
    }
}
