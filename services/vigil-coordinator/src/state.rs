//! Shared coordinator state
//!
//! Wires the lease manager, the propagation engine and the event bus
//! together. Heartbeat write-back goes validate → evaluate → propagate.

use crate::config::CoordinatorConfig;
use chrono::Duration;
use dashmap::DashMap;
use health_engine::{
    EngineStats, HeartbeatEvaluator, Observation, PropagationEngine, PropagationReport, Watchdog,
};
use lease_manager::{InMemoryLeaseStore, LeaseManager, LeaseManagerStats, LeaseStore};
use parking_lot::Mutex;
use serde::Serialize;
use status_events::EventBus;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use vigil_core::api::{
    NodeDetailResponse, ScheduleBinding, SubmitHeartbeatRequest, SubmitHeartbeatResponse,
};
use vigil_core::{
    HeartbeatSample, LeaseKey, NodeRef, Result, ScheduleId, SharedClock, VigilError,
};

#[derive(Debug, Default)]
struct HeartbeatCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorMetrics {
    pub service: &'static str,
    pub version: &'static str,
    pub leases: LeaseManagerStats,
    pub propagation: EngineStats,
    pub heartbeats_accepted: u64,
    pub heartbeats_rejected: u64,
    pub events_published: u64,
    pub event_subscribers: usize,
    pub schedules: usize,
    pub watched_nodes: usize,
}

/// Everything the HTTP handlers and background tasks share. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub leases: LeaseManager,
    pub engine: PropagationEngine,
    pub evaluator: HeartbeatEvaluator,
    pub watchdog: Watchdog,
    pub events: EventBus,
    schedules: Arc<DashMap<ScheduleId, ScheduleBinding>>,
    history: Arc<DashMap<NodeRef, Mutex<VecDeque<HeartbeatSample>>>>,
    history_capacity: usize,
    counters: Arc<HeartbeatCounters>,
}

impl AppState {
    /// State backed by an in-memory lease store.
    pub fn new(config: &CoordinatorConfig, clock: SharedClock) -> Self {
        Self::with_store(config, clock, Arc::new(InMemoryLeaseStore::new()))
    }

    pub fn with_store(
        config: &CoordinatorConfig,
        clock: SharedClock,
        store: Arc<dyn LeaseStore>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity, config.recent_events);
        let engine = PropagationEngine::new(clock.clone()).with_sink(Arc::new(events.clone()));
        let evaluator = HeartbeatEvaluator::new(config.evaluator_config());
        let watchdog = Watchdog::new(
            engine.clone(),
            evaluator,
            clock.clone(),
            config.watchdog_config(),
        );

        Self {
            leases: LeaseManager::new(store, clock, config.lease_config()),
            engine,
            evaluator,
            watchdog,
            events,
            schedules: Arc::new(DashMap::new()),
            history: Arc::new(DashMap::new()),
            history_capacity: config.sample_history,
            counters: Arc::new(HeartbeatCounters::default()),
        }
    }

    /// TTL named by a lease request, or the configured default.
    pub fn ttl_or_default(&self, ttl_secs: Option<u64>) -> Result<Duration> {
        let Some(secs) = ttl_secs else {
            return Ok(self.leases.config().default_ttl);
        };
        i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or(VigilError::InvalidTtl {
                ttl_ms: i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX),
            })
    }

    /// Registers or replaces a schedule and the nodes it probes. Nodes
    /// dropped from a replaced binding stop being watched.
    #[instrument(skip(self, binding), fields(schedule_id = binding.schedule.id))]
    pub fn register_schedule(&self, binding: ScheduleBinding) -> Result<ScheduleBinding> {
        binding.schedule.validate()?;

        let mut binding = binding;
        let mut seen = HashSet::new();
        binding.nodes.retain(|node| seen.insert(node.clone()));

        if let Some(previous) = self.schedules.get(&binding.schedule.id) {
            for node in previous.nodes.iter().filter(|n| !seen.contains(*n)) {
                self.watchdog.unwatch(node, binding.schedule.id);
            }
        }
        for node in &binding.nodes {
            self.watchdog.watch(node, &binding.schedule);
        }

        info!(
            "Schedule '{}' registered for {} node(s)",
            binding.schedule.name,
            binding.nodes.len()
        );
        self.schedules.insert(binding.schedule.id, binding.clone());
        Ok(binding)
    }

    pub fn schedule(&self, schedule_id: ScheduleId) -> Result<ScheduleBinding> {
        self.schedules
            .get(&schedule_id)
            .map(|entry| entry.value().clone())
            .ok_or(VigilError::ScheduleNotFound { schedule_id })
    }

    pub fn schedules(&self) -> Vec<ScheduleBinding> {
        let mut schedules: Vec<ScheduleBinding> = self
            .schedules
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        schedules.sort_by_key(|binding| binding.schedule.id);
        schedules
    }

    /// Accepts a probe result from the holder of `schedule:{id}`.
    ///
    /// The fencing token is checked before anything is evaluated, so a
    /// holder that lost its lease mid-probe can never write back.
    #[instrument(skip(self, request), fields(schedule_id = request.schedule_id, node = %request.node))]
    pub async fn submit_heartbeat(
        &self,
        request: SubmitHeartbeatRequest,
    ) -> Result<SubmitHeartbeatResponse> {
        let result = self.apply_heartbeat(request).await;
        match &result {
            Ok(_) => self.counters.accepted.fetch_add(1, Ordering::Relaxed),
            Err(e) => {
                warn!("Heartbeat rejected: {}", e);
                self.counters.rejected.fetch_add(1, Ordering::Relaxed)
            }
        };
        result
    }

    async fn apply_heartbeat(
        &self,
        request: SubmitHeartbeatRequest,
    ) -> Result<SubmitHeartbeatResponse> {
        let binding = self.schedule(request.schedule_id)?;
        if !binding.nodes.contains(&request.node) {
            return Err(VigilError::NodeNotFound { node: request.node });
        }

        self.leases
            .validate(
                &LeaseKey::schedule(request.schedule_id),
                request.holder,
                request.token,
            )
            .await?;

        let status = self.evaluator.evaluate(
            &Observation::Reported(request.sample.clone()),
            &binding.schedule.thresholds,
        );
        let PropagationReport { changes, .. } =
            self.engine.on_leaf_status_changed(&request.node, status)?;

        self.record_sample(&request.node, request.sample);

        Ok(SubmitHeartbeatResponse {
            node: request.node,
            status,
            changes,
        })
    }

    fn record_sample(&self, node: &NodeRef, sample: HeartbeatSample) {
        if self.history_capacity == 0 {
            return;
        }
        let entry = self
            .history
            .entry(node.clone())
            .or_insert_with(|| Mutex::new(VecDeque::with_capacity(self.history_capacity)));
        let mut samples = entry.lock();
        if samples.len() == self.history_capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Newest sample last.
    pub fn recent_samples(&self, node: &NodeRef) -> Vec<HeartbeatSample> {
        self.history
            .get(node)
            .map(|entry| entry.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn node_detail(&self, node: &NodeRef) -> Result<NodeDetailResponse> {
        let snapshot = self
            .engine
            .snapshot(node)
            .ok_or_else(|| VigilError::NodeNotFound { node: node.clone() })?;

        Ok(NodeDetailResponse {
            node: snapshot,
            parents: self.engine.parents(node),
            children: self.engine.children(node),
            recent_samples: self.recent_samples(node),
        })
    }

    pub fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            service: "vigil-coordinator",
            version: vigil_core::VERSION,
            leases: self.leases.stats(),
            propagation: self.engine.stats(),
            heartbeats_accepted: self.counters.accepted.load(Ordering::Relaxed),
            heartbeats_rejected: self.counters.rejected.load(Ordering::Relaxed),
            events_published: self.events.published(),
            event_subscribers: self.events.subscriber_count(),
            schedules: self.schedules.len(),
            watched_nodes: self.watchdog.watched(),
        }
    }
}
