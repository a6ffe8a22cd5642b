//! Lease Manager Implementation
//!
//! Acquire, renew and release are each a single compare-and-swap against
//! the store, conditioned on the record that was just read. Losing a CAS
//! means another agent wrote first; the manager re-reads and decides again.

use crate::store::LeaseStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use vigil_core::{
    AcquireOutcome, AgentId, FencingToken, Lease, LeaseKey, Result, SharedClock, VigilError,
};

/// Lease behavior tuning knobs.
///
/// `default_ttl` must exceed the expected clock skew between agents plus one
/// probe duration, otherwise a still-working holder can be preempted.
#[derive(Clone, Debug)]
pub struct LeaseConfig {
    pub default_ttl: Duration,
    pub max_cas_attempts: usize,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::seconds(30),
            max_cas_attempts: 8,
        }
    }
}

#[derive(Debug, Default)]
struct LeaseCounters {
    granted: AtomicU64,
    conflicts: AtomicU64,
    renewed: AtomicU64,
    lost: AtomicU64,
    released: AtomicU64,
    reclaimed: AtomicU64,
}

/// Lease manager statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseManagerStats {
    pub granted: u64,
    pub conflicts: u64,
    pub renewed: u64,
    pub lost: u64,
    pub released: u64,
    pub reclaimed: u64,
}

/// Acquire/renew/release/sweep protocol over a shared [`LeaseStore`].
///
/// Clones share the store, the clock and the sweep guard.
#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn LeaseStore>,
    clock: SharedClock,
    config: LeaseConfig,
    sweep_guard: Arc<Mutex<()>>,
    counters: Arc<LeaseCounters>,
}

impl std::fmt::Debug for LeaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseManager")
            .field("store", &self.store)
            .field("default_ttl", &self.config.default_ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

impl LeaseManager {
    pub fn new(store: Arc<dyn LeaseStore>, clock: SharedClock, config: LeaseConfig) -> Self {
        info!(
            "Initializing lease manager (default ttl {}s)",
            config.default_ttl.num_seconds()
        );
        Self {
            store,
            clock,
            config,
            sweep_guard: Arc::new(Mutex::new(())),
            counters: Arc::new(LeaseCounters::default()),
        }
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Claims `resource` for `holder`.
    ///
    /// Granted when the resource is free, expired, or already held by
    /// `holder` (re-acquire refreshes both timestamps and keeps the token).
    /// A different holder's live lease yields [`AcquireOutcome::Held`].
    #[instrument(skip(self, resource), fields(resource = %resource))]
    pub async fn acquire(
        &self,
        resource: &LeaseKey,
        holder: AgentId,
        ttl: Duration,
    ) -> Result<AcquireOutcome> {
        check_ttl(ttl)?;

        for attempt in 1..=self.config.max_cas_attempts {
            let current = self.store.load(resource).await?;
            let now = self.clock.now();

            let token = match &current {
                Some(lease) if !lease.is_expired_at(now) && !lease.is_held_by(&holder) => {
                    self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                    debug!(current_holder = %lease.agent_id, "Lease held by another agent");
                    return Ok(AcquireOutcome::Held {
                        lease: lease.clone(),
                    });
                }
                Some(lease) if !lease.is_expired_at(now) => lease.token,
                _ => self.store.next_token().await?,
            };

            let next = Lease {
                resource: resource.clone(),
                agent_id: holder,
                acquired_at: now,
                expires_at: expiry(now, ttl)?,
                token,
            };

            if self
                .store
                .compare_and_swap(resource, current.as_ref(), Some(next.clone()))
                .await?
            {
                self.counters.granted.fetch_add(1, Ordering::Relaxed);
                if let Some(previous) = current.filter(|lease| !lease.is_held_by(&holder)) {
                    info!(previous_holder = %previous.agent_id, token, "Took over expired lease");
                } else {
                    info!(token, "Lease granted");
                }
                return Ok(AcquireOutcome::Granted { lease: next });
            }

            debug!(attempt, "Lost acquire CAS race, re-reading");
        }

        Err(self.contention(resource))
    }

    /// Extends the caller's live lease to `now + ttl`.
    ///
    /// Fails with `LeaseLost` when the lease expired or changed hands; the
    /// caller must stop work immediately.
    #[instrument(skip(self, resource), fields(resource = %resource))]
    pub async fn renew(
        &self,
        resource: &LeaseKey,
        holder: AgentId,
        ttl: Duration,
    ) -> Result<Lease> {
        check_ttl(ttl)?;

        for attempt in 1..=self.config.max_cas_attempts {
            let current = self.store.load(resource).await?;
            let now = self.clock.now();

            let lease = match current {
                Some(lease) if lease.is_held_by(&holder) && !lease.is_expired_at(now) => lease,
                _ => return Err(self.lost(resource)),
            };

            let next = Lease {
                expires_at: expiry(now, ttl)?,
                ..lease.clone()
            };

            if self
                .store
                .compare_and_swap(resource, Some(&lease), Some(next.clone()))
                .await?
            {
                self.counters.renewed.fetch_add(1, Ordering::Relaxed);
                debug!(expires_at = %next.expires_at, "Lease renewed");
                return Ok(next);
            }

            debug!(attempt, "Lost renew CAS race, re-reading");
        }

        Err(self.contention(resource))
    }

    /// Deletes the lease iff `holder` owns the record. Returns `false`
    /// otherwise, which is not an error.
    #[instrument(skip(self, resource), fields(resource = %resource))]
    pub async fn release(&self, resource: &LeaseKey, holder: AgentId) -> Result<bool> {
        for attempt in 1..=self.config.max_cas_attempts {
            let lease = match self.store.load(resource).await? {
                Some(lease) if lease.is_held_by(&holder) => lease,
                _ => {
                    debug!("Release ignored, caller does not hold the lease");
                    return Ok(false);
                }
            };

            if self
                .store
                .compare_and_swap(resource, Some(&lease), None)
                .await?
            {
                self.counters.released.fetch_add(1, Ordering::Relaxed);
                info!("Lease released");
                return Ok(true);
            }

            debug!(attempt, "Lost release CAS race, re-reading");
        }

        Err(self.contention(resource))
    }

    /// Write-back check: the caller must still hold the live lease granted
    /// with `token`.
    pub async fn validate(
        &self,
        resource: &LeaseKey,
        holder: AgentId,
        token: FencingToken,
    ) -> Result<Lease> {
        let now = self.clock.now();
        match self.store.load(resource).await? {
            Some(lease)
                if lease.is_held_by(&holder) && lease.token == token && !lease.is_expired_at(now) =>
            {
                Ok(lease)
            }
            other => {
                warn!(
                    resource = %resource,
                    holder = %holder,
                    token,
                    current_token = ?other.as_ref().map(|lease| lease.token),
                    "Rejected write-back from stale lease holder"
                );
                Err(self.lost(resource))
            }
        }
    }

    /// Deletes every lease that expired strictly before `now`.
    ///
    /// At most one sweep runs at a time; an overlapping call returns 0.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let Ok(_guard) = self.sweep_guard.try_lock() else {
            debug!("Sweep already in flight, skipping");
            return Ok(0);
        };

        let mut reclaimed = 0;
        for lease in self.store.list().await? {
            if !lease.is_reclaimable_at(now) {
                continue;
            }
            // A renewal that lands first changes the record and wins.
            if self
                .store
                .compare_and_swap(&lease.resource, Some(&lease), None)
                .await?
            {
                info!(resource = %lease.resource, holder = %lease.agent_id, "Reclaimed expired lease");
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            self.counters
                .reclaimed
                .fetch_add(reclaimed as u64, Ordering::Relaxed);
        }
        Ok(reclaimed)
    }

    pub async fn get(&self, resource: &LeaseKey) -> Result<Option<Lease>> {
        self.store.load(resource).await
    }

    /// All lease records ordered by resource, expired ones included.
    pub async fn list(&self) -> Result<Vec<Lease>> {
        let mut leases = self.store.list().await?;
        leases.sort_by(|a, b| a.resource.cmp(&b.resource));
        Ok(leases)
    }

    /// Runs [`LeaseManager::sweep`] every `every` until the handle is aborted.
    pub fn spawn_sweeper(&self, every: std::time::Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(error) = manager.sweep(manager.now()).await {
                    warn!(%error, "Lease sweep failed");
                }
            }
        })
    }

    pub fn stats(&self) -> LeaseManagerStats {
        LeaseManagerStats {
            granted: self.counters.granted.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
            renewed: self.counters.renewed.load(Ordering::Relaxed),
            lost: self.counters.lost.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
            reclaimed: self.counters.reclaimed.load(Ordering::Relaxed),
        }
    }

    fn lost(&self, resource: &LeaseKey) -> VigilError {
        self.counters.lost.fetch_add(1, Ordering::Relaxed);
        VigilError::LeaseLost {
            resource: resource.clone(),
        }
    }

    fn contention(&self, resource: &LeaseKey) -> VigilError {
        warn!(resource = %resource, "Lease CAS did not settle");
        VigilError::StoreUnavailable {
            reason: format!(
                "compare-and-swap on {resource} did not settle after {} attempts",
                self.config.max_cas_attempts
            ),
        }
    }
}

fn check_ttl(ttl: Duration) -> Result<()> {
    if ttl <= Duration::zero() {
        return Err(VigilError::InvalidTtl {
            ttl_ms: ttl.num_milliseconds(),
        });
    }
    Ok(())
}

/// `now + ttl`, rejecting TTLs that run past the representable calendar.
fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(ttl).ok_or(VigilError::InvalidTtl {
        ttl_ms: ttl.num_milliseconds(),
    })
}
