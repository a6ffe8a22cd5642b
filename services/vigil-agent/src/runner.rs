//! Lease-guarded schedule loop
//!
//! Each run claims `schedule:{id}`, probes while renewing the lease every
//! `ttl / 3`, and writes the sample back with the lease's fencing token.
//! Losing the lease mid-probe cancels the probe and drops its result.

use crate::client::Coordinator;
use crate::config::{RunnerConfig, ScheduleTarget};
use crate::probe::Probe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use vigil_core::api::{SubmitHeartbeatRequest, SubmitHeartbeatResponse};
use vigil_core::{AcquireOutcome, AgentId, LeaseKey, Result, VigilError};

/// What one pass of the schedule loop ended with.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Reported(SubmitHeartbeatResponse),
    /// Another agent holds the schedule; nothing was probed.
    Held { holder: AgentId },
    /// The lease was taken over before the result could be written back.
    LeaseLost,
}

/// Exponential backoff between `initial` and `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleRunner {
    coordinator: Arc<dyn Coordinator>,
    probe: Arc<dyn Probe>,
    agent_id: AgentId,
    target: ScheduleTarget,
    config: RunnerConfig,
}

impl ScheduleRunner {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        probe: Arc<dyn Probe>,
        agent_id: AgentId,
        target: ScheduleTarget,
        config: RunnerConfig,
    ) -> Self {
        Self {
            coordinator,
            probe,
            agent_id,
            target,
            config,
        }
    }

    pub fn resource(&self) -> LeaseKey {
        LeaseKey::schedule(self.target.schedule_id)
    }

    /// One acquire → probe → submit pass.
    #[instrument(skip(self), fields(schedule_id = self.target.schedule_id, node = %self.target.node))]
    pub async fn run_once(&self) -> Result<RunOutcome> {
        let resource = self.resource();
        let ttl = self.config.lease_ttl;

        let lease = match self.coordinator.acquire(&resource, self.agent_id, ttl).await? {
            AcquireOutcome::Granted { lease } => lease,
            AcquireOutcome::Held { lease } => {
                debug!(holder = %lease.agent_id, "Schedule held by another agent");
                return Ok(RunOutcome::Held {
                    holder: lease.agent_id,
                });
            }
        };

        let renew_every = self.config.renew_every();
        let mut renewals = tokio::time::interval_at(Instant::now() + renew_every, renew_every);
        renewals.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let probe = self.probe.run(&self.target.url);
        tokio::pin!(probe);

        let sample = loop {
            tokio::select! {
                sample = &mut probe => break sample,
                _ = renewals.tick() => {
                    match self.coordinator.renew(&resource, self.agent_id, ttl).await {
                        Ok(_) => debug!("Lease renewed during probe"),
                        Err(VigilError::LeaseLost { .. }) => {
                            warn!("Lease lost mid-probe, discarding result");
                            return Ok(RunOutcome::LeaseLost);
                        }
                        // The write-back is fenced, so keep probing.
                        Err(e) => warn!("Lease renewal failed: {}", e),
                    }
                }
            }
        };

        let request = SubmitHeartbeatRequest {
            schedule_id: self.target.schedule_id,
            holder: self.agent_id,
            token: lease.token,
            node: self.target.node.clone(),
            sample,
        };
        match self.coordinator.submit(request).await {
            Ok(response) => {
                info!(
                    status = %response.status,
                    changes = response.changes.len(),
                    "Heartbeat reported"
                );
                Ok(RunOutcome::Reported(response))
            }
            Err(VigilError::LeaseLost { .. }) => {
                warn!("Write-back refused, lease was taken over");
                Ok(RunOutcome::LeaseLost)
            }
            Err(e) => Err(e),
        }
    }

    /// Loops until `shutdown` flips to true, then releases the lease.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);

        let interval = loop {
            match self.coordinator.schedule(self.target.schedule_id).await {
                Ok(schedule) => {
                    break schedule
                        .interval()
                        .to_std()
                        .unwrap_or(Duration::from_secs(60))
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        schedule_id = self.target.schedule_id,
                        "Schedule lookup failed, retrying in {:?}: {}", delay, e
                    );
                    if wait_or_shutdown(delay, &mut shutdown).await {
                        return;
                    }
                }
            }
        };
        backoff.reset();
        info!(
            schedule_id = self.target.schedule_id,
            "Running schedule every {}s",
            interval.as_secs()
        );

        loop {
            let delay = match self.run_once().await {
                Ok(_) => {
                    backoff.reset();
                    interval
                }
                Err(e) if e.is_retryable() => {
                    let delay = backoff.next_delay();
                    warn!("Coordinator unavailable, backing off {:?}: {}", delay, e);
                    delay
                }
                Err(e) => {
                    warn!("Schedule run failed: {}", e);
                    interval
                }
            };

            if wait_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        match self.coordinator.release(&self.resource(), self.agent_id).await {
            Ok(true) => info!(schedule_id = self.target.schedule_id, "Lease released"),
            Ok(false) => {}
            Err(e) => warn!("Lease release failed on shutdown: {}", e),
        }
    }
}

/// Sleeps for `delay`; true when shutdown was requested meanwhile.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
