//! Lease types

use crate::error::{Result, VigilError};
use crate::heartbeat::ScheduleId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type AgentId = Uuid;

/// Monotonic number attached to a lease grant. Kept across renewals,
/// replaced whenever the lease changes hands.
pub type FencingToken = u64;

/// Name of a lockable resource, e.g. `schedule:42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseKey(String);

impl LeaseKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn schedule(schedule_id: ScheduleId) -> Self {
        Self(format!("schedule:{schedule_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LeaseKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Persisted lease record (the `AgentLock` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub resource: LeaseKey,
    pub agent_id: AgentId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token: FencingToken,
}

impl Lease {
    /// A lease stops protecting its holder once `expires_at` is reached.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Sweep only reclaims leases strictly past their expiry.
    pub fn is_reclaimable_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_held_by(&self, holder: &AgentId) -> bool {
        &self.agent_id == holder
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Result of an acquire attempt. Losing the race is a normal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AcquireOutcome {
    Granted { lease: Lease },
    Held { lease: Lease },
}

impl AcquireOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AcquireOutcome::Granted { .. })
    }

    pub fn lease(&self) -> &Lease {
        match self {
            AcquireOutcome::Granted { lease } | AcquireOutcome::Held { lease } => lease,
        }
    }

    /// Converts a lost race into `LockConflict` for callers that want `?`.
    pub fn into_result(self) -> Result<Lease> {
        match self {
            AcquireOutcome::Granted { lease } => Ok(lease),
            AcquireOutcome::Held { lease } => Err(VigilError::LockConflict {
                resource: lease.resource,
                holder: lease.agent_id,
            }),
        }
    }
}
