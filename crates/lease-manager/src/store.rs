//! Lease store abstraction and the in-memory implementation
//!
//! The store is the only shared state that needs cross-agent mutual
//! exclusion. Every mutation is a compare-and-swap on the full record so
//! two writers that read the same state can never both win.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};
use vigil_core::{FencingToken, Lease, LeaseKey, Result, VigilError};

#[async_trait]
pub trait LeaseStore: Send + Sync + std::fmt::Debug {
    async fn load(&self, resource: &LeaseKey) -> Result<Option<Lease>>;

    /// Replaces the record for `resource` with `next` (or deletes it when
    /// `next` is `None`) iff the stored record equals `expected`.
    /// Returns `false` without writing when the precondition does not hold.
    async fn compare_and_swap(
        &self,
        resource: &LeaseKey,
        expected: Option<&Lease>,
        next: Option<Lease>,
    ) -> Result<bool>;

    async fn list(&self) -> Result<Vec<Lease>>;

    /// Hands out a fencing token larger than any previously issued.
    async fn next_token(&self) -> Result<FencingToken>;
}

/// Sharded in-process store. Each key's CAS runs under its shard lock.
#[derive(Debug)]
pub struct InMemoryLeaseStore {
    records: DashMap<LeaseKey, Lease>,
    tokens: AtomicU64,
    available: AtomicBool,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            tokens: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Simulates an outage: every call fails with `StoreUnavailable`
    /// until availability is restored.
    pub fn set_available(&self, available: bool) {
        if !available {
            warn!("In-memory lease store marked unavailable");
        }
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VigilError::StoreUnavailable {
                reason: "in-memory lease store is offline".to_string(),
            })
        }
    }
}

impl Default for InMemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn load(&self, resource: &LeaseKey) -> Result<Option<Lease>> {
        self.ensure_available()?;
        Ok(self.records.get(resource).map(|entry| entry.value().clone()))
    }

    async fn compare_and_swap(
        &self,
        resource: &LeaseKey,
        expected: Option<&Lease>,
        next: Option<Lease>,
    ) -> Result<bool> {
        self.ensure_available()?;

        match self.records.entry(resource.clone()) {
            Entry::Occupied(mut occupied) => {
                if expected != Some(occupied.get()) {
                    debug!(resource = %resource, "CAS precondition failed on existing record");
                    return Ok(false);
                }
                match next {
                    Some(lease) => {
                        occupied.insert(lease);
                    }
                    None => {
                        occupied.remove();
                    }
                }
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    debug!(resource = %resource, "CAS precondition failed on missing record");
                    return Ok(false);
                }
                if let Some(lease) = next {
                    vacant.insert(lease);
                }
                Ok(true)
            }
        }
    }

    async fn list(&self) -> Result<Vec<Lease>> {
        self.ensure_available()?;
        Ok(self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn next_token(&self) -> Result<FencingToken> {
        self.ensure_available()?;
        Ok(self.tokens.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
