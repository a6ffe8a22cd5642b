//! # Status Events
//!
//! Fan-out of [`StatusChange`] events to notification and index-refresh
//! subscribers. Publishing never blocks the propagation engine: the bus is a
//! bounded broadcast channel and slow subscribers skip ahead.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};
use vigil_core::StatusChange;

pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_RECENT_CAPACITY: usize = 256;

/// Receiver side of status changes.
pub trait EventSink: Send + Sync + std::fmt::Debug {
    fn publish(&self, change: &StatusChange);
}

/// Broadcast bus that also keeps a short ring of recent events for
/// operator reads.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StatusChange>,
    recent: Arc<Mutex<VecDeque<StatusChange>>>,
    recent_capacity: usize,
    published: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize, recent_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            recent: Arc::new(Mutex::new(VecDeque::with_capacity(recent_capacity))),
            recent_capacity,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Most recent events, newest last.
    pub fn recent(&self, limit: usize) -> Vec<StatusChange> {
        let recent = self.recent.lock();
        let skip = recent.len().saturating_sub(limit);
        recent.iter().skip(skip).cloned().collect()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_RECENT_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn publish(&self, change: &StatusChange) {
        {
            let mut recent = self.recent.lock();
            if self.recent_capacity > 0 {
                if recent.len() == self.recent_capacity {
                    recent.pop_front();
                }
                recent.push_back(change.clone());
            }
        }
        self.published.fetch_add(1, Ordering::Relaxed);

        // No subscribers is fine; the ring above still records the event.
        if self.sender.send(change.clone()).is_err() {
            debug!(node = %change.node, "No live subscribers for status change");
        }
    }
}

/// One subscriber's view of the bus.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<StatusChange>,
}

impl Subscription {
    /// Next event, or `None` once every bus handle is gone.
    pub async fn next(&mut self) -> Option<StatusChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status subscriber lagged, skipping ahead");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::next`].
    pub fn try_next(&mut self) -> Option<StatusChange> {
        loop {
            match self.receiver.try_recv() {
                Ok(change) => return Some(change),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status subscriber lagged, skipping ahead");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
