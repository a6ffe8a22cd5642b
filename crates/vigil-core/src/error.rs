//! Error types for the Vigil core

use crate::heartbeat::ScheduleId;
use crate::lease::{AgentId, LeaseKey};
use crate::node::NodeRef;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VigilError>;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("Lock conflict: {resource} is held by agent {holder}")]
    LockConflict { resource: LeaseKey, holder: AgentId },

    #[error("Lease lost: {resource} is no longer held by the caller")]
    LeaseLost { resource: LeaseKey },

    #[error("Lease store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Invalid lease ttl: {ttl_ms}ms")]
    InvalidTtl { ttl_ms: i64 },

    #[error("Cycle detected: {child} already reaches {parent}")]
    CycleDetected { parent: NodeRef, child: NodeRef },

    #[error("Duplicate edge: {parent} -> {child}")]
    DuplicateEdge { parent: NodeRef, child: NodeRef },

    #[error("Inconsistent aggregate: {node} has no children")]
    InconsistentAggregate { node: NodeRef },

    #[error("Composite node: {node} derives its status from its children")]
    CompositeNode { node: NodeRef },

    #[error("Node not found: {node}")]
    NodeNotFound { node: NodeRef },

    #[error("Schedule not found: {schedule_id}")]
    ScheduleNotFound { schedule_id: ScheduleId },

    #[error("Invalid schedule: {reason}")]
    InvalidSchedule { reason: String },

    #[error("Invalid node reference: {input}")]
    InvalidNodeRef { input: String },

    #[error("Coordinator rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },
}

impl VigilError {
    /// Stable machine-readable name, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            VigilError::LockConflict { .. } => "lock_conflict",
            VigilError::LeaseLost { .. } => "lease_lost",
            VigilError::StoreUnavailable { .. } => "store_unavailable",
            VigilError::InvalidTtl { .. } => "invalid_ttl",
            VigilError::CycleDetected { .. } => "cycle_detected",
            VigilError::DuplicateEdge { .. } => "duplicate_edge",
            VigilError::InconsistentAggregate { .. } => "inconsistent_aggregate",
            VigilError::CompositeNode { .. } => "composite_node",
            VigilError::NodeNotFound { .. } => "node_not_found",
            VigilError::ScheduleNotFound { .. } => "schedule_not_found",
            VigilError::InvalidSchedule { .. } => "invalid_schedule",
            VigilError::InvalidNodeRef { .. } => "invalid_node_ref",
            VigilError::Rejected { .. } => "rejected",
            VigilError::SerializationError { .. } => "serialization_error",
        }
    }

    /// Infrastructure failures the caller should retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VigilError::StoreUnavailable { .. })
    }
}
