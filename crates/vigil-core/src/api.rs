//! Request and response bodies shared by the coordinator, agent and CLI

use crate::heartbeat::{HeartbeatSample, Schedule, ScheduleId};
use crate::lease::{AgentId, FencingToken, Lease, LeaseKey};
use crate::node::{DependencyEdge, NodeRef, StatusNode};
use crate::status::{Status, StatusChange};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireLeaseRequest {
    pub resource: LeaseKey,
    pub holder: AgentId,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewLeaseRequest {
    pub resource: LeaseKey,
    pub holder: AgentId,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseLeaseRequest {
    pub resource: LeaseKey,
    pub holder: AgentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseResponse {
    pub lease: Lease,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseLeaseResponse {
    pub released: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseListResponse {
    pub leases: Vec<Lease>,
    pub total: usize,
}

/// A schedule together with the monitored objects it probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBinding {
    pub schedule: Schedule,
    #[serde(default)]
    pub nodes: Vec<NodeRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleListResponse {
    pub schedules: Vec<ScheduleBinding>,
    pub total: usize,
}

/// Probe result handed back by the agent holding `schedule:{schedule_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitHeartbeatRequest {
    pub schedule_id: ScheduleId,
    pub holder: AgentId,
    pub token: FencingToken,
    pub node: NodeRef,
    pub sample: HeartbeatSample,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitHeartbeatResponse {
    pub node: NodeRef,
    pub status: Status,
    pub changes: Vec<StatusChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyRequest {
    pub parent: NodeRef,
    pub child: NodeRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyResponse {
    pub edge: DependencyEdge,
    pub applied: bool,
    pub changes: Vec<StatusChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeListResponse {
    pub edges: Vec<DependencyEdge>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeListResponse {
    pub nodes: Vec<StatusNode>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDetailResponse {
    pub node: StatusNode,
    pub parents: Vec<NodeRef>,
    pub children: Vec<NodeRef>,
    pub recent_samples: Vec<HeartbeatSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventListResponse {
    pub events: Vec<StatusChange>,
    pub total: usize,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}
