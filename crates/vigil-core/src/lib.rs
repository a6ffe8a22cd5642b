//! # Vigil Core
//!
//! Core types for the Vigil coordination and health-aggregation core.
//!
//! ## Lease coordination
//! - One agent per scheduled check, enforced by renewable leases
//! - Fencing tokens so a stale holder can never write back results
//!
//! ## Health aggregation
//! - Heartbeat samples evaluated against schedule thresholds
//! - Worst-status-wins propagation up the status dependency graph

pub mod api;
pub mod clock;
pub mod error;
pub mod heartbeat;
pub mod lease;
pub mod node;
pub mod status;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{Result, VigilError};
pub use heartbeat::{HeartbeatSample, ResourceMetrics, Schedule, ScheduleId, ScheduleThresholds};
pub use lease::{AcquireOutcome, AgentId, FencingToken, Lease, LeaseKey};
pub use node::{DependencyEdge, NodeId, NodeKind, NodeRef, StatusNode};
pub use status::{Status, StatusChange};

/// Current Vigil version for compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Vigil build information for telemetry and debugging
pub const BUILD_INFO: &str = concat!(
    "Vigil ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    ")"
);

/// Standard API endpoints for Vigil services
pub mod endpoints {
    pub const HEALTH: &str = "/health";
    pub const METRICS: &str = "/metrics";
    pub const API_V1_LEASES: &str = "/api/v1/leases";
    pub const API_V1_LEASES_ACQUIRE: &str = "/api/v1/leases/acquire";
    pub const API_V1_LEASES_RENEW: &str = "/api/v1/leases/renew";
    pub const API_V1_LEASES_RELEASE: &str = "/api/v1/leases/release";
    pub const API_V1_SCHEDULES: &str = "/api/v1/schedules";
    pub const API_V1_HEARTBEATS: &str = "/api/v1/heartbeats";
    pub const API_V1_DEPENDENCIES: &str = "/api/v1/dependencies";
    pub const API_V1_NODES: &str = "/api/v1/nodes";
    pub const API_V1_NODE: &str = "/api/v1/nodes/{kind}/{id}";
    pub const API_V1_EVENTS: &str = "/api/v1/events";
}
