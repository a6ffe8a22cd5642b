//! # Vigil Coordinator
//!
//! Lease authority for the agent fleet and owner of the status graph.
//! Agents acquire `schedule:{id}` leases here, probe, and write results
//! back with their fencing token.

pub mod config;
pub mod routes;
pub mod state;
pub mod tasks;

pub use config::CoordinatorConfig;
pub use routes::{router, ApiError};
pub use state::{AppState, CoordinatorMetrics};
pub use tasks::BackgroundTasks;
