pub use vigil_core;

mod manager;
mod store;

pub use manager::{LeaseConfig, LeaseManager, LeaseManagerStats};
pub use store::{InMemoryLeaseStore, LeaseStore};

// Re-export core types for convenience
pub use vigil_core::{AcquireOutcome, AgentId, FencingToken, Lease, LeaseKey, Result, VigilError};
