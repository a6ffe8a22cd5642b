//! # Vigil Agent
//!
//! Runs scheduled probes under a coordinator lease so that exactly one
//! agent in the fleet checks each schedule per interval.

pub mod client;
pub mod config;
pub mod probe;
pub mod runner;

pub use client::{Coordinator, HttpCoordinator};
pub use config::{AgentConfig, ProbeScheme, RunnerConfig, ScheduleTarget};
pub use probe::{HttpProbe, Probe, SchemeProbe, TcpProbe};
pub use runner::{Backoff, RunOutcome, ScheduleRunner};
