//! Command line and environment configuration

use chrono::Duration;
use clap::Parser;
use health_engine::{EvaluatorConfig, WatchdogConfig};
use lease_manager::LeaseConfig;
use std::net::SocketAddr;

const MAX_DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;
const MAX_MISSED_FACTOR: i64 = 1000;

#[derive(Debug, Clone, Parser)]
#[command(name = "vigil-coordinator")]
#[command(about = "Vigil Coordinator - lease authority and health aggregation")]
#[command(version = vigil_core::VERSION)]
pub struct CoordinatorConfig {
    /// Address to bind the HTTP API.
    #[arg(long, env = "VIGIL_LISTEN_ADDR", default_value = "0.0.0.0:8081")]
    pub listen: SocketAddr,

    /// Lease TTL granted when a request does not name one.
    #[arg(
        long,
        env = "VIGIL_LEASE_TTL_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..=MAX_DEFAULT_TTL_SECS)
    )]
    pub lease_ttl_secs: u64,

    #[arg(long, env = "VIGIL_SWEEP_INTERVAL_SECS", default_value_t = 5)]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "VIGIL_WATCHDOG_INTERVAL_SECS", default_value_t = 10)]
    pub watchdog_interval_secs: u64,

    /// A leaf is considered silent after `interval × missed_factor`.
    #[arg(
        long,
        env = "VIGIL_MISSED_FACTOR",
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..=MAX_MISSED_FACTOR)
    )]
    pub missed_factor: u32,

    /// Resource usage fraction treated as saturated.
    #[arg(long, env = "VIGIL_SATURATION_CEILING", default_value_t = 0.95)]
    pub saturation_ceiling: f64,

    #[arg(long, env = "VIGIL_EVENT_CAPACITY", default_value_t = status_events::DEFAULT_CAPACITY)]
    pub event_capacity: usize,

    /// Status changes kept for `GET /api/v1/events`.
    #[arg(long, env = "VIGIL_RECENT_EVENTS", default_value_t = status_events::DEFAULT_RECENT_CAPACITY)]
    pub recent_events: usize,

    /// Heartbeat samples kept per node.
    #[arg(long, env = "VIGIL_SAMPLE_HISTORY", default_value_t = 20)]
    pub sample_history: usize,
}

impl CoordinatorConfig {
    pub fn lease_config(&self) -> LeaseConfig {
        LeaseConfig {
            default_ttl: Duration::seconds(self.lease_ttl_secs.max(1) as i64),
            ..LeaseConfig::default()
        }
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            saturation_ceiling: self.saturation_ceiling,
            missed_factor: self.missed_factor,
        }
    }

    pub fn watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig {
            scan_every: std::time::Duration::from_secs(self.watchdog_interval_secs.max(1)),
        }
    }

    pub fn sweep_every(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
