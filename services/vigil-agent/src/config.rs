//! Command line and environment configuration

use clap::Parser;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;
use vigil_core::{NodeRef, ScheduleId, VigilError};

/// Which probe a target URL selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeScheme {
    /// `http://` or `https://`: GET, any 2xx is success.
    Http,
    /// `tcp://host:port`: a successful connect is success.
    Tcp,
}

impl ProbeScheme {
    pub fn of(url: &str) -> Option<Self> {
        let (scheme, rest) = url.split_once("://")?;
        if rest.is_empty() {
            return None;
        }
        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => Some(ProbeScheme::Http),
            "tcp" => Some(ProbeScheme::Tcp),
            _ => None,
        }
    }
}

/// One `--schedule id:kind:node_id:url` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTarget {
    pub schedule_id: ScheduleId,
    pub node: NodeRef,
    pub url: String,
}

impl ScheduleTarget {
    pub fn scheme(&self) -> Option<ProbeScheme> {
        ProbeScheme::of(&self.url)
    }
}

impl FromStr for ScheduleTarget {
    type Err = VigilError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| VigilError::InvalidSchedule {
            reason: format!("'{input}': {reason}"),
        };

        let (id, rest) = input
            .split_once(':')
            .ok_or_else(|| invalid("expected id:kind:node_id:url"))?;
        let schedule_id = id
            .trim()
            .parse::<ScheduleId>()
            .map_err(|_| invalid("schedule id must be an integer"))?;

        let (kind, rest) = rest
            .split_once(':')
            .ok_or_else(|| invalid("missing node"))?;
        let (node_id, url) = rest
            .split_once(':')
            .ok_or_else(|| invalid("missing probe url"))?;
        let node: NodeRef = format!("{kind}:{node_id}").parse()?;

        if url.trim().is_empty() {
            return Err(invalid("missing probe url"));
        }
        if ProbeScheme::of(url.trim()).is_none() {
            return Err(invalid("probe url must be http://, https:// or tcp://host:port"));
        }

        Ok(Self {
            schedule_id,
            node,
            url: url.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "vigil-agent")]
#[command(about = "Vigil Agent - runs leased probes and reports heartbeats")]
#[command(version = vigil_core::VERSION)]
pub struct AgentConfig {
    /// Coordinator base URL.
    #[arg(long, env = "VIGIL_COORDINATOR_URL", default_value = "http://127.0.0.1:8081")]
    pub coordinator: String,

    /// Stable agent identity; a random one is generated when unset.
    #[arg(long, env = "VIGIL_AGENT_ID")]
    pub agent_id: Option<Uuid>,

    /// Schedules to run, as `id:kind:node_id:url`. Repeatable.
    #[arg(long = "schedule", env = "VIGIL_SCHEDULES", value_delimiter = ',', required = true)]
    pub schedules: Vec<ScheduleTarget>,

    #[arg(long, env = "VIGIL_LEASE_TTL_SECS", default_value_t = 30)]
    pub lease_ttl_secs: u64,

    #[arg(long, env = "VIGIL_PROBE_TIMEOUT_SECS", default_value_t = 10)]
    pub probe_timeout_secs: u64,

    /// Upper bound for backoff while the lease store is unavailable.
    #[arg(long, env = "VIGIL_MAX_BACKOFF_SECS", default_value_t = 60)]
    pub max_backoff_secs: u64,
}

impl AgentConfig {
    pub fn agent_id(&self) -> Uuid {
        self.agent_id.unwrap_or_else(Uuid::new_v4)
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            lease_ttl: Duration::from_secs(self.lease_ttl_secs.max(3)),
            max_backoff: Duration::from_secs(self.max_backoff_secs.max(1)),
            ..RunnerConfig::default()
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }
}

/// Timing knobs for one schedule loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    pub lease_ttl: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RunnerConfig {
    /// Renew three times per TTL.
    pub fn renew_every(&self) -> Duration {
        (self.lease_ttl / 3).max(Duration::from_millis(1))
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}
