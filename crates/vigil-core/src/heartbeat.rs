//! Schedules and heartbeat samples

use crate::error::{Result, VigilError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub type ScheduleId = i64;

/// Upper bound for a schedule interval (one year).
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Response-time thresholds in milliseconds. Either side may be unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleThresholds {
    #[serde(default)]
    pub warning_ms: Option<u64>,
    #[serde(default)]
    pub critical_ms: Option<u64>,
}

impl ScheduleThresholds {
    pub fn new(warning_ms: u64, critical_ms: u64) -> Self {
        Self {
            warning_ms: Some(warning_ms),
            critical_ms: Some(critical_ms),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match (self.warning_ms, self.critical_ms) {
            (Some(warning), Some(critical)) if warning > critical => {
                Err(VigilError::InvalidSchedule {
                    reason: format!(
                        "warning threshold {warning}ms exceeds critical threshold {critical}ms"
                    ),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Periodic check definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub name: String,
    /// Minimum time between runs.
    pub interval_secs: u64,
    #[serde(default)]
    pub thresholds: ScheduleThresholds,
    #[serde(default)]
    pub include_response_body: bool,
}

impl Schedule {
    pub fn new(
        id: ScheduleId,
        name: impl Into<String>,
        interval_secs: u64,
        thresholds: ScheduleThresholds,
    ) -> Result<Self> {
        let schedule = Self {
            id,
            name: name.into(),
            interval_secs,
            thresholds,
            include_response_body: false,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 || self.interval_secs > MAX_INTERVAL_SECS {
            return Err(VigilError::InvalidSchedule {
                reason: format!(
                    "schedule {} interval must be 1-{MAX_INTERVAL_SECS}s",
                    self.id
                ),
            });
        }
        if self.name.trim().is_empty() || self.name.len() > 50 {
            return Err(VigilError::InvalidSchedule {
                reason: format!("schedule {} name must be 1-50 characters", self.id),
            });
        }
        self.thresholds.validate()
    }

    pub fn interval(&self) -> Duration {
        Duration::seconds(self.interval_secs.min(MAX_INTERVAL_SECS) as i64)
    }
}

/// Host resource readings attached to a sample. Usage values are fractions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    #[serde(default)]
    pub cpu_usage: Option<f64>,
    #[serde(default)]
    pub memory_usage: Option<f64>,
    #[serde(default)]
    pub disk_usage: Option<f64>,
    #[serde(default)]
    pub packet_loss: Option<f64>,
    #[serde(default)]
    pub jitter_ms: Option<u64>,
}

impl ResourceMetrics {
    /// cpu, memory and disk usage that were actually reported.
    pub fn usage_fractions(&self) -> impl Iterator<Item = f64> + '_ {
        [self.cpu_usage, self.memory_usage, self.disk_usage]
            .into_iter()
            .flatten()
    }
}

/// One probe measurement. Samples are never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatSample {
    pub executed_at: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metrics: ResourceMetrics,
}

impl HeartbeatSample {
    pub fn succeeded(executed_at: DateTime<Utc>, response_time_ms: Option<u64>) -> Self {
        Self {
            executed_at,
            success: true,
            response_time_ms,
            error_type: None,
            error_message: None,
            metrics: ResourceMetrics::default(),
        }
    }

    pub fn failed(
        executed_at: DateTime<Utc>,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            executed_at,
            success: false,
            response_time_ms: None,
            error_type: Some(error_type.into()),
            error_message: Some(error_message.into()),
            metrics: ResourceMetrics::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: ResourceMetrics) -> Self {
        self.metrics = metrics;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_validation() {
        assert!(Schedule::new(1, "api", 60, ScheduleThresholds::new(200, 400)).is_ok());
        assert!(Schedule::new(2, "api", 0, ScheduleThresholds::default()).is_err());
        assert!(Schedule::new(3, "", 60, ScheduleThresholds::default()).is_err());

        let inverted = Schedule::new(4, "api", 60, ScheduleThresholds::new(500, 100));
        match inverted {
            Err(VigilError::InvalidSchedule { reason }) => assert!(reason.contains("500ms")),
            other => panic!("Expected InvalidSchedule, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_defaults_from_sparse_json() {
        let sample: HeartbeatSample = serde_json::from_str(
            r#"{"executed_at":"2025-01-01T00:00:00Z","success":true,"metrics":{"cpu_usage":0.5}}"#,
        )
        .unwrap();

        assert_eq!(sample.response_time_ms, None);
        assert_eq!(sample.metrics.usage_fractions().collect::<Vec<_>>(), vec![0.5]);
    }
}
