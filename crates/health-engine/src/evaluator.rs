//! Heartbeat evaluation
//!
//! Maps one probe observation and its schedule thresholds to a [`Status`].
//! Evaluation is pure: no clock, no shared state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use vigil_core::{HeartbeatSample, ScheduleThresholds, Status};

pub const DEFAULT_SATURATION_CEILING: f64 = 0.95;
pub const DEFAULT_MISSED_FACTOR: u32 = 3;

/// What the caller observed for a monitored object during one interval.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Reported(HeartbeatSample),
    /// Nothing arrived within `interval × missed_factor`.
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Resource usage fraction at or above which a host counts as saturated.
    pub saturation_ceiling: f64,
    pub missed_factor: u32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            saturation_ceiling: DEFAULT_SATURATION_CEILING,
            missed_factor: DEFAULT_MISSED_FACTOR,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeartbeatEvaluator {
    config: EvaluatorConfig,
}

impl HeartbeatEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn evaluate(&self, observation: &Observation, thresholds: &ScheduleThresholds) -> Status {
        match observation {
            Observation::Reported(sample) => self.evaluate_sample(sample, thresholds),
            Observation::Missed => Status::Unknown,
        }
    }

    /// First matching rule wins.
    pub fn evaluate_sample(&self, sample: &HeartbeatSample, thresholds: &ScheduleThresholds) -> Status {
        if !sample.success {
            return Status::Critical;
        }

        match sample.response_time_ms {
            Some(latency) => {
                if thresholds.critical_ms.is_some_and(|critical| latency >= critical) {
                    Status::Critical
                } else if thresholds.warning_ms.is_some_and(|warning| latency >= warning) {
                    Status::Warning
                } else {
                    Status::Healthy
                }
            }
            None if self.is_saturated(sample) => Status::Warning,
            None => Status::Healthy,
        }
    }

    fn is_saturated(&self, sample: &HeartbeatSample) -> bool {
        sample
            .metrics
            .usage_fractions()
            .any(|usage| usage >= self.config.saturation_ceiling)
    }

    /// True once nothing has been heard for longer than
    /// `interval × missed_factor`.
    pub fn is_missed(&self, last_updated: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> bool {
        now - last_updated > self.missed_window(interval)
    }

    /// Saturates at [`Duration::MAX`] instead of overflowing.
    pub fn missed_window(&self, interval: Duration) -> Duration {
        i32::try_from(self.config.missed_factor.max(1))
            .ok()
            .and_then(|factor| interval.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}
