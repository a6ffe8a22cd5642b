//! Health status and status-change events

use crate::node::NodeRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Healthy,
        Status::Unknown,
        Status::Warning,
        Status::Critical,
    ];

    /// Rank used by worst-status-wins. UNKNOWN sits above HEALTHY and
    /// below any active problem.
    pub fn severity(self) -> u8 {
        match self {
            Status::Healthy => 0,
            Status::Unknown => 1,
            Status::Warning => 2,
            Status::Critical => 3,
        }
    }

    pub fn worst(self, other: Status) -> Status {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Worst-status-wins reduction. `None` when there is nothing to reduce.
    pub fn aggregate<I>(statuses: I) -> Option<Status>
    where
        I: IntoIterator<Item = Status>,
    {
        statuses.into_iter().reduce(Status::worst)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Healthy => "HEALTHY",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_uppercase().as_str() {
            "HEALTHY" => Ok(Status::Healthy),
            "WARNING" => Ok(Status::Warning),
            "CRITICAL" => Ok(Status::Critical),
            "UNKNOWN" => Ok(Status::Unknown),
            _ => Err(format!("unknown status: {input}")),
        }
    }
}

/// Emitted whenever a node's derived status transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub node: NodeRef,
    pub old: Status,
    pub new: Status,
    pub at: DateTime<Utc>,
}
