pub use vigil_core;

mod engine;
mod evaluator;
mod graph;
mod watchdog;

pub use engine::{EngineStats, PropagationEngine, PropagationReport, StatusStore};
pub use evaluator::{
    EvaluatorConfig, HeartbeatEvaluator, Observation, DEFAULT_MISSED_FACTOR,
    DEFAULT_SATURATION_CEILING,
};
pub use graph::DependencyGraph;
pub use watchdog::{Watchdog, WatchdogConfig};

// Re-export core types for convenience
pub use vigil_core::{
    DependencyEdge, HeartbeatSample, NodeKind, NodeRef, Result, Schedule, ScheduleThresholds,
    Status, StatusChange, StatusNode, VigilError,
};
