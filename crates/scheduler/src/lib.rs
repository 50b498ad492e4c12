//! Progressive tier scheduler.
//!
//! Consults the pattern table, then runs generator tiers from cheapest to
//! most expensive, fusing after every tier and stopping once the best
//! candidate clears the confidence threshold.

pub mod error;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod runtime;

pub use error::SchedulerError;
pub use metrics::{GeneratorStats, SchedulerMetrics, SchedulerMetricsSnapshot, TierStats};
pub use model::{
    ResolveOptions, SchedulerConfig, TierBudgets, TierConcurrency, TierReport, TierResolution,
};
pub use orchestrator::TierScheduler;
pub use runtime::TierPools;
