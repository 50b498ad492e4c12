use std::collections::HashSet;
use std::time::Duration;

use helix_core_types::{GeneratorType, PerformanceTier, Strategy};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::SchedulerError;

/// Wall-clock budget of each tier, in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierBudgets {
    pub instant_ms: u64,
    pub fast_ms: u64,
    pub medium_ms: u64,
    pub expensive_ms: u64,
}

impl Default for TierBudgets {
    fn default() -> Self {
        Self {
            instant_ms: 10,
            fast_ms: 50,
            medium_ms: 200,
            expensive_ms: 500,
        }
    }
}

impl TierBudgets {
    pub fn for_tier(&self, tier: PerformanceTier) -> Duration {
        let ms = match tier {
            PerformanceTier::Instant => self.instant_ms,
            PerformanceTier::Fast => self.fast_ms,
            PerformanceTier::Medium => self.medium_ms,
            PerformanceTier::Expensive => self.expensive_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Generator tasks allowed in flight per tier, across all requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConcurrency {
    pub fast: usize,
    pub medium: usize,
    pub expensive: usize,
}

impl Default for TierConcurrency {
    fn default() -> Self {
        Self {
            fast: 64,
            medium: 64,
            expensive: 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub confidence_threshold: f64,
    /// Candidates fused below this are discarded.
    pub min_confidence: f64,
    pub tier_budgets: TierBudgets,
    pub generator_timeout_ms: u64,
    pub request_deadline_ms: u64,
    pub tier_concurrency: TierConcurrency,
    /// Cancel the rest of a tier as soon as one completed generator lifts the
    /// ranking over the threshold. Off by default: the whole tier is awaited
    /// so the ranking never depends on completion order.
    pub eager_sibling_cancel: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            min_confidence: 0.2,
            tier_budgets: TierBudgets::default(),
            generator_timeout_ms: 500,
            request_deadline_ms: 2_000,
            tier_concurrency: TierConcurrency::default(),
            eager_sibling_cancel: false,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(SchedulerError::InvalidConfig(
                "confidence_threshold must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(SchedulerError::InvalidConfig(
                "min_confidence must be within [0, 1]".into(),
            ));
        }
        let concurrency = &self.tier_concurrency;
        if concurrency.fast == 0 || concurrency.medium == 0 || concurrency.expensive == 0 {
            return Err(SchedulerError::InvalidConfig(
                "tier concurrency must be positive".into(),
            ));
        }
        if self.request_deadline_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "request_deadline_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_millis(self.generator_timeout_ms)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }
}

/// Per-call adjustments of a resolution.
#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
    pub confidence_threshold: Option<f64>,
    pub time_budget: Option<Duration>,
    /// Only these generator types run; `None` runs all of them.
    pub generators: Option<Vec<GeneratorType>>,
    /// Consult the instant pattern table. Defaults to true.
    pub skip_patterns: bool,
    /// Candidates carried over from an earlier ranking.
    pub seed: Vec<Strategy>,
    /// Locators that must not be ranked again.
    pub exclude: HashSet<String>,
    /// Caller-side cancellation.
    pub cancel: Option<CancellationToken>,
}

impl ResolveOptions {
    pub fn only(generators: Vec<GeneratorType>) -> Self {
        Self {
            generators: Some(generators),
            skip_patterns: true,
            ..Self::default()
        }
    }

    pub fn allows(&self, generator: GeneratorType) -> bool {
        self.generators
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&generator))
    }
}

/// What happened inside one executed tier.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TierReport {
    pub tier: PerformanceTier,
    pub invoked: Vec<GeneratorType>,
    pub failed: Vec<GeneratorType>,
    pub timed_out: Vec<GeneratorType>,
    pub cancelled: Vec<GeneratorType>,
    pub strategies: usize,
    pub elapsed_ms: u64,
    pub budget_exhausted: bool,
}

impl TierReport {
    pub(crate) fn new(tier: PerformanceTier) -> Self {
        Self {
            tier,
            invoked: Vec::new(),
            failed: Vec::new(),
            timed_out: Vec::new(),
            cancelled: Vec::new(),
            strategies: 0,
            elapsed_ms: 0,
            budget_exhausted: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TierResolution {
    /// Fused candidates, best first, all above the confidence floor.
    pub ranked: Vec<Strategy>,
    /// Last tier that contributed to the ranking.
    pub reached_tier: Option<PerformanceTier>,
    pub below_threshold: bool,
    pub timed_out: bool,
    pub tiers: Vec<TierReport>,
    pub elapsed_ms: u64,
}

impl TierResolution {
    pub fn best(&self) -> Option<&Strategy> {
        self.ranked.first()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Generators invoked across every executed tier.
    pub fn invoked(&self) -> Vec<GeneratorType> {
        self.tiers
            .iter()
            .flat_map(|report| report.invoked.iter().copied())
            .collect()
    }
}
