//! Core types for validation and healing

use std::time::Duration;

use helix_core_types::{PerformanceTier, Strategy};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Healing controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Alternatives tried after the first failed validation.
    pub max_attempts: u32,
    /// Below this platform confidence the alternate platforms are tried.
    pub platform_uncertainty: f64,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            platform_uncertainty: 0.7,
        }
    }
}

/// States of the healing machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingState {
    Validating,
    Healing,
    Succeeded,
    Exhausted,
}

/// Where the strategy of one validation cycle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptSource {
    Cache,
    Resolution,
    Paraphrase,
    AlternatePlatform,
    VisualFallback,
}

impl AttemptSource {
    pub fn name(&self) -> &'static str {
        match self {
            AttemptSource::Cache => "cache",
            AttemptSource::Resolution => "resolution",
            AttemptSource::Paraphrase => "paraphrase",
            AttemptSource::AlternatePlatform => "alternate_platform",
            AttemptSource::VisualFallback => "visual_fallback",
        }
    }

    /// Which alternative source healing attempt `attempt` (1-based) uses.
    ///
    /// The last attempt is always the visual fallback; earlier ones alternate
    /// paraphrase and alternate platform, the latter only when the platform
    /// detection was uncertain.
    pub fn for_attempt(attempt: u32, max_attempts: u32, uncertain_platform: bool) -> Self {
        if attempt >= max_attempts {
            AttemptSource::VisualFallback
        } else if attempt % 2 == 0 && uncertain_platform {
            AttemptSource::AlternatePlatform
        } else {
            AttemptSource::Paraphrase
        }
    }
}

/// One validation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationAttempt {
    /// `None` when the cycle produced no candidate to validate.
    pub strategy: Option<Strategy>,
    pub success: bool,
    pub latency_ms: u64,
    pub source: AttemptSource,
}

impl ValidationAttempt {
    pub fn empty(source: AttemptSource, latency_ms: u64) -> Self {
        Self {
            strategy: None,
            success: false,
            latency_ms,
            source,
        }
    }
}

/// Why a resolution ended without a validated strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoStrategies,
    HealingExhausted,
    DeadlineExceeded,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NoStrategies => "no_strategies",
            FailureReason::HealingExhausted => "healing_exhausted",
            FailureReason::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

/// Per-call parameters of one healing run.
#[derive(Debug, Clone)]
pub struct HealingRequest {
    pub confidence_threshold: f64,
    pub max_attempts: u32,
    /// Hard ceiling of the whole run, validation included.
    pub deadline: Duration,
    /// Last known good strategy, validated before anything is resolved.
    pub cached: Option<Strategy>,
    pub cancel: Option<CancellationToken>,
}

impl HealingRequest {
    pub fn new(confidence_threshold: f64, max_attempts: u32, deadline: Duration) -> Self {
        Self {
            confidence_threshold,
            max_attempts,
            deadline,
            cached: None,
            cancel: None,
        }
    }

    pub fn with_cached(mut self, cached: Option<Strategy>) -> Self {
        self.cached = cached;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Final state of one healing run, with the full attempt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingReport {
    pub state: HealingState,
    /// Validated winner; on a deadline, the best candidate never validated.
    pub strategy: Option<Strategy>,
    pub attempts: Vec<ValidationAttempt>,
    pub reason: Option<FailureReason>,
    /// The winner came from a ranking that never reached the threshold.
    pub below_threshold: bool,
    /// Validation cycles spent in the healing state.
    pub healing_attempts: u32,
    pub elapsed_ms: u64,
    /// States visited, in order, ending with `state`.
    #[serde(default)]
    pub path: Vec<HealingState>,
}

impl HealingReport {
    pub fn found(&self) -> bool {
        self.state == HealingState::Succeeded
    }

    pub fn cache_hit(&self) -> bool {
        self.found()
            && self
                .attempts
                .last()
                .is_some_and(|attempt| attempt.source == AttemptSource::Cache)
    }

    /// Strategy of the cached entry when it failed validation.
    pub fn stale_cached(&self) -> Option<&Strategy> {
        self.attempts
            .iter()
            .find(|attempt| attempt.source == AttemptSource::Cache && !attempt.success)
            .and_then(|attempt| attempt.strategy.as_ref())
    }

    /// Strategies that were validated and missed, cached one excluded.
    pub fn failed_strategies(&self) -> impl Iterator<Item = &Strategy> {
        self.attempts
            .iter()
            .filter(|attempt| !attempt.success && attempt.source != AttemptSource::Cache)
            .filter_map(|attempt| attempt.strategy.as_ref())
    }

    pub fn tier(&self) -> Option<PerformanceTier> {
        self.strategy.as_ref().map(|strategy| strategy.tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healing_schedule_ends_with_visual_fallback() {
        let schedule: Vec<AttemptSource> = (1..=3)
            .map(|attempt| AttemptSource::for_attempt(attempt, 3, true))
            .collect();
        assert_eq!(
            schedule,
            vec![
                AttemptSource::Paraphrase,
                AttemptSource::AlternatePlatform,
                AttemptSource::VisualFallback
            ]
        );
        assert_eq!(
            AttemptSource::for_attempt(2, 3, false),
            AttemptSource::Paraphrase
        );
        assert_eq!(
            AttemptSource::for_attempt(1, 1, true),
            AttemptSource::VisualFallback
        );
    }

    #[test]
    fn reasons_render_as_snake_case() {
        assert_eq!(FailureReason::NoStrategies.as_str(), "no_strategies");
        assert_eq!(
            serde_json::to_string(&FailureReason::HealingExhausted).unwrap(),
            "\"healing_exhausted\""
        );
    }
}
