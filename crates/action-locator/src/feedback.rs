//! Learning-state updates from observed outcomes.

use std::sync::Arc;

use helix_core_types::{PlatformId, ResolutionOutcome, Strategy};
use helix_fusion::WeightTable;
use helix_strategy_cache::{CacheVerdict, StrategyCache};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::LocatorError;
use crate::idempotency::IdempotencyTracker;
use crate::outcome_log::OutcomeLog;

/// One observed outcome of a strategy.
#[derive(Debug, Clone)]
pub struct Feedback<'a> {
    /// Idempotency key; a replay with the same key is ignored.
    pub key: &'a str,
    pub strategy: &'a Strategy,
    pub platform: &'a PlatformId,
    /// Cache entry the outcome counts against, if any.
    pub cache_key: Option<&'a str>,
    pub success: bool,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackReceipt {
    pub accepted: bool,
    /// Weight of the strategy's generator after the update.
    pub weight: Option<f64>,
    /// The cache entry was evicted by this outcome.
    pub evicted: bool,
}

impl FeedbackReceipt {
    fn replay() -> Self {
        Self {
            accepted: false,
            weight: None,
            evicted: false,
        }
    }
}

pub struct FeedbackRecorder {
    weights: Arc<WeightTable>,
    cache: Arc<StrategyCache>,
    applied: IdempotencyTracker,
    log: Option<OutcomeLog>,
}

impl FeedbackRecorder {
    pub fn new(
        weights: Arc<WeightTable>,
        cache: Arc<StrategyCache>,
        applied: IdempotencyTracker,
    ) -> Self {
        Self {
            weights,
            cache,
            applied,
            log: None,
        }
    }

    pub fn with_outcome_log(mut self, log: OutcomeLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn weights(&self) -> &Arc<WeightTable> {
        &self.weights
    }

    pub fn cache(&self) -> &Arc<StrategyCache> {
        &self.cache
    }

    pub fn outcome_log(&self) -> Option<&OutcomeLog> {
        self.log.as_ref()
    }

    /// Apply one outcome: a bounded weight update for the generator and, when
    /// a cache key is given, the cache counters. A success promotes the
    /// strategy into the cache; a failure only counts against an entry that
    /// holds the same locator.
    pub fn record(&self, feedback: Feedback<'_>) -> FeedbackReceipt {
        if !self.applied.accept(feedback.key) {
            debug!(key = feedback.key, "feedback replay ignored");
            return FeedbackReceipt::replay();
        }
        let strategy = feedback.strategy;
        let weight = if feedback.success {
            self.weights.reward(feedback.platform, strategy.generator)
        } else {
            self.weights.penalize(feedback.platform, strategy.generator)
        };

        let mut evicted = false;
        if let Some(cache_key) = feedback.cache_key {
            if feedback.success {
                self.cache.promote(cache_key, strategy.clone());
            } else {
                match self
                    .cache
                    .record_outcome_for(cache_key, &strategy.locator, false)
                {
                    CacheVerdict::Evicted(entry) => {
                        evicted = true;
                        info!(
                            cache_key,
                            locator = %entry.strategy.locator,
                            successes = entry.success_count,
                            failures = entry.failure_count,
                            "cache entry evicted"
                        );
                    }
                    CacheVerdict::Superseded => {
                        debug!(cache_key, locator = %strategy.locator, "failure of a replaced strategy ignored");
                    }
                    CacheVerdict::Retained(_) | CacheVerdict::Missing => {}
                }
            }
        }

        debug!(
            key = feedback.key,
            generator = strategy.generator.name(),
            platform = %feedback.platform,
            success = feedback.success,
            latency_ms = feedback.latency_ms,
            weight,
            "feedback applied"
        );
        FeedbackReceipt {
            accepted: true,
            weight: Some(weight),
            evicted,
        }
    }

    /// Append an audit record. Failures are logged and returned; learning
    /// state is never rolled back for them.
    pub fn log_outcome(&self, outcome: &ResolutionOutcome) -> Result<(), LocatorError> {
        let Some(log) = self.log.as_ref() else {
            return Ok(());
        };
        log.append(outcome).map_err(|err| {
            warn!(request_id = %outcome.request_id, error = %err, "outcome log append failed");
            LocatorError::OutcomeLog(err.to_string())
        })
    }

    pub fn flush(&self) -> Result<(), LocatorError> {
        match self.log.as_ref() {
            Some(log) => log
                .flush()
                .map_err(|err| LocatorError::OutcomeLog(err.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core_types::{GeneratorType, PerformanceTier, Provenance};
    use helix_fusion::WeightConfig;
    use helix_strategy_cache::CacheConfig;

    fn recorder() -> FeedbackRecorder {
        FeedbackRecorder::new(
            Arc::new(WeightTable::new(WeightConfig::default())),
            Arc::new(StrategyCache::new(CacheConfig::default())),
            IdempotencyTracker::with_capacity(16),
        )
    }

    fn strategy(locator: &str) -> Strategy {
        Strategy::new(
            locator,
            GeneratorType::Accessibility,
            0.8,
            PerformanceTier::Fast,
            Provenance::new("test"),
        )
    }

    fn feedback<'a>(
        key: &'a str,
        strategy: &'a Strategy,
        platform: &'a PlatformId,
        success: bool,
    ) -> Feedback<'a> {
        Feedback {
            key,
            strategy,
            platform,
            cache_key: Some("k"),
            success,
            latency_ms: 5,
        }
    }

    #[test]
    fn replayed_keys_are_not_double_counted() {
        let recorder = recorder();
        let platform = PlatformId::new("workday");
        let save = strategy("#save");

        assert!(recorder.record(feedback("r1", &save, &platform, true)).accepted);
        assert!(!recorder.record(feedback("r1", &save, &platform, true)).accepted);

        let entry = recorder.cache().peek("k").unwrap();
        assert_eq!(entry.success_count, 1);
        let weight = recorder.weights().get(&platform, GeneratorType::Accessibility);
        assert!((weight - 1.05).abs() < 1e-12);
    }

    #[test]
    fn failures_of_other_locators_leave_the_entry_alone() {
        let recorder = recorder();
        let platform = PlatformId::generic();
        let save = strategy("#save");
        let other = strategy("#other");
        recorder.record(feedback("r1", &save, &platform, true));
        recorder.record(feedback("r2", &other, &platform, false));
        assert_eq!(recorder.cache().peek("k").unwrap().failure_count, 0);
    }

    #[test]
    fn repeated_failures_evict_the_entry() {
        let recorder = recorder();
        let platform = PlatformId::generic();
        let save = strategy("#save");
        recorder.record(feedback("ok", &save, &platform, true));
        let receipts: Vec<bool> = ["f1", "f2", "f3"]
            .into_iter()
            .map(|key| recorder.record(feedback(key, &save, &platform, false)).evicted)
            .collect();
        assert_eq!(receipts, vec![false, false, true]);
        assert!(recorder.cache().peek("k").is_none());
    }

    #[test]
    fn failure_reported_after_the_entry_was_replaced_is_dropped() {
        let recorder = recorder();
        let platform = PlatformId::generic();
        let save = strategy("#save");
        let submit = strategy("#submit");
        recorder.record(feedback("a:validated", &save, &platform, true));
        recorder.record(feedback("b:validated", &submit, &platform, true));

        let receipt = recorder.record(feedback("a:outcome", &save, &platform, false));
        assert!(receipt.accepted);
        assert!(!receipt.evicted);
        let entry = recorder.cache().peek("k").unwrap();
        assert_eq!(entry.strategy.locator, "#submit");
        assert_eq!((entry.success_count, entry.failure_count), (1, 0));
    }
}
