//! Process-wide learning state and its periodic flush.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use helix_fusion::WeightTable;
use helix_strategy_cache::StrategyCache;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HelixConfig;
use crate::errors::HelixError;

/// Weight table and strategy cache, loaded at startup and flushed by
/// [`LearningState::checkpoint`]. Without a state directory both live only
/// in memory and checkpoints just purge expired cache entries.
pub struct LearningState {
    weights: Arc<WeightTable>,
    cache: Arc<StrategyCache>,
    persistent: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CheckpointStats {
    pub purged: usize,
    pub cache_entries: usize,
    pub weights: usize,
    pub persisted: bool,
}

impl LearningState {
    pub fn in_memory(config: &HelixConfig) -> Self {
        Self {
            weights: Arc::new(WeightTable::new(config.fusion.weights.clone())),
            cache: Arc::new(StrategyCache::new(config.cache.clone())),
            persistent: false,
        }
    }

    /// Load from the configured state directory, or start empty in memory.
    pub fn load(config: &HelixConfig) -> Result<Self, HelixError> {
        let (Some(cache_path), Some(weights_path)) =
            (config.storage.cache_path(), config.storage.weights_path())
        else {
            return Ok(Self::in_memory(config));
        };
        let cache = StrategyCache::with_persistence(config.cache.clone(), cache_path)?;
        let weights = WeightTable::with_persistence(config.fusion.weights.clone(), weights_path)?;
        info!(
            cache_entries = cache.len(),
            weights = weights.records().len(),
            "learning state loaded"
        );
        Ok(Self {
            weights: Arc::new(weights),
            cache: Arc::new(cache),
            persistent: true,
        })
    }

    pub fn weights(&self) -> &Arc<WeightTable> {
        &self.weights
    }

    pub fn cache(&self) -> &Arc<StrategyCache> {
        &self.cache
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn checkpoint(&self) -> Result<CheckpointStats, HelixError> {
        let purged = self.cache.purge_expired(Utc::now());
        if self.persistent {
            self.cache.persist_now()?;
            self.weights.persist_now()?;
        }
        let stats = CheckpointStats {
            purged,
            cache_entries: self.cache.len(),
            weights: self.weights.records().len(),
            persisted: self.persistent,
        };
        debug!(
            purged,
            cache_entries = stats.cache_entries,
            weights = stats.weights,
            "learning state checkpoint"
        );
        Ok(stats)
    }
}

/// Handle of the background checkpoint task.
pub struct Checkpointer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Checkpointer {
    /// Flush `state` every `period` until stopped. Must be called inside a
    /// tokio runtime.
    pub fn spawn(state: Arc<LearningState>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = state.checkpoint() {
                            warn!(error = %err, "periodic checkpoint failed");
                        }
                    }
                }
            }
            debug!("checkpointer stopped");
        });
        info!(interval_secs = period.as_secs(), "checkpointer started");
        Self { cancel, handle }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.handle.await {
            warn!(error = %err, "checkpointer task ended abnormally");
        }
    }
}
