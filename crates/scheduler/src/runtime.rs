use std::sync::Arc;

use helix_core_types::PerformanceTier;
use tokio::sync::Semaphore;

use crate::model::TierConcurrency;

/// Tier-scoped worker permits shared by every request of one scheduler.
#[derive(Debug, Clone)]
pub struct TierPools {
    fast: Arc<Semaphore>,
    medium: Arc<Semaphore>,
    expensive: Arc<Semaphore>,
}

impl TierPools {
    pub fn new(concurrency: &TierConcurrency) -> Self {
        Self {
            fast: Arc::new(Semaphore::new(concurrency.fast)),
            medium: Arc::new(Semaphore::new(concurrency.medium)),
            expensive: Arc::new(Semaphore::new(concurrency.expensive)),
        }
    }

    /// `None` for the instant tier, which never runs generator tasks.
    pub fn for_tier(&self, tier: PerformanceTier) -> Option<Arc<Semaphore>> {
        match tier {
            PerformanceTier::Instant => None,
            PerformanceTier::Fast => Some(self.fast.clone()),
            PerformanceTier::Medium => Some(self.medium.clone()),
            PerformanceTier::Expensive => Some(self.expensive.clone()),
        }
    }

    pub fn available(&self, tier: PerformanceTier) -> usize {
        self.for_tier(tier)
            .map(|semaphore| semaphore.available_permits())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pools_follow_configuration() {
        let pools = TierPools::new(&TierConcurrency {
            fast: 3,
            medium: 2,
            expensive: 1,
        });
        assert_eq!(pools.available(PerformanceTier::Fast), 3);
        assert_eq!(pools.available(PerformanceTier::Expensive), 1);
        assert!(pools.for_tier(PerformanceTier::Instant).is_none());
    }
}
