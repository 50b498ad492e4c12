use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use helix_core_types::{GeneratorType, PerformanceTier};
use serde::Serialize;

#[derive(Default)]
struct GeneratorCounters {
    invoked: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
}

#[derive(Default)]
struct TierCounters {
    runs: AtomicU64,
    early_exits: AtomicU64,
    budget_exhausted: AtomicU64,
}

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Per-scheduler counters. Shared by every request the scheduler serves.
#[derive(Default)]
pub struct SchedulerMetrics {
    generators: DashMap<GeneratorType, GeneratorCounters>,
    tiers: [TierCounters; 4],
    resolutions: AtomicU64,
    deadline_hits: AtomicU64,
}

impl SchedulerMetrics {
    fn with_generator(&self, generator: GeneratorType, apply: impl FnOnce(&GeneratorCounters)) {
        let counters = self.generators.entry(generator).or_default().downgrade();
        apply(&counters);
    }

    pub fn record_invoked(&self, generator: GeneratorType) {
        self.with_generator(generator, |c| increment(&c.invoked));
    }

    pub fn record_succeeded(&self, generator: GeneratorType) {
        self.with_generator(generator, |c| increment(&c.succeeded));
    }

    pub fn record_failed(&self, generator: GeneratorType) {
        self.with_generator(generator, |c| increment(&c.failed));
    }

    pub fn record_timed_out(&self, generator: GeneratorType) {
        self.with_generator(generator, |c| increment(&c.timed_out));
    }

    pub fn record_cancelled(&self, generator: GeneratorType) {
        self.with_generator(generator, |c| increment(&c.cancelled));
    }

    pub fn record_tier_run(&self, tier: PerformanceTier) {
        increment(&self.tiers[tier.index()].runs);
    }

    pub fn record_early_exit(&self, tier: PerformanceTier) {
        increment(&self.tiers[tier.index()].early_exits);
    }

    pub fn record_budget_exhausted(&self, tier: PerformanceTier) {
        increment(&self.tiers[tier.index()].budget_exhausted);
    }

    pub fn record_resolution(&self, deadline_hit: bool) {
        increment(&self.resolutions);
        if deadline_hit {
            increment(&self.deadline_hits);
        }
    }

    /// Number of times the generator was started.
    pub fn invocations(&self, generator: GeneratorType) -> u64 {
        self.generators
            .get(&generator)
            .map(|c| c.invoked.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn total_invocations(&self) -> u64 {
        GeneratorType::ALL
            .into_iter()
            .map(|generator| self.invocations(generator))
            .sum()
    }

    pub fn snapshot(&self) -> SchedulerMetricsSnapshot {
        let generators = self
            .generators
            .iter()
            .map(|entry| {
                let c = entry.value();
                (
                    *entry.key(),
                    GeneratorStats {
                        invoked: c.invoked.load(Ordering::Relaxed),
                        succeeded: c.succeeded.load(Ordering::Relaxed),
                        failed: c.failed.load(Ordering::Relaxed),
                        timed_out: c.timed_out.load(Ordering::Relaxed),
                        cancelled: c.cancelled.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();
        let tiers = PerformanceTier::ALL
            .into_iter()
            .map(|tier| {
                let c = &self.tiers[tier.index()];
                TierStats {
                    tier,
                    runs: c.runs.load(Ordering::Relaxed),
                    early_exits: c.early_exits.load(Ordering::Relaxed),
                    budget_exhausted: c.budget_exhausted.load(Ordering::Relaxed),
                }
            })
            .collect();
        SchedulerMetricsSnapshot {
            resolutions: self.resolutions.load(Ordering::Relaxed),
            deadline_hits: self.deadline_hits.load(Ordering::Relaxed),
            generators,
            tiers,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GeneratorStats {
    pub invoked: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TierStats {
    pub tier: PerformanceTier,
    pub runs: u64,
    pub early_exits: u64,
    pub budget_exhausted: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SchedulerMetricsSnapshot {
    pub resolutions: u64,
    pub deadline_hits: u64,
    pub generators: BTreeMap<GeneratorType, GeneratorStats>,
    pub tiers: Vec<TierStats>,
}
