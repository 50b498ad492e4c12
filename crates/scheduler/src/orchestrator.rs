use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use helix_core_types::{GeneratorType, Intent, PerformanceTier, PlatformContext, Strategy};
use helix_fusion::ConfidenceFusion;
use helix_generators::{Generator, GeneratorError, GeneratorRegistry, PatternTable};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::metrics::SchedulerMetrics;
use crate::model::{ResolveOptions, SchedulerConfig, TierReport, TierResolution};
use crate::runtime::TierPools;

enum GeneratorOutcome {
    Produced(GeneratorType, Vec<Strategy>),
    Failed(GeneratorError),
    TimedOut(GeneratorType),
    Cancelled(GeneratorType),
}

/// Runs generators tier by tier, fusing after every tier and stopping as
/// soon as the best candidate reaches the confidence threshold.
pub struct TierScheduler {
    registry: GeneratorRegistry,
    fusion: ConfidenceFusion,
    patterns: &'static PatternTable,
    pools: TierPools,
    metrics: Arc<SchedulerMetrics>,
    config: SchedulerConfig,
}

impl TierScheduler {
    pub fn new(
        registry: GeneratorRegistry,
        fusion: ConfidenceFusion,
        patterns: &'static PatternTable,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        Ok(Self {
            registry,
            fusion,
            patterns,
            pools: TierPools::new(&config.tier_concurrency),
            metrics: Arc::new(SchedulerMetrics::default()),
            config,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.metrics
    }

    pub fn fusion(&self) -> &ConfidenceFusion {
        &self.fusion
    }

    pub async fn resolve(
        &self,
        intent: &Intent,
        context: &PlatformContext,
        options: ResolveOptions,
    ) -> Result<TierResolution, SchedulerError> {
        let started = Instant::now();
        let threshold = options
            .confidence_threshold
            .unwrap_or(self.config.confidence_threshold);
        let deadline = started
            + options
                .time_budget
                .unwrap_or_else(|| self.config.request_deadline());
        let parent = options.cancel.clone().unwrap_or_default();

        let mut pool: Vec<Strategy> = options.seed.clone();
        let mut ranked = self.rank(pool.clone(), context, &options);
        let mut reached_tier = None;
        let mut timed_out = false;
        let mut satisfied = meets(&ranked, threshold);
        let mut tiers = Vec::new();

        for tier in PerformanceTier::ALL {
            if satisfied {
                break;
            }
            if parent.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }

            let produced = match tier {
                PerformanceTier::Instant => {
                    if options.skip_patterns {
                        continue;
                    }
                    self.run_patterns(intent, context, &mut tiers)
                }
                _ => {
                    let generators: Vec<Arc<dyn Generator>> = self
                        .registry
                        .for_tier(tier)
                        .into_iter()
                        .filter(|generator| options.allows(generator.generator_type()))
                        .collect();
                    if generators.is_empty() {
                        continue;
                    }
                    let (produced, report, hit_deadline) = self
                        .run_tier(
                            tier, generators, intent, context, &pool, &options, threshold,
                            deadline, &parent,
                        )
                        .await;
                    tiers.push(report);
                    if parent.is_cancelled() {
                        return Err(SchedulerError::Cancelled);
                    }
                    timed_out |= hit_deadline;
                    produced
                }
            };

            pool.extend(produced);
            ranked = self.rank(pool.clone(), context, &options);
            reached_tier = Some(tier);
            satisfied = meets(&ranked, threshold);
            if satisfied {
                self.metrics.record_early_exit(tier);
                debug!(
                    tier = tier.name(),
                    confidence = ranked[0].fused_confidence,
                    "threshold reached, later tiers skipped"
                );
            }
            if timed_out {
                break;
            }
        }

        let below_threshold = !ranked.is_empty() && !satisfied;
        self.metrics.record_resolution(timed_out);
        let resolution = TierResolution {
            ranked,
            reached_tier,
            below_threshold,
            timed_out,
            tiers,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            intent = %intent.normalized(),
            platform = %context.platform_id,
            candidates = resolution.ranked.len(),
            reached_tier = resolution.reached_tier.map(|tier| tier.name()),
            below_threshold,
            timed_out,
            elapsed_ms = resolution.elapsed_ms,
            "tier resolution finished"
        );
        Ok(resolution)
    }

    fn run_patterns(
        &self,
        intent: &Intent,
        context: &PlatformContext,
        tiers: &mut Vec<TierReport>,
    ) -> Vec<Strategy> {
        let started = Instant::now();
        self.metrics.record_tier_run(PerformanceTier::Instant);
        let produced = self.patterns.evaluate(intent, &context.snapshot);
        let mut report = TierReport::new(PerformanceTier::Instant);
        report.strategies = produced.len();
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report.budget_exhausted =
            started.elapsed() > self.config.tier_budgets.for_tier(PerformanceTier::Instant);
        if report.budget_exhausted {
            self.metrics.record_budget_exhausted(PerformanceTier::Instant);
            debug!(elapsed_ms = report.elapsed_ms, "pattern table exceeded its budget");
        }
        tiers.push(report);
        produced
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_tier(
        &self,
        tier: PerformanceTier,
        generators: Vec<Arc<dyn Generator>>,
        intent: &Intent,
        context: &PlatformContext,
        pool: &[Strategy],
        options: &ResolveOptions,
        threshold: f64,
        deadline: Instant,
        parent: &CancellationToken,
    ) -> (Vec<Strategy>, TierReport, bool) {
        let started = Instant::now();
        self.metrics.record_tier_run(tier);
        let mut report = TierReport::new(tier);
        let tier_budget = self.config.tier_budgets.for_tier(tier);
        let remaining = deadline.saturating_duration_since(started);
        let budget = tier_budget.min(remaining);
        let hits_deadline = remaining <= tier_budget;

        let cancel = parent.child_token();
        let Some(semaphore) = self.pools.for_tier(tier) else {
            return (Vec::new(), report, false);
        };

        let launched: Vec<GeneratorType> = generators
            .iter()
            .map(|generator| generator.generator_type())
            .collect();
        let mut pending: FuturesUnordered<_> = generators
            .into_iter()
            .map(|generator| {
                self.invoke(generator, intent, context, cancel.clone(), semaphore.clone())
            })
            .collect();

        let mut produced: Vec<Strategy> = Vec::new();
        let mut deadline_hit = false;
        let timer = tokio::time::sleep(budget);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = pending.next() => {
                    let Some(outcome) = next else {
                        break;
                    };
                    self.record(outcome, &mut report, &mut produced);
                    if self.config.eager_sibling_cancel && !pending.is_empty() {
                        let mut preview = pool.to_vec();
                        preview.extend(produced.iter().cloned());
                        if meets(&self.rank(preview, context, options), threshold) {
                            debug!(tier = tier.name(), "threshold reached, cancelling siblings");
                            cancel.cancel();
                            break;
                        }
                    }
                }
                _ = &mut timer => {
                    report.budget_exhausted = true;
                    deadline_hit = hits_deadline;
                    self.metrics.record_budget_exhausted(tier);
                    warn!(tier = tier.name(), budget_ms = budget.as_millis() as u64, "tier budget exhausted");
                    cancel.cancel();
                    break;
                }
            }
        }

        // Dropping the set cancels whatever is still in flight; partial
        // results of those generators are discarded.
        drop(pending);
        for generator in launched {
            if !report.invoked.contains(&generator) && !report.cancelled.contains(&generator) {
                report.cancelled.push(generator);
                self.metrics.record_cancelled(generator);
            }
        }

        report.strategies = produced.len();
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        (produced, report, deadline_hit)
    }

    async fn invoke(
        &self,
        generator: Arc<dyn Generator>,
        intent: &Intent,
        context: &PlatformContext,
        cancel: CancellationToken,
        semaphore: Arc<Semaphore>,
    ) -> GeneratorOutcome {
        let generator_type = generator.generator_type();
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return GeneratorOutcome::Cancelled(generator_type),
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return GeneratorOutcome::Cancelled(generator_type),
            },
        };
        self.metrics.record_invoked(generator_type);
        let call = tokio::time::timeout(
            self.config.generator_timeout(),
            generator.generate(intent, context),
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => GeneratorOutcome::Cancelled(generator_type),
            result = call => match result {
                Ok(Ok(strategies)) => GeneratorOutcome::Produced(generator_type, strategies),
                Ok(Err(err)) => GeneratorOutcome::Failed(err),
                Err(_) => GeneratorOutcome::TimedOut(generator_type),
            },
        }
    }

    fn record(
        &self,
        outcome: GeneratorOutcome,
        report: &mut TierReport,
        produced: &mut Vec<Strategy>,
    ) {
        match outcome {
            GeneratorOutcome::Produced(generator, strategies) => {
                self.metrics.record_succeeded(generator);
                report.invoked.push(generator);
                debug!(generator = generator.name(), count = strategies.len(), "generator finished");
                produced.extend(strategies.into_iter().map(|mut strategy| {
                    strategy.generator = generator;
                    strategy
                }));
                report.strategies = produced.len();
            }
            GeneratorOutcome::Failed(err) => {
                let generator = err.generator();
                self.metrics.record_failed(generator);
                report.invoked.push(generator);
                report.failed.push(generator);
                warn!(generator = generator.name(), error = %err, "generator failed, treated as empty");
            }
            GeneratorOutcome::TimedOut(generator) => {
                self.metrics.record_timed_out(generator);
                report.invoked.push(generator);
                report.timed_out.push(generator);
                warn!(generator = generator.name(), "generator exceeded its soft deadline");
            }
            GeneratorOutcome::Cancelled(generator) => {
                self.metrics.record_cancelled(generator);
                report.cancelled.push(generator);
            }
        }
    }

    /// Fuse, drop candidates under the floor or already excluded, rank.
    fn rank(
        &self,
        pool: Vec<Strategy>,
        context: &PlatformContext,
        options: &ResolveOptions,
    ) -> Vec<Strategy> {
        let floor = self.config.min_confidence;
        self.fusion
            .fuse(pool, &context.platform_id)
            .into_iter()
            .filter(|strategy| strategy.fused_confidence >= floor)
            .filter(|strategy| !options.exclude.contains(&strategy.locator))
            .collect()
    }
}

fn meets(ranked: &[Strategy], threshold: f64) -> bool {
    ranked
        .first()
        .map_or(false, |best| best.fused_confidence >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use helix_core_types::{PlatformId, Provenance};
    use helix_fusion::{FusionConfig, WeightConfig, WeightTable};
    use helix_generators::{Collaborators, StaticPage, UNIVERSAL_PATTERNS};

    const LOGIN_PAGE: &str = r#"
        <form id="login">
          <input name="username" type="text">
          <input name="password" type="password">
          <button type="submit">Sign in</button>
        </form>"#;

    struct Scripted {
        generator_type: GeneratorType,
        delay: Duration,
        output: Result<Vec<(&'static str, f64)>, &'static str>,
        calls: AtomicUsize,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Scripted {
        fn new(generator_type: GeneratorType, output: Vec<(&'static str, f64)>) -> Self {
            Self {
                generator_type,
                delay: Duration::ZERO,
                output: Ok(output),
                calls: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn failing(generator_type: GeneratorType) -> Self {
            Self {
                output: Err("boom"),
                ..Self::new(generator_type, Vec::new())
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn generate(
            &self,
            _intent: &Intent,
            _context: &PlatformContext,
        ) -> Result<Vec<Strategy>, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            match &self.output {
                Ok(output) => Ok(output
                    .iter()
                    .map(|(locator, raw)| {
                        Strategy::new(
                            *locator,
                            self.generator_type,
                            *raw,
                            self.generator_type.tier(),
                            Provenance::new("scripted"),
                        )
                    })
                    .collect()),
                Err(reason) => Err(GeneratorError::InvalidIntent {
                    generator: self.generator_type,
                    reason: reason.to_string(),
                }),
            }
        }

        fn generator_type(&self) -> GeneratorType {
            self.generator_type
        }
    }

    fn context(html: &str) -> PlatformContext {
        let page = Arc::new(StaticPage::from_html("s", html));
        PlatformContext::new(PlatformId::generic(), "form", page.snapshot(), page)
    }

    fn scheduler(config: SchedulerConfig, scripted: &[Arc<Scripted>]) -> TierScheduler {
        let mut registry = GeneratorRegistry::standard(&Collaborators::default());
        for generator in scripted {
            registry = registry.with_override(generator.clone());
        }
        let fusion = ConfidenceFusion::new(
            FusionConfig::default(),
            Arc::new(WeightTable::new(WeightConfig::default())),
        );
        TierScheduler::new(registry, fusion, &UNIVERSAL_PATTERNS, config).unwrap()
    }

    fn only(scripted: &[Arc<Scripted>]) -> ResolveOptions {
        ResolveOptions::only(scripted.iter().map(|g| g.generator_type).collect())
    }

    #[tokio::test]
    async fn pattern_hit_skips_every_generator() {
        let scheduler = scheduler(SchedulerConfig::default(), &[]);
        let resolution = scheduler
            .resolve(
                &Intent::new("click the login button", "login", None),
                &context(LOGIN_PAGE),
                ResolveOptions::default(),
            )
            .await
            .unwrap();

        let best = resolution.best().unwrap();
        assert!(best.fused_confidence >= 0.85);
        assert_eq!(best.tier, PerformanceTier::Instant);
        assert_eq!(resolution.reached_tier, Some(PerformanceTier::Instant));
        assert!(!resolution.below_threshold);
        assert_eq!(scheduler.metrics().total_invocations(), 0);
    }

    #[tokio::test]
    async fn confident_fast_tier_short_circuits_later_tiers() {
        let semantic = Arc::new(Scripted::new(GeneratorType::Semantic, vec![("#go", 0.92)]));
        let contextual = Arc::new(Scripted::new(GeneratorType::Contextual, vec![("#go", 0.9)]));
        let all = [semantic.clone(), contextual.clone()];
        let scheduler = scheduler(SchedulerConfig::default(), &all);

        let resolution = scheduler
            .resolve(&Intent::new("go", "form", None), &context("<p></p>"), only(&all))
            .await
            .unwrap();

        assert_eq!(resolution.best().unwrap().locator, "#go");
        assert_eq!(resolution.reached_tier, Some(PerformanceTier::Fast));
        assert_eq!(semantic.calls(), 1);
        assert_eq!(contextual.calls(), 0);
        assert_eq!(scheduler.metrics().invocations(GeneratorType::Contextual), 0);
        assert_eq!(scheduler.metrics().snapshot().tiers[1].early_exits, 1);
    }

    #[tokio::test]
    async fn failing_generator_does_not_affect_siblings() {
        let broken = Arc::new(Scripted::failing(GeneratorType::Semantic));
        let healthy = Arc::new(Scripted::new(GeneratorType::Accessibility, vec![("#a", 0.6)]));
        let all = [broken.clone(), healthy.clone()];
        let scheduler = scheduler(SchedulerConfig::default(), &all);

        let resolution = scheduler
            .resolve(&Intent::new("open a", "form", None), &context("<p></p>"), only(&all))
            .await
            .unwrap();

        assert_eq!(resolution.ranked.len(), 1);
        assert_eq!(resolution.ranked[0].generator, GeneratorType::Accessibility);
        assert_eq!(resolution.tiers[0].failed, vec![GeneratorType::Semantic]);
        assert!(resolution.below_threshold);
        let stats = scheduler.metrics().snapshot();
        assert_eq!(stats.generators[&GeneratorType::Semantic].failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generator_times_out_alone() {
        let slow = Arc::new(
            Scripted::new(GeneratorType::Structural, vec![("#late", 0.99)])
                .slow(Duration::from_secs(5)),
        );
        let quick = Arc::new(Scripted::new(GeneratorType::Semantic, vec![("#quick", 0.5)]));
        let all = [slow.clone(), quick.clone()];
        let config = SchedulerConfig {
            generator_timeout_ms: 20,
            tier_budgets: crate::model::TierBudgets {
                fast_ms: 1_000,
                ..Default::default()
            },
            ..SchedulerConfig::default()
        };
        let scheduler = scheduler(config, &all);

        let resolution = scheduler
            .resolve(&Intent::new("quick", "form", None), &context("<p></p>"), only(&all))
            .await
            .unwrap();

        let fast = &resolution.tiers[0];
        assert_eq!(fast.timed_out, vec![GeneratorType::Structural]);
        assert!(!fast.budget_exhausted);
        assert_eq!(resolution.ranked.len(), 1);
        assert_eq!(resolution.ranked[0].locator, "#quick");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_tier_budget_keeps_completed_results_only() {
        let slow = Arc::new(
            Scripted::new(GeneratorType::Timing, vec![("#slow", 0.99)]).slow(Duration::from_secs(1)),
        );
        let quick = Arc::new(Scripted::new(GeneratorType::State, vec![("#done", 0.4)]));
        let all = [slow.clone(), quick.clone()];
        let config = SchedulerConfig {
            generator_timeout_ms: 10_000,
            request_deadline_ms: 10_000,
            ..SchedulerConfig::default()
        };
        let scheduler = scheduler(config, &all);

        let resolution = scheduler
            .resolve(&Intent::new("done", "form", None), &context("<p></p>"), only(&all))
            .await
            .unwrap();

        let medium = &resolution.tiers[0];
        assert_eq!(medium.tier, PerformanceTier::Medium);
        assert!(medium.budget_exhausted);
        assert_eq!(medium.cancelled, vec![GeneratorType::Timing]);
        assert!(!resolution.timed_out);
        let locators: Vec<&str> = resolution.ranked.iter().map(|s| s.locator.as_str()).collect();
        assert_eq!(locators, vec!["#done"]);
    }

    #[tokio::test(start_paused = true)]
    async fn request_deadline_stops_the_cascade() {
        let slow = Arc::new(
            Scripted::new(GeneratorType::Semantic, vec![("#first", 0.5)])
                .slow(Duration::from_millis(40)),
        );
        let never = Arc::new(Scripted::new(GeneratorType::Visual, vec![("#last", 0.9)]));
        let all = [slow.clone(), never.clone()];
        let scheduler = scheduler(SchedulerConfig::default(), &all);
        let options = ResolveOptions {
            time_budget: Some(Duration::from_millis(30)),
            ..only(&all)
        };

        let resolution = scheduler
            .resolve(&Intent::new("first", "form", None), &context("<p></p>"), options)
            .await
            .unwrap();

        assert!(resolution.timed_out);
        assert_eq!(never.calls(), 0);
        assert_eq!(scheduler.metrics().snapshot().deadline_hits, 1);
    }

    #[tokio::test]
    async fn caller_cancellation_is_reported() {
        let scheduler = scheduler(SchedulerConfig::default(), &[]);
        let token = CancellationToken::new();
        token.cancel();
        let options = ResolveOptions {
            cancel: Some(token),
            ..ResolveOptions::default()
        };
        let err = scheduler
            .resolve(&Intent::new("save", "form", None), &context("<p></p>"), options)
            .await
            .unwrap_err();
        assert_eq!(err, SchedulerError::Cancelled);
    }

    #[tokio::test]
    async fn seeds_and_exclusions_shape_the_ranking() {
        let semantic = Arc::new(Scripted::new(
            GeneratorType::Semantic,
            vec![("#tried", 0.95), ("#fresh", 0.5)],
        ));
        let all = [semantic.clone()];
        let scheduler = scheduler(SchedulerConfig::default(), &all);
        let seed = Strategy::new(
            "#carried",
            GeneratorType::State,
            0.45,
            PerformanceTier::Medium,
            Provenance::new("earlier"),
        );
        let options = ResolveOptions {
            seed: vec![seed],
            exclude: ["#tried".to_string()].into_iter().collect(),
            ..only(&all)
        };

        let resolution = scheduler
            .resolve(&Intent::new("fresh", "form", None), &context("<p></p>"), options)
            .await
            .unwrap();

        let locators: Vec<&str> = resolution.ranked.iter().map(|s| s.locator.as_str()).collect();
        assert_eq!(locators, vec!["#fresh", "#carried"]);
    }

    #[tokio::test]
    async fn weak_candidates_fall_under_the_floor() {
        let semantic = Arc::new(Scripted::new(
            GeneratorType::Semantic,
            vec![("#weak", 0.1), ("#ok", 0.3)],
        ));
        let all = [semantic.clone()];
        let scheduler = scheduler(SchedulerConfig::default(), &all);

        let resolution = scheduler
            .resolve(&Intent::new("ok", "form", None), &context("<p></p>"), only(&all))
            .await
            .unwrap();

        assert_eq!(resolution.ranked.len(), 1);
        assert_eq!(resolution.ranked[0].locator, "#ok");
        assert!(resolution.below_threshold);
        assert_eq!(resolution.reached_tier, Some(PerformanceTier::Fast));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn tier_pool_bounds_concurrency_across_requests() {
        let semantic = Arc::new(
            Scripted::new(GeneratorType::Semantic, vec![("#x", 0.3)])
                .slow(Duration::from_millis(5)),
        );
        let all = [semantic.clone()];
        let config = SchedulerConfig {
            tier_concurrency: crate::model::TierConcurrency {
                fast: 1,
                ..Default::default()
            },
            ..SchedulerConfig::default()
        };
        let scheduler = Arc::new(scheduler(config, &all));
        let ctx = Arc::new(context("<p></p>"));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let scheduler = scheduler.clone();
            let ctx = ctx.clone();
            let options = only(&all);
            handles.push(tokio::spawn(async move {
                scheduler
                    .resolve(&Intent::new("x", "form", None), &ctx, options)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(semantic.calls(), 6);
        assert_eq!(semantic.peak.load(Ordering::SeqCst), 1);
    }
}
