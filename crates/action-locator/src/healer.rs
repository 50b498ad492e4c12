//! Bounded self-healing state machine.
//!
//! A run starts in `Validating` with the cached strategy (when there is one)
//! and then the top candidate of a fresh tier resolution. Every failed
//! validation moves the machine to `Healing`, which asks for at most
//! `max_attempts` alternatives, each from a single source, before giving up
//! in `Exhausted`. A locator is validated at most once per run.

use std::collections::HashSet;
use std::sync::Arc;

use helix_core_types::{GeneratorType, Intent, PlatformContext, PlatformId, Strategy};
use helix_scheduler::{ResolveOptions, TierResolution, TierScheduler};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::LocatorError;
use crate::types::{
    AttemptSource, FailureReason, HealingConfig, HealingReport, HealingRequest, HealingState,
    ValidationAttempt,
};
use crate::validator::Validator;

pub struct HealingController {
    scheduler: Arc<TierScheduler>,
    validator: Validator,
    config: HealingConfig,
}

/// Mutable bookkeeping of one run.
struct Run {
    started: Instant,
    deadline: Instant,
    threshold: f64,
    cancel: CancellationToken,
    attempts: Vec<ValidationAttempt>,
    tried: HashSet<String>,
    remainder: Vec<Strategy>,
    saw_candidate: bool,
    unvalidated: Option<Strategy>,
    healing_attempts: u32,
    path: Vec<HealingState>,
}

impl Run {
    fn state(&self) -> HealingState {
        self.path.last().copied().unwrap_or(HealingState::Validating)
    }

    fn enter(&mut self, next: HealingState) {
        let current = self.state();
        if current != next {
            debug!(from = ?current, to = ?next, "healing state");
            self.path.push(next);
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn exclusions(&self) -> HashSet<String> {
        self.tried.clone()
    }

    fn untried_remainder(&self) -> Vec<Strategy> {
        self.remainder
            .iter()
            .filter(|strategy| !self.tried.contains(&strategy.locator))
            .cloned()
            .collect()
    }

    fn report(
        mut self,
        state: HealingState,
        strategy: Option<Strategy>,
        reason: Option<FailureReason>,
    ) -> HealingReport {
        self.enter(state);
        let below_threshold = strategy
            .as_ref()
            .is_some_and(|strategy| strategy.fused_confidence < self.threshold)
            && !matches!(self.attempts.last(), Some(last) if last.source == AttemptSource::Cache);
        HealingReport {
            state,
            strategy,
            attempts: self.attempts,
            reason,
            below_threshold,
            healing_attempts: self.healing_attempts,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            path: self.path,
        }
    }

    fn deadline_report(mut self) -> HealingReport {
        let best = self
            .unvalidated
            .take()
            .or_else(|| self.untried_remainder().into_iter().next());
        self.report(
            HealingState::Exhausted,
            best,
            Some(FailureReason::DeadlineExceeded),
        )
    }
}

enum Cycle {
    Hit(Strategy),
    Miss,
    Deadline,
}

impl HealingController {
    pub fn new(scheduler: Arc<TierScheduler>, config: HealingConfig) -> Self {
        Self {
            scheduler,
            validator: Validator,
            config,
        }
    }

    pub fn config(&self) -> &HealingConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<TierScheduler> {
        &self.scheduler
    }

    pub async fn run(
        &self,
        intent: &Intent,
        context: &PlatformContext,
        request: HealingRequest,
    ) -> Result<HealingReport, LocatorError> {
        let started = Instant::now();
        let mut run = Run {
            started,
            deadline: started + request.deadline,
            threshold: request.confidence_threshold,
            cancel: request.cancel.clone().unwrap_or_default(),
            attempts: Vec::new(),
            tried: HashSet::new(),
            remainder: Vec::new(),
            saw_candidate: false,
            unvalidated: None,
            healing_attempts: 0,
            path: vec![HealingState::Validating],
        };

        // Validating: the cached strategy first, then a fresh ranking.
        if let Some(cached) = request.cached.clone() {
            match self
                .validate(&mut run, context, Some(cached), AttemptSource::Cache)
                .await?
            {
                Cycle::Hit(strategy) => {
                    info!(locator = %strategy.locator, "cached strategy still valid");
                    return Ok(run.report(HealingState::Succeeded, Some(strategy), None));
                }
                Cycle::Deadline => return Ok(run.deadline_report()),
                Cycle::Miss => {
                    warn!("cached strategy failed validation, resolving fresh");
                }
            }
        }

        let options = self.options(&run, Vec::new());
        let Some(resolution) = self.resolve(&run, intent, context, options).await? else {
            return Ok(run.deadline_report());
        };
        match self
            .take_top(&mut run, context, resolution, AttemptSource::Resolution)
            .await?
        {
            Cycle::Hit(strategy) => {
                return Ok(run.report(HealingState::Succeeded, Some(strategy), None))
            }
            Cycle::Deadline => return Ok(run.deadline_report()),
            Cycle::Miss => {}
        }

        // Healing: one alternative source per attempt.
        let mut paraphrases = 0usize;
        let mut alternates = context
            .alternate_platforms
            .iter()
            .filter(|platform| **platform != context.platform_id)
            .cloned()
            .collect::<Vec<PlatformId>>()
            .into_iter();
        let uncertain = context.platform_confidence < self.config.platform_uncertainty;
        let mut next_alternate = alternates.next();

        for attempt in 1..=request.max_attempts {
            if run.expired() {
                return Ok(run.deadline_report());
            }
            let source = AttemptSource::for_attempt(
                attempt,
                request.max_attempts,
                uncertain && next_alternate.is_some(),
            );
            run.enter(HealingState::Healing);
            run.healing_attempts = attempt;
            debug!(attempt, source = source.name(), "healing attempt");

            let resolution = match source {
                AttemptSource::AlternatePlatform => {
                    let Some(platform) = next_alternate.take() else {
                        continue;
                    };
                    next_alternate = alternates.next();
                    info!(platform = %platform, "re-resolving against alternate platform");
                    let alternate = context.for_platform(platform);
                    let options = self.options(&run, run.untried_remainder());
                    self.resolve(&run, intent, &alternate, options).await?
                }
                AttemptSource::VisualFallback => {
                    let options = ResolveOptions {
                        exclude: run.exclusions(),
                        ..ResolveOptions::only(vec![GeneratorType::Visual])
                    };
                    self.resolve(&run, intent, context, options).await?
                }
                _ => {
                    let rewritten = intent.paraphrase(paraphrases);
                    paraphrases += 1;
                    let query = rewritten.as_ref().unwrap_or(intent);
                    debug!(paraphrase = %query.normalized(), "re-querying with paraphrase");
                    let options = self.options(&run, run.untried_remainder());
                    self.resolve(&run, query, context, options).await?
                }
            };
            let Some(resolution) = resolution else {
                return Ok(run.deadline_report());
            };

            match self.take_top(&mut run, context, resolution, source).await? {
                Cycle::Hit(strategy) => {
                    info!(attempt, source = source.name(), locator = %strategy.locator, "healed");
                    return Ok(run.report(HealingState::Succeeded, Some(strategy), None));
                }
                Cycle::Deadline => return Ok(run.deadline_report()),
                Cycle::Miss => {}
            }
        }

        let reason = if run.saw_candidate {
            FailureReason::HealingExhausted
        } else {
            FailureReason::NoStrategies
        };
        info!(
            attempts = run.attempts.len(),
            reason = reason.as_str(),
            "healing exhausted"
        );
        Ok(run.report(HealingState::Exhausted, None, Some(reason)))
    }

    fn options(&self, run: &Run, seed: Vec<Strategy>) -> ResolveOptions {
        ResolveOptions {
            confidence_threshold: Some(run.threshold),
            seed,
            exclude: run.exclusions(),
            ..ResolveOptions::default()
        }
    }

    /// Tier resolution bounded by what is left of the run; `None` once the
    /// deadline has passed.
    async fn resolve(
        &self,
        run: &Run,
        intent: &Intent,
        context: &PlatformContext,
        mut options: ResolveOptions,
    ) -> Result<Option<TierResolution>, LocatorError> {
        let remaining = run.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        options.confidence_threshold = Some(run.threshold);
        options.time_budget = Some(remaining);
        options.cancel = Some(run.cancel.clone());
        let resolution = self.scheduler.resolve(intent, context, options).await?;
        Ok(Some(resolution))
    }

    async fn take_top(
        &self,
        run: &mut Run,
        context: &PlatformContext,
        resolution: TierResolution,
        source: AttemptSource,
    ) -> Result<Cycle, LocatorError> {
        let mut ranked = resolution
            .ranked
            .into_iter()
            .filter(|strategy| !run.tried.contains(&strategy.locator));
        let top = ranked.next();
        run.remainder = ranked.collect();
        self.validate(run, context, top, source).await
    }

    async fn validate(
        &self,
        run: &mut Run,
        context: &PlatformContext,
        candidate: Option<Strategy>,
        source: AttemptSource,
    ) -> Result<Cycle, LocatorError> {
        let cycle_started = Instant::now();
        let Some(strategy) = candidate else {
            debug!(source = source.name(), "no candidate to validate");
            run.attempts.push(ValidationAttempt::empty(
                source,
                cycle_started.elapsed().as_millis() as u64,
            ));
            return Ok(Cycle::Miss);
        };
        if source != AttemptSource::Cache {
            run.saw_candidate = true;
        }

        let remaining = run.deadline.saturating_duration_since(cycle_started);
        if remaining.is_zero() {
            run.unvalidated = Some(strategy);
            return Ok(Cycle::Deadline);
        }
        let verdict = self
            .validator
            .validate(context.page.as_ref(), &strategy, remaining)
            .await?;
        if verdict.timed_out {
            run.unvalidated = Some(strategy);
            return Ok(Cycle::Deadline);
        }

        run.tried.insert(strategy.locator.clone());
        run.attempts.push(ValidationAttempt {
            strategy: Some(strategy.clone()),
            success: verdict.hit,
            latency_ms: verdict.latency_ms,
            source,
        });
        if verdict.hit {
            Ok(Cycle::Hit(strategy))
        } else {
            Ok(Cycle::Miss)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use helix_core_types::{
        BoundingBox, CollaboratorError, DocumentSnapshot, PerformanceTier, Provenance,
        RenderingContext, ValidationReport, VisionService,
    };
    use helix_fusion::{ConfidenceFusion, FusionConfig, WeightConfig, WeightTable};
    use helix_generators::{Collaborators, GeneratorRegistry, StaticPage, UNIVERSAL_PATTERNS};
    use helix_scheduler::SchedulerConfig;

    struct FixedVision {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VisionService for FixedVision {
        async fn locate(
            &self,
            _screenshot: &[u8],
            _intent_text: &str,
        ) -> Result<Vec<(BoundingBox, f64)>, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![(
                BoundingBox {
                    x: 100.0,
                    y: 40.0,
                    width: 20.0,
                    height: 10.0,
                },
                0.8,
            )])
        }
    }

    fn controller(vision: Option<Arc<FixedVision>>) -> HealingController {
        let mut collaborators = Collaborators::default();
        if let Some(vision) = vision {
            collaborators = collaborators.with_vision(vision);
        }
        let fusion = ConfidenceFusion::new(
            FusionConfig::default(),
            Arc::new(WeightTable::new(WeightConfig::default())),
        );
        let scheduler = TierScheduler::new(
            GeneratorRegistry::standard(&collaborators),
            fusion,
            &UNIVERSAL_PATTERNS,
            SchedulerConfig {
                tier_budgets: helix_scheduler::TierBudgets {
                    instant_ms: 1_000,
                    fast_ms: 1_000,
                    medium_ms: 1_000,
                    expensive_ms: 1_000,
                },
                ..SchedulerConfig::default()
            },
        )
        .unwrap();
        HealingController::new(Arc::new(scheduler), HealingConfig::default())
    }

    fn context(page: Arc<StaticPage>) -> PlatformContext {
        PlatformContext::new(PlatformId::generic(), "form", page.snapshot(), page)
    }

    fn request() -> HealingRequest {
        HealingRequest::new(0.85, 3, Duration::from_secs(10))
    }

    fn cached(locator: &str) -> Strategy {
        Strategy::new(
            locator,
            GeneratorType::Structural,
            0.9,
            PerformanceTier::Instant,
            Provenance::new("cache"),
        )
    }

    #[tokio::test]
    async fn valid_cache_entry_short_circuits_resolution() {
        let page = Arc::new(StaticPage::from_html("s", r#"<button id="save">Save</button>"#));
        let controller = controller(None);
        let report = controller
            .run(
                &Intent::new("save button", "form", None),
                &context(page),
                request().with_cached(Some(cached("#save"))),
            )
            .await
            .unwrap();

        assert!(report.found());
        assert!(report.cache_hit());
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(
            report.path,
            vec![HealingState::Validating, HealingState::Succeeded]
        );
        assert_eq!(controller.scheduler().metrics().total_invocations(), 0);
    }

    #[tokio::test]
    async fn stale_cache_entry_falls_through_to_fresh_resolution() {
        let page = Arc::new(StaticPage::from_html(
            "s",
            r#"<form><button type="submit" id="store">Save</button></form>"#,
        ));
        let report = controller(None)
            .run(
                &Intent::new("save button", "form", None),
                &context(page),
                request().with_cached(Some(cached("#gone"))),
            )
            .await
            .unwrap();

        assert!(report.found());
        assert!(!report.cache_hit());
        assert_eq!(report.stale_cached().unwrap().locator, "#gone");
        assert_eq!(report.attempts[0].source, AttemptSource::Cache);
        assert_eq!(report.attempts[1].source, AttemptSource::Resolution);
        assert_eq!(report.healing_attempts, 0);
    }

    #[tokio::test]
    async fn nothing_to_find_exhausts_with_empty_cycles() {
        let page = Arc::new(StaticPage::from_html("s", "<p>Welcome back</p>"));
        let report = controller(None)
            .run(
                &Intent::new("save button", "form", None),
                &context(page),
                request(),
            )
            .await
            .unwrap();

        assert_eq!(report.state, HealingState::Exhausted);
        assert_eq!(report.reason, Some(FailureReason::NoStrategies));
        assert_eq!(report.attempts.len(), 4);
        assert!(report.attempts.iter().all(|a| a.strategy.is_none()));
        assert_eq!(report.healing_attempts, 3);
        assert_eq!(report.attempts[3].source, AttemptSource::VisualFallback);
        assert_eq!(
            report.path,
            vec![
                HealingState::Validating,
                HealingState::Healing,
                HealingState::Exhausted
            ]
        );
    }

    /// Page whose first validation fails regardless of the locator.
    struct FlakyPage {
        inner: Arc<StaticPage>,
        validations: AtomicUsize,
    }

    #[async_trait]
    impl RenderingContext for FlakyPage {
        async fn capture(&self) -> Result<DocumentSnapshot, CollaboratorError> {
            self.inner.capture().await
        }

        async fn validate(&self, locator: &str) -> Result<ValidationReport, CollaboratorError> {
            if self.validations.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(ValidationReport { present: true, interactable: false });
            }
            self.inner.validate(locator).await
        }
    }

    #[tokio::test]
    async fn healed_runs_pass_through_the_healing_state() {
        let inner = Arc::new(StaticPage::from_html(
            "s",
            r#"<form><button type="submit" id="store">Save</button></form>"#,
        ));
        let page = Arc::new(FlakyPage {
            inner: inner.clone(),
            validations: AtomicUsize::new(0),
        });
        let ctx = PlatformContext::new(PlatformId::generic(), "form", inner.snapshot(), page);
        let report = controller(None)
            .run(&Intent::new("save button", "form", None), &ctx, request())
            .await
            .unwrap();

        assert!(report.found());
        assert_eq!(report.attempts[0].source, AttemptSource::Resolution);
        assert!(!report.attempts[0].success);
        assert!(report.healing_attempts >= 1);
        assert_eq!(
            report.path,
            vec![
                HealingState::Validating,
                HealingState::Healing,
                HealingState::Succeeded
            ]
        );
    }

    #[tokio::test]
    async fn failed_candidates_are_never_revalidated() {
        let page = Arc::new(StaticPage::from_html(
            "s",
            r#"<button id="save">Save</button><button id="save-draft">Save draft</button>"#,
        ));
        page.force("#save", ValidationReport { present: true, interactable: false });
        let report = controller(None)
            .run(
                &Intent::new("save button", "form", None),
                &context(page.clone()),
                request(),
            )
            .await
            .unwrap();

        let validated: Vec<&str> = report
            .attempts
            .iter()
            .filter_map(|a| a.strategy.as_ref().map(|s| s.locator.as_str()))
            .collect();
        let unique: HashSet<&str> = validated.iter().copied().collect();
        assert_eq!(unique.len(), validated.len());
        assert!(report.attempts.len() <= 4);
    }

    #[tokio::test]
    async fn vision_candidates_validate_like_any_other() {
        let page = Arc::new(StaticPage::from_html("s", "<canvas></canvas>"));
        page.set_screenshot(Some(vec![1, 2, 3]));
        page.force(
            "visual:click(110,45)",
            ValidationReport { present: true, interactable: true },
        );
        let vision = Arc::new(FixedVision { calls: AtomicUsize::new(0) });
        let report = controller(Some(vision.clone()))
            .run(
                &Intent::new("save button", "form", None),
                &context(page),
                HealingRequest::new(0.99, 3, Duration::from_secs(10)),
            )
            .await
            .unwrap();

        assert!(report.found());
        assert!(report.strategy.as_ref().unwrap().locator.starts_with("visual:click"));
    }

    #[tokio::test]
    async fn uncertain_platform_is_retried_as_an_alternate() {
        let page = Arc::new(StaticPage::from_html("s", "<p>Nothing here</p>"));
        let ctx = context(page)
            .with_platform_candidates(0.4, vec![PlatformId::new("workday")]);
        let report = controller(None)
            .run(&Intent::new("save button", "form", None), &ctx, request())
            .await
            .unwrap();

        let sources: Vec<AttemptSource> = report.attempts.iter().map(|a| a.source).collect();
        assert_eq!(
            sources,
            vec![
                AttemptSource::Resolution,
                AttemptSource::Paraphrase,
                AttemptSource::AlternatePlatform,
                AttemptSource::VisualFallback,
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_page_aborts_without_healing() {
        let page = Arc::new(StaticPage::from_html("s", r#"<button id="save">Save</button>"#));
        let ctx = context(page.clone());
        page.fail_with(CollaboratorError::Unreachable("tab closed".into()));
        let err = controller(None)
            .run(
                &Intent::new("save button", "form", None),
                &ctx,
                request().with_cached(Some(cached("#save"))),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::Infrastructure(_)));
    }
}
