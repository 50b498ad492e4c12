//! Engine facade: cache fast path, tier resolution, healing and feedback.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use action_locator::{
    FailureReason, Feedback, FeedbackReceipt, FeedbackRecorder, HealingController, HealingRequest,
    IdempotencyTracker, LocatorError, OutcomeLog, ValidationAttempt,
};
use helix_core_types::{
    DocumentSnapshot, Intent, PerformanceTier, PlatformContext, PlatformId, RenderingContext,
    RequestId, ResolutionOutcome, Strategy,
};
use helix_fusion::ConfidenceFusion;
use helix_generators::{Collaborators, GeneratorRegistry, UNIVERSAL_PATTERNS};
use helix_scheduler::{SchedulerMetricsSnapshot, TierScheduler};
use helix_strategy_cache::{cache_key, CacheStatsSnapshot};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::checkpoint::{Checkpointer, LearningState};
use crate::config::HelixConfig;
use crate::errors::HelixError;

/// One resolution request.
#[derive(Clone)]
pub struct ResolveRequest {
    pub intent: String,
    pub platform_hint: Option<PlatformId>,
    pub page_type: String,
    pub page: Arc<dyn RenderingContext>,
    /// Snapshot to resolve against; captured from `page` when absent.
    pub snapshot: Option<Arc<DocumentSnapshot>>,
    pub confidence_threshold: f64,
    pub max_healing_attempts: u32,
    pub platform_confidence: f64,
    pub alternate_platforms: Vec<PlatformId>,
    /// Hard ceiling; the scheduler's request deadline when unset.
    pub deadline: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl ResolveRequest {
    pub fn new(
        intent: impl Into<String>,
        page_type: impl Into<String>,
        page: Arc<dyn RenderingContext>,
    ) -> Self {
        Self {
            intent: intent.into(),
            platform_hint: None,
            page_type: page_type.into(),
            page,
            snapshot: None,
            confidence_threshold: 0.85,
            max_healing_attempts: 3,
            platform_confidence: 1.0,
            alternate_platforms: Vec::new(),
            deadline: None,
            cancel: None,
        }
    }

    pub fn on_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform_hint = Some(PlatformId::new(platform));
        self
    }

    pub fn with_snapshot(mut self, snapshot: Arc<DocumentSnapshot>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_max_healing_attempts(mut self, attempts: u32) -> Self {
        self.max_healing_attempts = attempts;
        self
    }

    pub fn with_platform_candidates(mut self, confidence: f64, alternates: Vec<PlatformId>) -> Self {
        self.platform_confidence = confidence;
        self.alternate_platforms = alternates;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolveResponse {
    pub request_id: RequestId,
    pub found: bool,
    pub strategy: Option<Strategy>,
    pub attempts: Vec<ValidationAttempt>,
    pub total_latency_ms: u64,
    /// `no_strategies`, `healing_exhausted` or `deadline_exceeded`.
    pub reason: Option<String>,
    pub below_threshold: bool,
    pub healing_attempts: u32,
    pub cache_hit: bool,
}

impl ResolveResponse {
    pub fn tier(&self) -> Option<PerformanceTier> {
        self.strategy.as_ref().map(|strategy| strategy.tier)
    }
}

/// What the engine remembers about a served request, for later feedback.
#[derive(Clone, Debug)]
struct Ticket {
    cache_key: String,
    platform: PlatformId,
    healing_attempts: u32,
}

/// Bounded request-id to ticket map; the oldest ticket is dropped first.
struct TicketBook {
    capacity: usize,
    order: VecDeque<RequestId>,
    tickets: HashMap<RequestId, Ticket>,
}

impl TicketBook {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            tickets: HashMap::new(),
        }
    }

    fn insert(&mut self, request_id: RequestId, ticket: Ticket) {
        if self.tickets.insert(request_id.clone(), ticket).is_none() {
            self.order.push_back(request_id);
        }
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.tickets.remove(&old);
            }
        }
    }

    fn get(&self, request_id: &RequestId) -> Option<Ticket> {
        self.tickets.get(request_id).cloned()
    }
}

pub struct LocatorEngine {
    config: HelixConfig,
    learning: Arc<LearningState>,
    healer: HealingController,
    feedback: FeedbackRecorder,
    tickets: Mutex<TicketBook>,
    checkpointer: Mutex<Option<Checkpointer>>,
}

impl LocatorEngine {
    /// Build the engine with the standard generators and load learning state.
    pub fn start(config: HelixConfig, collaborators: Collaborators) -> Result<Self, HelixError> {
        let registry = GeneratorRegistry::standard(&collaborators);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(
        config: HelixConfig,
        registry: GeneratorRegistry,
    ) -> Result<Self, HelixError> {
        config.validate()?;
        let learning = Arc::new(LearningState::load(&config)?);
        let fusion = ConfidenceFusion::new(
            config.fusion.agreement.clone(),
            learning.weights().clone(),
        );
        let scheduler = TierScheduler::new(
            registry,
            fusion,
            &UNIVERSAL_PATTERNS,
            config.scheduler.clone(),
        )?;
        let healer = HealingController::new(Arc::new(scheduler), config.healing.clone());

        let mut feedback = FeedbackRecorder::new(
            learning.weights().clone(),
            learning.cache().clone(),
            IdempotencyTracker::with_capacity(config.storage.idempotency_capacity),
        );
        if let Some(path) = config.storage.outcomes_path() {
            feedback = feedback.with_outcome_log(OutcomeLog::open(path)?);
        }

        info!(
            persistent = learning.is_persistent(),
            threshold = config.scheduler.confidence_threshold,
            "locator engine started"
        );
        Ok(Self {
            tickets: Mutex::new(TicketBook::new(config.storage.idempotency_capacity)),
            config,
            learning,
            healer,
            feedback,
            checkpointer: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &HelixConfig {
        &self.config
    }

    pub fn learning(&self) -> &Arc<LearningState> {
        &self.learning
    }

    pub fn scheduler_metrics(&self) -> SchedulerMetricsSnapshot {
        self.healer.scheduler().metrics().snapshot()
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.learning.cache().stats()
    }

    /// Start periodic checkpoints. Idempotent; needs a tokio runtime.
    pub fn spawn_checkpointer(&self) {
        let mut slot = self.checkpointer.lock();
        if slot.is_none() {
            *slot = Some(Checkpointer::spawn(
                self.learning.clone(),
                self.config.storage.checkpoint_interval(),
            ));
        }
    }

    /// Stop the checkpointer and flush everything.
    pub async fn shutdown(&self) -> Result<(), HelixError> {
        let checkpointer = self.checkpointer.lock().take();
        if let Some(checkpointer) = checkpointer {
            checkpointer.stop().await;
        }
        self.learning.checkpoint()?;
        self.feedback.flush()?;
        info!("locator engine shut down");
        Ok(())
    }

    pub async fn resolve(&self, request: ResolveRequest) -> Result<ResolveResponse, LocatorError> {
        let request_id = RequestId::new();
        let span = info_span!(
            "resolve",
            request_id = %request_id,
            intent = %request.intent,
            platform = request.platform_hint.as_ref().map(|p| p.as_str()).unwrap_or(PlatformId::GENERIC),
        );
        self.resolve_inner(request_id, request).instrument(span).await
    }

    async fn resolve_inner(
        &self,
        request_id: RequestId,
        request: ResolveRequest,
    ) -> Result<ResolveResponse, LocatorError> {
        let started = Instant::now();
        if !(0.0..=1.0).contains(&request.confidence_threshold) {
            return Err(LocatorError::InvalidRequest(format!(
                "confidence_threshold {} outside [0, 1]",
                request.confidence_threshold
            )));
        }

        let intent = Intent::new(
            request.intent.as_str(),
            request.page_type.as_str(),
            request.platform_hint.clone(),
        );
        let platform = request
            .platform_hint
            .clone()
            .unwrap_or_else(PlatformId::generic);
        let deadline = request
            .deadline
            .unwrap_or_else(|| self.config.scheduler.request_deadline());
        let snapshot = match request.snapshot.clone() {
            Some(snapshot) => snapshot,
            None => match timeout(deadline, request.page.capture()).await {
                Ok(captured) => Arc::new(captured.map_err(LocatorError::Infrastructure)?),
                Err(_) => {
                    warn!(deadline_ms = deadline.as_millis() as u64, "snapshot capture timed out");
                    let response = ResolveResponse {
                        request_id,
                        found: false,
                        strategy: None,
                        attempts: Vec::new(),
                        total_latency_ms: started.elapsed().as_millis() as u64,
                        reason: Some(FailureReason::DeadlineExceeded.as_str().to_string()),
                        below_threshold: false,
                        healing_attempts: 0,
                        cache_hit: false,
                    };
                    return Ok(self.finish(response));
                }
            },
        };
        let context = PlatformContext::new(
            platform.clone(),
            request.page_type.as_str(),
            snapshot,
            request.page.clone(),
        )
        .with_platform_candidates(request.platform_confidence, request.alternate_platforms.clone());

        let key = cache_key(&platform, &request.page_type, &intent);
        let cached = self
            .learning
            .cache()
            .lookup(&key)
            .map(|entry| entry.strategy);

        let mut healing = HealingRequest::new(
            request.confidence_threshold,
            request.max_healing_attempts,
            deadline.saturating_sub(started.elapsed()),
        )
        .with_cached(cached);
        if let Some(cancel) = request.cancel.clone() {
            healing = healing.with_cancel(cancel);
        }
        let report = self.healer.run(&intent, &context, healing).await?;

        let id = request_id.to_string();
        if let Some(stale) = report.stale_cached() {
            self.feedback.record(Feedback {
                key: &format!("{id}:cache"),
                strategy: stale,
                platform: &platform,
                cache_key: Some(&key),
                success: false,
                latency_ms: 0,
            });
        }
        for (cycle, missed) in report.failed_strategies().enumerate() {
            self.feedback.record(Feedback {
                key: &format!("{id}:miss:{cycle}"),
                strategy: missed,
                platform: &platform,
                cache_key: Some(&key),
                success: false,
                latency_ms: 0,
            });
        }
        if let (true, Some(winner)) = (report.found(), report.strategy.as_ref()) {
            let latency_ms = report.attempts.last().map_or(0, |attempt| attempt.latency_ms);
            self.feedback.record(Feedback {
                key: &format!("{id}:validated"),
                strategy: winner,
                platform: &platform,
                cache_key: Some(&key),
                success: true,
                latency_ms,
            });
        }

        self.tickets.lock().insert(
            request_id.clone(),
            Ticket {
                cache_key: key,
                platform,
                healing_attempts: report.healing_attempts,
            },
        );

        let total_latency_ms = started.elapsed().as_millis() as u64;
        let response = ResolveResponse {
            request_id,
            found: report.found(),
            cache_hit: report.cache_hit(),
            strategy: report.strategy.clone(),
            reason: report.reason.map(|reason| reason.as_str().to_string()),
            below_threshold: report.below_threshold,
            healing_attempts: report.healing_attempts,
            attempts: report.attempts,
            total_latency_ms,
        };

        Ok(self.finish(response))
    }

    /// Append the audit record and log the summary of a finished request.
    fn finish(&self, response: ResolveResponse) -> ResolveResponse {
        let outcome = ResolutionOutcome::new(
            response.request_id.clone(),
            response.strategy.clone(),
            response.found,
            response.total_latency_ms,
            response.healing_attempts,
        );
        if let Err(err) = self.feedback.log_outcome(&outcome) {
            warn!(error = %err, "resolution outcome not logged");
        }

        info!(
            found = response.found,
            cache_hit = response.cache_hit,
            locator = response.strategy.as_ref().map(|s| s.locator.as_str()),
            attempts = response.attempts.len(),
            reason = response.reason.as_deref(),
            total_latency_ms = response.total_latency_ms,
            "resolution finished"
        );
        response
    }

    /// Report how a served strategy fared downstream. Idempotent per request
    /// id; a replay is acknowledged with `accepted == false`.
    pub fn record_outcome(
        &self,
        request_id: &RequestId,
        strategy: &Strategy,
        success: bool,
        latency_ms: u64,
    ) -> Result<FeedbackReceipt, LocatorError> {
        let ticket = self
            .tickets
            .lock()
            .get(request_id)
            .ok_or_else(|| LocatorError::UnknownRequest(request_id.to_string()))?;
        let receipt = self.feedback.record(Feedback {
            key: &format!("{request_id}:outcome"),
            strategy,
            platform: &ticket.platform,
            cache_key: Some(&ticket.cache_key),
            success,
            latency_ms,
        });
        if receipt.accepted {
            let outcome = ResolutionOutcome::new(
                request_id.clone(),
                Some(strategy.clone()),
                success,
                latency_ms,
                ticket.healing_attempts,
            );
            if let Err(err) = self.feedback.log_outcome(&outcome) {
                warn!(request_id = %request_id, error = %err, "feedback outcome not logged");
            }
        }
        Ok(receipt)
    }
}
