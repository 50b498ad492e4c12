//! Contracts of the external collaborators the engine calls into.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DocumentSnapshot, PlatformId};

/// Failure reported by an external collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollaboratorError {
    /// The collaborator could not be reached at all.
    #[error("collaborator unreachable: {0}")]
    Unreachable(String),

    /// Transport-level failure while talking to the collaborator.
    #[error("transport error: {0}")]
    Transport(String),

    /// The collaborator answered but refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl CollaboratorError {
    /// Infrastructure faults are never healed; they surface to the caller.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Unreachable(_) | CollaboratorError::Transport(_)
        )
    }
}

/// Result of checking a locator against the live document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub present: bool,
    pub interactable: bool,
}

impl ValidationReport {
    pub fn hit(&self) -> bool {
        self.present && self.interactable
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (i64, i64) {
        (
            (self.x + self.width / 2.0).round() as i64,
            (self.y + self.height / 2.0).round() as i64,
        )
    }
}

/// Backend that renders the page and executes locators.
#[async_trait]
pub trait RenderingContext: Send + Sync {
    async fn capture(&self) -> Result<DocumentSnapshot, CollaboratorError>;

    async fn validate(&self, locator: &str) -> Result<ValidationReport, CollaboratorError>;

    async fn screenshot(&self) -> Result<Option<Vec<u8>>, CollaboratorError> {
        Ok(None)
    }
}

/// Natural-language intent interpreter.
#[async_trait]
pub trait LanguageUnderstanding: Send + Sync {
    /// Ranked `(locator_pattern, confidence)` pairs.
    async fn infer(
        &self,
        intent_text: &str,
        platform_hint: Option<&PlatformId>,
    ) -> Result<Vec<(String, f64)>, CollaboratorError>;
}

/// Optical analysis of screenshots.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Ranked `(bounding_box, confidence)` pairs.
    async fn locate(
        &self,
        screenshot: &[u8],
        intent_text: &str,
    ) -> Result<Vec<(BoundingBox, f64)>, CollaboratorError>;
}

/// Per-request environment handed to every generator.
#[derive(Clone)]
pub struct PlatformContext {
    pub platform_id: PlatformId,
    pub page_type: String,
    pub snapshot: Arc<DocumentSnapshot>,
    pub page: Arc<dyn RenderingContext>,
    /// Confidence of the external platform detection, in [0, 1].
    pub platform_confidence: f64,
    /// Next-best platform candidates, best first.
    pub alternate_platforms: Vec<PlatformId>,
}

impl PlatformContext {
    pub fn new(
        platform_id: PlatformId,
        page_type: impl Into<String>,
        snapshot: Arc<DocumentSnapshot>,
        page: Arc<dyn RenderingContext>,
    ) -> Self {
        Self {
            platform_id,
            page_type: page_type.into(),
            snapshot,
            page,
            platform_confidence: 1.0,
            alternate_platforms: Vec::new(),
        }
    }

    pub fn with_platform_candidates(
        mut self,
        confidence: f64,
        alternates: Vec<PlatformId>,
    ) -> Self {
        self.platform_confidence = confidence.clamp(0.0, 1.0);
        self.alternate_platforms = alternates;
        self
    }

    /// Same page, re-targeted at another platform for weight lookup.
    pub fn for_platform(&self, platform_id: PlatformId) -> Self {
        let mut next = self.clone();
        next.platform_id = platform_id;
        next
    }
}

impl fmt::Debug for PlatformContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformContext")
            .field("platform_id", &self.platform_id)
            .field("page_type", &self.page_type)
            .field("snapshot", &self.snapshot.id)
            .field("platform_confidence", &self.platform_confidence)
            .field("alternate_platforms", &self.alternate_platforms)
            .finish()
    }
}
