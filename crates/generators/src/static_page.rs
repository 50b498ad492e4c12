//! In-memory rendering context backed by a document snapshot.
//!
//! Validation answers come from evaluating the locator against the current
//! snapshot. Failures can be injected and individual locators can be forced
//! to a fixed report, which makes the type usable both for offline
//! resolution of saved pages and as a scripted page in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use helix_core_types::{
    CollaboratorError, DocumentSnapshot, LocatorExpr, RenderingContext, ValidationReport,
};
use parking_lot::RwLock;

pub struct StaticPage {
    snapshot: RwLock<Arc<DocumentSnapshot>>,
    screenshot: RwLock<Option<Vec<u8>>>,
    forced: RwLock<HashMap<String, ValidationReport>>,
    failure: RwLock<Option<CollaboratorError>>,
    validations: AtomicU64,
    captures: AtomicU64,
}

impl StaticPage {
    pub fn new(snapshot: DocumentSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            screenshot: RwLock::new(None),
            forced: RwLock::new(HashMap::new()),
            failure: RwLock::new(None),
            validations: AtomicU64::new(0),
            captures: AtomicU64::new(0),
        }
    }

    pub fn from_html(id: impl Into<String>, html: impl Into<String>) -> Self {
        Self::new(DocumentSnapshot::from_html(id, html))
    }

    /// Current snapshot, shared.
    pub fn snapshot(&self) -> Arc<DocumentSnapshot> {
        self.snapshot.read().clone()
    }

    /// Simulate the page re-rendering into different markup.
    pub fn replace_html(&self, id: impl Into<String>, html: impl Into<String>) {
        *self.snapshot.write() = Arc::new(DocumentSnapshot::from_html(id, html));
    }

    pub fn set_screenshot(&self, screenshot: Option<Vec<u8>>) {
        *self.screenshot.write() = screenshot;
    }

    /// Answer `report` for `locator` regardless of the markup.
    pub fn force(&self, locator: impl Into<String>, report: ValidationReport) {
        self.forced.write().insert(locator.into(), report);
    }

    /// Every subsequent call fails with `error` until [`StaticPage::recover`].
    pub fn fail_with(&self, error: CollaboratorError) {
        *self.failure.write() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.write() = None;
    }

    pub fn validations(&self) -> u64 {
        self.validations.load(Ordering::Relaxed)
    }

    pub fn captures(&self) -> u64 {
        self.captures.load(Ordering::Relaxed)
    }

    fn check_failure(&self) -> Result<(), CollaboratorError> {
        match self.failure.read().as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RenderingContext for StaticPage {
    async fn capture(&self) -> Result<DocumentSnapshot, CollaboratorError> {
        self.check_failure()?;
        self.captures.fetch_add(1, Ordering::Relaxed);
        Ok(DocumentSnapshot::clone(&self.snapshot()))
    }

    async fn validate(&self, locator: &str) -> Result<ValidationReport, CollaboratorError> {
        self.check_failure()?;
        self.validations.fetch_add(1, Ordering::Relaxed);
        if let Some(report) = self.forced.read().get(locator) {
            return Ok(*report);
        }
        let snapshot = self.snapshot();
        if matches!(LocatorExpr::parse(locator), Ok(LocatorExpr::Visual { .. })) {
            return Ok(ValidationReport::default());
        }
        let hits = snapshot
            .query(locator)
            .map_err(|err| CollaboratorError::Rejected(err.to_string()))?;
        let interactable = hits
            .iter()
            .filter_map(|index| snapshot.element(*index))
            .any(|node| {
                !node.is_disabled()
                    && !node.is_hidden()
                    && !snapshot.ancestors(node.index).any(|a| a.is_hidden())
            });
        Ok(ValidationReport {
            present: !hits.is_empty(),
            interactable,
        })
    }

    async fn screenshot(&self) -> Result<Option<Vec<u8>>, CollaboratorError> {
        self.check_failure()?;
        Ok(self.screenshot.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn validation_reflects_markup_and_overrides() {
        let page = StaticPage::from_html(
            "s",
            r#"<button id="ok">OK</button><button id="off" disabled>Off</button>"#,
        );
        assert!(page.validate("#ok").await.unwrap().hit());
        let off = page.validate("#off").await.unwrap();
        assert!(off.present && !off.interactable);
        assert!(!page.validate("#missing").await.unwrap().present);
        assert!(!page.validate("visual:click(1,2)").await.unwrap().present);

        page.force("visual:click(1,2)", ValidationReport { present: true, interactable: true });
        assert!(page.validate("visual:click(1,2)").await.unwrap().hit());
        assert_eq!(page.validations(), 5);
    }

    #[tokio::test]
    async fn injected_failures_surface_until_recovery() {
        let page = StaticPage::from_html("s", "<p></p>");
        page.fail_with(CollaboratorError::Unreachable("down".into()));
        assert!(page.validate("p").await.is_err());
        assert!(page.capture().await.is_err());
        page.recover();
        assert!(page.capture().await.is_ok());
        assert_eq!(page.captures(), 1);
    }

    #[tokio::test]
    async fn malformed_locators_are_rejected_not_unreachable() {
        let page = StaticPage::from_html("s", "<p></p>");
        let err = page.validate("p[").await.unwrap_err();
        assert!(!err.is_infrastructure());
    }
}
