//! Live validation of candidate strategies.

use std::time::Duration;

use helix_core_types::{CollaboratorError, RenderingContext, Strategy, ValidationReport};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::LocatorError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationVerdict {
    pub hit: bool,
    pub report: ValidationReport,
    pub latency_ms: u64,
    /// The collaborator did not answer before the deadline.
    pub timed_out: bool,
}

/// Runs a candidate against the page through the rendering collaborator.
///
/// A locator the collaborator refuses counts as a miss. Unreachable or
/// transport failures are fatal and surface as [`LocatorError::Infrastructure`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    pub async fn validate(
        &self,
        page: &dyn RenderingContext,
        strategy: &Strategy,
        limit: Duration,
    ) -> Result<ValidationVerdict, LocatorError> {
        let started = Instant::now();
        let outcome = tokio::time::timeout(limit, page.validate(&strategy.locator)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let report = match outcome {
            Err(_) => {
                warn!(locator = %strategy.locator, limit_ms = limit.as_millis() as u64, "validation timed out");
                return Ok(ValidationVerdict {
                    hit: false,
                    report: ValidationReport::default(),
                    latency_ms,
                    timed_out: true,
                });
            }
            Ok(Ok(report)) => report,
            Ok(Err(err)) if err.is_infrastructure() => {
                warn!(locator = %strategy.locator, error = %err, "rendering collaborator failed");
                return Err(LocatorError::Infrastructure(err));
            }
            Ok(Err(CollaboratorError::Rejected(reason))) => {
                debug!(locator = %strategy.locator, reason = %reason, "locator rejected by page");
                ValidationReport::default()
            }
            Ok(Err(err)) => return Err(LocatorError::Infrastructure(err)),
        };

        debug!(
            locator = %strategy.locator,
            generator = strategy.generator.name(),
            present = report.present,
            interactable = report.interactable,
            latency_ms,
            "validated"
        );
        Ok(ValidationVerdict {
            hit: report.hit(),
            report,
            latency_ms,
            timed_out: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_core_types::{GeneratorType, PerformanceTier, Provenance};
    use helix_generators::StaticPage;

    fn strategy(locator: &str) -> Strategy {
        Strategy::new(
            locator,
            GeneratorType::Structural,
            0.9,
            PerformanceTier::Fast,
            Provenance::new("test"),
        )
    }

    const LIMIT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn hit_requires_present_and_interactable() {
        let page = StaticPage::from_html(
            "s",
            r#"<button id="save">Save</button><button id="off" disabled>Off</button>"#,
        );
        let validator = Validator;
        assert!(validator.validate(&page, &strategy("#save"), LIMIT).await.unwrap().hit);
        let off = validator.validate(&page, &strategy("#off"), LIMIT).await.unwrap();
        assert!(!off.hit && off.report.present);
    }

    #[tokio::test]
    async fn rejected_locators_are_misses() {
        let page = StaticPage::from_html("s", "<p></p>");
        let verdict = Validator.validate(&page, &strategy("p["), LIMIT).await.unwrap();
        assert!(!verdict.hit && !verdict.timed_out);
    }

    #[tokio::test]
    async fn unreachable_page_is_fatal() {
        let page = StaticPage::from_html("s", "<p></p>");
        page.fail_with(CollaboratorError::Unreachable("closed".into()));
        let err = Validator
            .validate(&page, &strategy("p"), LIMIT)
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::Infrastructure(_)));
    }
}
