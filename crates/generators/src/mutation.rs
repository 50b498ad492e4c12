//! Mutation generator: re-captures the page and looks at what changed.
//!
//! Controls that appeared after the original snapshot (dialogs, lazily
//! rendered toolbars) are invisible to every other generator. Controls that
//! persisted across both captures are reported too, at lower confidence.

use async_trait::async_trait;
use helix_core_types::{GeneratorType, Intent, PlatformContext, Provenance, Strategy};
use tracing::debug;

use crate::errors::GeneratorError;
use crate::generator::Generator;
use crate::matching::{
    effectively_hidden, element_match_score, kind_matches, locator_for, scaled, MIN_MATCH,
};

pub struct MutationGenerator;

#[async_trait]
impl Generator for MutationGenerator {
    async fn generate(
        &self,
        intent: &Intent,
        context: &PlatformContext,
    ) -> Result<Vec<Strategy>, GeneratorError> {
        let original = &context.snapshot;
        let fresh = context
            .page
            .capture()
            .await
            .map_err(|err| GeneratorError::collaborator(GeneratorType::Mutation, err))?;
        let kind = intent.element_kind();

        let mut strategies = Vec::new();
        for node in fresh.body_elements() {
            if !(node.is_interactive() && kind_matches(node, kind)) {
                continue;
            }
            if effectively_hidden(&fresh, node) {
                continue;
            }
            let score = element_match_score(node, intent);
            if score < MIN_MATCH {
                continue;
            }
            let candidate = locator_for(&fresh, node);
            let before = original.query(&candidate.locator).unwrap_or_default();
            let (confidence, detail, overlap) = match before.as_slice() {
                [] => (
                    scaled(0.5, 0.35, score),
                    "appeared",
                    Provenance::node_key(&fresh.id, node.index),
                ),
                [only] => (
                    scaled(0.45, 0.3, score),
                    "persisted",
                    Provenance::node_key(&original.id, *only),
                ),
                _ => (
                    scaled(0.4, 0.3, score),
                    "ambiguous",
                    Provenance::node_key(&fresh.id, node.index),
                ),
            };
            debug!(locator = %candidate.locator, detail, "mutation candidate");
            strategies.push(Strategy::new(
                candidate.locator,
                GeneratorType::Mutation,
                confidence,
                GeneratorType::Mutation.tier(),
                Provenance::new("recapture")
                    .with_detail(detail)
                    .with_overlap(overlap),
            ));
        }
        Ok(strategies)
    }

    fn generator_type(&self) -> GeneratorType {
        GeneratorType::Mutation
    }
}
