//! Timing generator: locators that survive re-renders.
//!
//! Only anchors independent of layout and copy are proposed (stable ids,
//! test ids, form names). A page that is still loading lowers confidence.

use async_trait::async_trait;
use helix_core_types::{DocumentSnapshot, GeneratorType, Intent, PlatformContext, Provenance, Strategy};

use crate::errors::GeneratorError;
use crate::generator::Generator;
use crate::matching::{
    effectively_hidden, element_match_score, kind_matches, locator_candidates, scaled, MIN_MATCH,
};

const BUSY_PENALTY: f64 = 0.9;
const BUSY_CLASS_MARKERS: &[&str] = &["spinner", "loading", "busy", "skeleton"];

/// Whether the snapshot shows an in-progress load.
pub fn page_is_busy(snapshot: &DocumentSnapshot) -> bool {
    snapshot.body_elements().any(|node| {
        node.attr("aria-busy") == Some("true")
            || node.classes().any(|class| {
                let class = class.to_ascii_lowercase();
                BUSY_CLASS_MARKERS
                    .iter()
                    .any(|marker| class.contains(marker))
            })
    })
}

pub struct TimingGenerator;

#[async_trait]
impl Generator for TimingGenerator {
    async fn generate(
        &self,
        intent: &Intent,
        context: &PlatformContext,
    ) -> Result<Vec<Strategy>, GeneratorError> {
        let snapshot = &context.snapshot;
        let kind = intent.element_kind();
        let busy = page_is_busy(snapshot);

        let mut strategies = Vec::new();
        for node in snapshot.body_elements() {
            if !(node.is_interactive() && kind_matches(node, kind)) {
                continue;
            }
            if effectively_hidden(snapshot, node) {
                continue;
            }
            let score = element_match_score(node, intent);
            if score < MIN_MATCH {
                continue;
            }
            let Some(stable) = locator_candidates(snapshot, node)
                .into_iter()
                .find(|candidate| candidate.basis.is_stable())
            else {
                continue;
            };
            let mut confidence = scaled(0.45, 0.35, score);
            let mut provenance = Provenance::new("stable_anchor")
                .with_overlap(Provenance::node_key(&snapshot.id, node.index));
            if busy {
                confidence *= BUSY_PENALTY;
                provenance = provenance.with_detail("busy");
            } else {
                provenance = provenance.with_detail(stable.basis.name());
            }
            strategies.push(Strategy::new(
                stable.locator,
                GeneratorType::Timing,
                confidence,
                GeneratorType::Timing.tier(),
                provenance,
            ));
        }
        Ok(strategies)
    }

    fn generator_type(&self) -> GeneratorType {
        GeneratorType::Timing
    }
}
