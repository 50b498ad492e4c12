//! Behavioral generator: clickable affordances addressed by visible text.

use async_trait::async_trait;
use helix_core_types::{
    DocumentSnapshot, ElementNode, GeneratorType, Intent, LocatorExpr, PlatformContext, Provenance,
    Strategy,
};

use crate::errors::GeneratorError;
use crate::generator::Generator;
use crate::matching::{effectively_hidden, kind_matches, label_score, scaled, MIN_MATCH};

const HANDLER_BONUS: f64 = 0.05;

fn has_click_affordance(node: &ElementNode) -> bool {
    node.is_interactive()
        || node.has_attr("onclick")
        || node.has_attr("ng-click")
        || node.has_attr("data-action")
        || node
            .attr("style")
            .map(|style| style.replace(' ', "").contains("cursor:pointer"))
            .unwrap_or(false)
}

/// The clickable element itself, or its nearest clickable ancestor.
fn clickable_owner<'a>(snapshot: &'a DocumentSnapshot, node: &'a ElementNode) -> Option<&'a ElementNode> {
    if has_click_affordance(node) {
        return Some(node);
    }
    snapshot
        .ancestors(node.index)
        .take(3)
        .find(|ancestor| has_click_affordance(ancestor))
}

pub struct BehavioralGenerator;

#[async_trait]
impl Generator for BehavioralGenerator {
    async fn generate(
        &self,
        intent: &Intent,
        context: &PlatformContext,
    ) -> Result<Vec<Strategy>, GeneratorError> {
        let snapshot = &context.snapshot;
        let kind = intent.element_kind();

        let mut strategies: Vec<Strategy> = Vec::new();
        for node in snapshot.body_elements().filter(|node| !node.text.is_empty()) {
            let score = label_score(&node.text, intent);
            if score < MIN_MATCH {
                continue;
            }
            let Some(owner) = clickable_owner(snapshot, node) else {
                continue;
            };
            if !kind_matches(owner, kind) || effectively_hidden(snapshot, owner) {
                continue;
            }
            let locator = LocatorExpr::text(&node.text);
            let hits = snapshot.query(&locator).unwrap_or_default();
            if hits != [node.index] {
                continue;
            }
            let overlap = Provenance::node_key(&snapshot.id, owner.index);
            if strategies
                .iter()
                .any(|existing| existing.provenance.overlap_key.as_deref() == Some(overlap.as_str()))
            {
                continue;
            }
            let handler = owner.has_attr("onclick") || owner.has_attr("href");
            let confidence =
                scaled(0.45, 0.35, score) + if handler { HANDLER_BONUS } else { 0.0 };
            strategies.push(Strategy::new(
                locator,
                GeneratorType::Behavioral,
                confidence,
                GeneratorType::Behavioral.tier(),
                Provenance::new("click_affordance")
                    .with_detail(owner.tag.clone())
                    .with_overlap(overlap),
            ));
        }
        Ok(strategies)
    }

    fn generator_type(&self) -> GeneratorType {
        GeneratorType::Behavioral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;

    #[tokio::test]
    async fn text_inside_a_clickable_container_targets_the_container() {
        let page = r#"<ul>
            <li><div class="tile" onclick="go()"><span>New Opportunity</span></div></li>
            <li><div class="tile"><span>Reports</span></div></li>
        </ul>"#;
        let intent = Intent::new("new opportunity", "home", None);
        let strategies = BehavioralGenerator
            .generate(&intent, &context(page))
            .await
            .unwrap();
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].locator, "text=New Opportunity");
        assert_eq!(strategies[0].provenance.detail.as_deref(), Some("div"));
    }

    #[tokio::test]
    async fn plain_text_is_not_clickable() {
        let page = r#"<p>Save</p>"#;
        let intent = Intent::new("save", "form", None);
        let strategies = BehavioralGenerator
            .generate(&intent, &context(page))
            .await
            .unwrap();
        assert!(strategies.is_empty());
    }
}
