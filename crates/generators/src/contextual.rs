//! Contextual generator: resolves a control through the text around it.
//!
//! Enterprise forms frequently render the visible caption in a separate
//! element from the control. Three relations are followed: `<label for>`,
//! a `<label>` wrapping the control, and caption text immediately preceding
//! the control among its siblings.

use async_trait::async_trait;
use helix_core_types::{
    DocumentSnapshot, ElementNode, GeneratorType, Intent, PlatformContext, Strategy,
};

use crate::errors::GeneratorError;
use crate::generator::Generator;
use crate::matching::{
    effectively_hidden, element_strategy, kind_matches, label_score, scaled, MIN_MATCH,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Relation {
    LabelFor,
    Wrapping,
    Sibling,
}

impl Relation {
    fn source(self) -> &'static str {
        match self {
            Relation::LabelFor => "label_for",
            Relation::Wrapping => "wrapping_label",
            Relation::Sibling => "sibling_caption",
        }
    }

    fn weight(self) -> f64 {
        match self {
            Relation::LabelFor => 1.0,
            Relation::Wrapping => 0.95,
            Relation::Sibling => 0.85,
        }
    }
}

fn first_control<'a>(snapshot: &'a DocumentSnapshot, root: &ElementNode) -> Option<&'a ElementNode> {
    snapshot.elements[root.index + 1..]
        .iter()
        .take_while(|node| node.depth > root.depth)
        .find(|node| node.is_interactive())
}

fn preceding_caption<'a>(snapshot: &'a DocumentSnapshot, node: &ElementNode) -> Option<&'a str> {
    let parent = node.parent?;
    let siblings: Vec<&ElementNode> = snapshot.children(parent).collect();
    let position = siblings.iter().position(|s| s.index == node.index)?;
    siblings[..position]
        .iter()
        .rev()
        .find(|sibling| !sibling.text.is_empty() || sibling.is_interactive())
        .filter(|sibling| !sibling.is_interactive())
        .map(|sibling| sibling.text.as_str())
}

pub struct ContextualGenerator;

impl ContextualGenerator {
    fn related<'a>(
        &self,
        snapshot: &'a DocumentSnapshot,
    ) -> Vec<(&'a ElementNode, &'a str, Relation)> {
        let mut related = Vec::new();
        for label in snapshot.body_elements().filter(|node| node.tag == "label") {
            let target = match label.attr("for") {
                Some(id) => snapshot
                    .elements
                    .iter()
                    .find(|node| node.attr("id") == Some(id))
                    .map(|node| (node, Relation::LabelFor)),
                None => first_control(snapshot, label).map(|node| (node, Relation::Wrapping)),
            };
            if let Some((node, relation)) = target {
                related.push((node, label.text.as_str(), relation));
            }
        }
        for node in snapshot.body_elements().filter(|node| node.is_interactive()) {
            if let Some(caption) = preceding_caption(snapshot, node) {
                related.push((node, caption, Relation::Sibling));
            }
        }
        related
    }
}

#[async_trait]
impl Generator for ContextualGenerator {
    async fn generate(
        &self,
        intent: &Intent,
        context: &PlatformContext,
    ) -> Result<Vec<Strategy>, GeneratorError> {
        let snapshot = &context.snapshot;
        let kind = intent.element_kind();

        let mut best: Vec<(usize, f64, Relation)> = Vec::new();
        for (node, caption, relation) in self.related(snapshot) {
            if !kind_matches(node, kind) || effectively_hidden(snapshot, node) {
                continue;
            }
            let score = label_score(caption, intent) * relation.weight();
            if score < MIN_MATCH {
                continue;
            }
            match best.iter_mut().find(|(index, _, _)| *index == node.index) {
                Some(entry) if entry.1 >= score => {}
                Some(entry) => *entry = (node.index, score, relation),
                None => best.push((node.index, score, relation)),
            }
        }

        Ok(best
            .into_iter()
            .filter_map(|(index, score, relation)| {
                let node = snapshot.element(index)?;
                Some(element_strategy(
                    GeneratorType::Contextual,
                    snapshot,
                    node,
                    scaled(0.5, 0.35, score),
                    relation.source(),
                ))
            })
            .collect())
    }

    fn generator_type(&self) -> GeneratorType {
        GeneratorType::Contextual
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;

    #[tokio::test]
    async fn follows_label_for_and_wrapping_labels() {
        let page = r#"<form>
            <label for="opp-amount">Amount</label>
            <input id="opp-amount" type="text">
            <label>Close Date <input name="close" type="text"></label>
        </form>"#;
        let amount = ContextualGenerator
            .generate(&Intent::new("amount field", "form", None), &context(page))
            .await
            .unwrap();
        assert_eq!(amount.len(), 1);
        assert_eq!(amount[0].locator, "#opp-amount");
        assert_eq!(amount[0].provenance.source, "label_for");

        let close = ContextualGenerator
            .generate(&Intent::new("close date field", "form", None), &context(page))
            .await
            .unwrap();
        assert_eq!(close.len(), 1);
        assert_eq!(close[0].locator, "input[name=\"close\"]");
        assert_eq!(close[0].provenance.source, "wrapping_label");
    }

    #[tokio::test]
    async fn sibling_captions_name_unlabelled_controls() {
        let page = r#"<div class="row"><span>Account Name</span><input type="text"></div>"#;
        let strategies = ContextualGenerator
            .generate(&Intent::new("account name field", "form", None), &context(page))
            .await
            .unwrap();
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].provenance.source, "sibling_caption");
        assert!(context(page)
            .snapshot
            .query(&strategies[0].locator)
            .map(|hits| hits.len() == 1)
            .unwrap_or(false));
    }
}
