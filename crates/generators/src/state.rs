//! State generator: prefers controls the user can act on right now.

use async_trait::async_trait;
use helix_core_types::{ElementNode, GeneratorType, Intent, PlatformContext, Strategy};

use crate::errors::GeneratorError;
use crate::generator::Generator;
use crate::matching::{
    effectively_hidden, element_match_score, element_strategy, kind_matches, scaled, MIN_MATCH,
};

/// Concepts expected on a page of the given type.
const PAGE_CONCEPTS: &[(&str, &[&str])] = &[
    ("login", &["login", "username", "password"]),
    ("form", &["save", "cancel", "next", "back"]),
    ("search", &["search"]),
    ("home", &["menu", "home", "search", "logout"]),
    ("list", &["new", "search", "edit", "delete"]),
];

const DISABLED_PENALTY: f64 = 0.6;
const PAGE_BONUS: f64 = 0.05;
const FOCUS_BONUS: f64 = 0.03;

fn page_expects(page_type: &str, intent: &Intent) -> bool {
    let Some((_, expected)) = PAGE_CONCEPTS.iter().find(|(page, _)| *page == page_type) else {
        return false;
    };
    intent
        .concepts()
        .iter()
        .any(|concept| expected.contains(&concept.canonical))
}

fn has_focus_hint(node: &ElementNode) -> bool {
    node.has_attr("autofocus") || node.attr("aria-current").is_some()
}

pub struct StateGenerator;

#[async_trait]
impl Generator for StateGenerator {
    async fn generate(
        &self,
        intent: &Intent,
        context: &PlatformContext,
    ) -> Result<Vec<Strategy>, GeneratorError> {
        let snapshot = &context.snapshot;
        let kind = intent.element_kind();
        let page_type = if intent.page_type.is_empty() {
            context.page_type.as_str()
        } else {
            intent.page_type.as_str()
        };
        let page_bonus = if page_expects(page_type, intent) {
            PAGE_BONUS
        } else {
            0.0
        };

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
            let mut confidence = scaled(0.4, 0.4, score) + page_bonus;
            let mut source = "enabled";
            if has_focus_hint(node) {
                confidence += FOCUS_BONUS;
            }
            if node.is_disabled() {
                confidence *= DISABLED_PENALTY;
                source = "disabled";
            }
            strategies.push(element_strategy(
                GeneratorType::State,
                snapshot,
                node,
                confidence,
                source,
            ));
        }
        Ok(strategies)
    }

    fn generator_type(&self) -> GeneratorType {
        GeneratorType::State
    }
}
