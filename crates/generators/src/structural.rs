//! Structural generator: tag, attribute and framework class conventions.

use async_trait::async_trait;
use helix_core_types::{
    DocumentSnapshot, ElementKind, ElementNode, GeneratorType, Intent, LocatorExpr,
    PlatformContext, PlatformId, Provenance, Strategy,
};

use crate::errors::GeneratorError;
use crate::generator::Generator;
use crate::matching::{
    css_string, effectively_hidden, element_match_score, element_strategy, kind_matches,
    resolves_uniquely, scaled, MIN_MATCH,
};

/// Component class prefixes emitted by well-known enterprise UI frameworks.
const PLATFORM_CLASS_HINTS: &[(&str, &[&str])] = &[
    (
        "salesforce_lightning",
        &["slds-button", "slds-input", "slds-select", "lightning-"],
    ),
    ("sap_fiori", &["sapMBtn", "sapMInput", "sapMSelect", "sapUi"]),
    ("workday", &["WDFF", "wd-", "css-"]),
    ("servicenow", &["form-control", "btn-primary", "sn-"]),
];

/// Concepts whose control is usually the form's submit button.
const SUBMIT_CONCEPTS: &[&str] = &["login", "save", "next", "search"];

const PLATFORM_BONUS: f64 = 0.05;
const SUBMIT_BONUS: f64 = 0.05;
const PIERCE_PENALTY: f64 = 0.05;

/// Host attributes that usually tell sibling web components apart.
const HOST_KEYS: &[&str] = &["data-id", "name", "label", "variant"];

pub fn platform_class_hints(platform: &PlatformId) -> &'static [&'static str] {
    PLATFORM_CLASS_HINTS
        .iter()
        .find(|(id, _)| *id == platform.as_str())
        .map(|(_, hints)| *hints)
        .unwrap_or(&[])
}

fn carries_platform_class(node: &ElementNode, hints: &[&str]) -> bool {
    node.classes()
        .any(|class| hints.iter().any(|hint| class.starts_with(hint)))
        || node.tag.starts_with("lightning-")
}

fn is_form_submit(snapshot: &DocumentSnapshot, node: &ElementNode) -> bool {
    let submits = node.tag == "button" && node.attr("type").map_or(true, |kind| kind == "submit")
        || node.input_type() == Some("submit");
    submits && snapshot.ancestors(node.index).any(|a| a.tag == "form")
}

/// Custom elements are the only hosts that can own a shadow root.
fn is_shadow_host(node: &ElementNode) -> bool {
    node.tag.contains('-')
}

/// `pierce/` locator through the nearest shadow host, when one resolves to
/// exactly this element.
pub fn pierce_locator(snapshot: &DocumentSnapshot, node: &ElementNode) -> Option<String> {
    let host = snapshot.ancestors(node.index).find(|a| is_shadow_host(a))?;
    let keyed = HOST_KEYS.iter().filter_map(|key| {
        host.attr(key)
            .filter(|value| !value.is_empty())
            .map(|value| format!("{}[{key}={}]", host.tag, css_string(value)))
    });
    keyed
        .chain(std::iter::once(host.tag.clone()))
        .map(|host_selector| LocatorExpr::pierce(&format!("{host_selector} {}", node.tag)))
        .find(|locator| resolves_uniquely(snapshot, locator, node.index))
}

pub struct StructuralGenerator;

#[async_trait]
impl Generator for StructuralGenerator {
    async fn generate(
        &self,
        intent: &Intent,
        context: &PlatformContext,
    ) -> Result<Vec<Strategy>, GeneratorError> {
        let snapshot = &context.snapshot;
        let kind = intent.element_kind();
        let hints = platform_class_hints(&context.platform_id);
        let wants_submit = intent
            .concepts()
            .iter()
            .any(|concept| SUBMIT_CONCEPTS.contains(&concept.canonical))
            && matches!(kind, ElementKind::Button | ElementKind::Any);

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
            let mut confidence = scaled(0.45, 0.4, score);
            let mut source = "markup";
            if !hints.is_empty() && carries_platform_class(node, hints) {
                confidence += PLATFORM_BONUS;
                source = "platform_class";
            }
            if wants_submit && is_form_submit(snapshot, node) {
                confidence += SUBMIT_BONUS;
            }
            let confidence = confidence.min(0.95);
            strategies.push(element_strategy(
                GeneratorType::Structural,
                snapshot,
                node,
                confidence,
                source,
            ));
            if let Some(locator) = pierce_locator(snapshot, node) {
                strategies.push(Strategy::new(
                    locator,
                    GeneratorType::Structural,
                    confidence - PIERCE_PENALTY,
                    GeneratorType::Structural.tier(),
                    Provenance::new("shadow_pierce")
                        .with_overlap(Provenance::node_key(&snapshot.id, node.index)),
                ));
            }
        }
        Ok(strategies)
    }

    fn generator_type(&self) -> GeneratorType {
        GeneratorType::Structural
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, context_on};

    const LIGHTNING: &str = r#"<form>
        <button class="slds-button slds-button_brand" name="save">Save</button>
        <button class="slds-button" name="cancel">Cancel</button>
    </form>"#;

    #[tokio::test]
    async fn platform_classes_raise_confidence() {
        let intent = Intent::new("save button", "form", None);
        let generic = StructuralGenerator
            .generate(&intent, &context(LIGHTNING))
            .await
            .unwrap();
        let lightning = StructuralGenerator
            .generate(&intent, &context_on(LIGHTNING, "salesforce_lightning"))
            .await
            .unwrap();
        assert_eq!(generic.len(), 1);
        assert_eq!(lightning.len(), 1);
        assert_eq!(lightning[0].locator, "button[name=\"save\"]");
        assert!(lightning[0].raw_confidence > generic[0].raw_confidence);
        assert_eq!(lightning[0].provenance.source, "platform_class");
    }

    #[tokio::test]
    async fn shadow_hosted_controls_get_a_pierce_candidate() {
        let page = r#"<div>
            <lightning-button variant="brand"><button>Save</button></lightning-button>
            <lightning-button variant="neutral"><button>Cancel</button></lightning-button>
        </div>"#;
        let intent = Intent::new("save button", "record", None);
        let strategies = StructuralGenerator
            .generate(&intent, &context_on(page, "salesforce_lightning"))
            .await
            .unwrap();
        assert_eq!(strategies.len(), 2);
        let pierce = strategies
            .iter()
            .find(|s| s.provenance.source == "shadow_pierce")
            .unwrap();
        assert_eq!(
            pierce.locator,
            "pierce/lightning-button[variant=\"brand\"] button"
        );
        assert!(pierce.raw_confidence < strategies[0].raw_confidence);
        assert!(pierce.overlaps(&strategies[0]));
    }

    #[tokio::test]
    async fn light_dom_controls_get_no_pierce_candidate() {
        let intent = Intent::new("save button", "form", None);
        let strategies = StructuralGenerator
            .generate(&intent, &context(LIGHTNING))
            .await
            .unwrap();
        assert!(strategies
            .iter()
            .all(|s| s.provenance.source != "shadow_pierce"));
    }

    #[test]
    fn unknown_platforms_have_no_hints() {
        assert!(platform_class_hints(&PlatformId::new("acme")).is_empty());
        assert!(platform_class_hints(&PlatformId::new("sap_fiori")).contains(&"sapMBtn"));
    }
}
