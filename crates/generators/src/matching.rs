//! Element scoring and locator synthesis shared by the generators.

use helix_core_types::{
    contains_phrase, tokenize, DocumentSnapshot, ElementKind, ElementNode, GeneratorType, Intent,
    LocatorExpr, PerformanceTier, Provenance, Strategy,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum match score for an element to be proposed at all.
pub const MIN_MATCH: f64 = 0.5;

/// Labels longer than this many words are paragraphs, not control names.
const LONG_LABEL_WORDS: usize = 6;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{3,}").expect("static digit regex"));
static CSS_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("static ident regex"));

const GENERATED_ID_PREFIXES: &[&str] = &["ext-gen", "gwt-", "ember", "react-", "j_id", "ui-id-"];

/// How well a visible label names the intent's target, in [0, 1].
pub fn label_score(label: &str, intent: &Intent) -> f64 {
    let label = tokenize(label).join(" ");
    if label.is_empty() {
        return 0.0;
    }
    let target = intent.target_phrase();
    let concepts = intent.concepts();
    let concept_phrases = || concepts.iter().flat_map(|concept| concept.phrases.iter());

    let mut score = if !target.is_empty() && label == target {
        1.0
    } else if concept_phrases().any(|phrase| tokenize(phrase).join(" ") == label) {
        0.9
    } else if !target.is_empty() && contains_phrase(&label, &target) {
        0.8
    } else if concept_phrases().any(|phrase| contains_phrase(&label, phrase)) {
        0.7
    } else {
        token_overlap(&label, intent) * 0.5
    };

    if label.split(' ').count() > LONG_LABEL_WORDS {
        score *= 0.8;
    }
    score
}

fn token_overlap(label: &str, intent: &Intent) -> f64 {
    let terms = intent.target_terms();
    if terms.is_empty() {
        return 0.0;
    }
    let label_tokens = tokenize(label);
    let shared = terms
        .iter()
        .filter(|term| label_tokens.iter().any(|token| token == *term))
        .count();
    shared as f64 / terms.len() as f64
}

/// Best of the element's label and its naming attributes.
pub fn element_match_score(node: &ElementNode, intent: &Intent) -> f64 {
    let by_label = node
        .label()
        .map(|label| label_score(label, intent))
        .unwrap_or(0.0);
    let by_attr = ["name", "id", "placeholder", "aria-label", "title", "data-testid"]
        .iter()
        .filter_map(|name| node.attr(name))
        .map(|value| label_score(value, intent))
        .fold(0.0_f64, f64::max);
    by_label.max(by_attr * 0.9)
}

/// Whether the element natively or by role implements the requested kind.
pub fn kind_matches(node: &ElementNode, kind: ElementKind) -> bool {
    if kind == ElementKind::Any {
        return true;
    }
    if let Some(role) = node.role() {
        if kind.roles().contains(&role) {
            return true;
        }
    }
    match kind {
        ElementKind::Button => {
            node.tag == "button"
                || matches!(node.input_type(), Some("submit" | "button" | "reset" | "image"))
        }
        ElementKind::Input => {
            node.tag == "textarea"
                || matches!(
                    node.input_type(),
                    Some("text" | "email" | "password" | "search" | "tel" | "url" | "number")
                )
        }
        ElementKind::Link => node.tag == "a",
        ElementKind::Select => node.tag == "select",
        ElementKind::Checkbox => matches!(node.input_type(), Some("checkbox" | "radio")),
        ElementKind::Any => true,
    }
}

/// Hidden by itself or by any ancestor.
pub fn effectively_hidden(snapshot: &DocumentSnapshot, node: &ElementNode) -> bool {
    node.is_hidden() || snapshot.ancestors(node.index).any(ElementNode::is_hidden)
}

/// Ids that look machine generated and will not survive a re-render.
pub fn is_dynamic_id(id: &str) -> bool {
    let lowered = id.to_ascii_lowercase();
    DIGIT_RUN.is_match(id)
        || id.contains(':')
        || GENERATED_ID_PREFIXES
            .iter()
            .any(|prefix| lowered.starts_with(prefix))
}

/// Quote a value for use inside a CSS attribute selector.
pub fn css_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// What a synthesized locator is anchored on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LocatorBasis {
    Id,
    TestId,
    Name,
    AriaLabel,
    InputType,
    Text,
    Path,
}

impl LocatorBasis {
    pub fn name(self) -> &'static str {
        match self {
            LocatorBasis::Id => "id",
            LocatorBasis::TestId => "test_id",
            LocatorBasis::Name => "name",
            LocatorBasis::AriaLabel => "aria_label",
            LocatorBasis::InputType => "input_type",
            LocatorBasis::Text => "text",
            LocatorBasis::Path => "path",
        }
    }

    /// Anchors that do not depend on layout or copy.
    pub fn is_stable(self) -> bool {
        matches!(
            self,
            LocatorBasis::Id | LocatorBasis::TestId | LocatorBasis::Name
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocatorCandidate {
    pub locator: String,
    pub basis: LocatorBasis,
}

/// Locators that resolve to exactly this element, in preference order.
/// The structural path is always last and always present.
pub fn locator_candidates(snapshot: &DocumentSnapshot, node: &ElementNode) -> Vec<LocatorCandidate> {
    let mut proposals: Vec<(String, LocatorBasis)> = Vec::new();
    let tag = node.tag.as_str();

    if let Some(id) = node.attr("id").filter(|id| !id.is_empty() && !is_dynamic_id(id)) {
        let locator = if CSS_IDENT.is_match(id) {
            format!("#{id}")
        } else {
            format!("{tag}[id={}]", css_string(id))
        };
        proposals.push((locator, LocatorBasis::Id));
    }
    for attr in ["data-testid", "data-test", "data-qa"] {
        if let Some(value) = node.attr(attr).filter(|value| !value.is_empty()) {
            proposals.push((format!("[{attr}={}]", css_string(value)), LocatorBasis::TestId));
        }
    }
    if let Some(name) = node.attr("name").filter(|name| !name.is_empty()) {
        proposals.push((format!("{tag}[name={}]", css_string(name)), LocatorBasis::Name));
    }
    if let Some(label) = node.attr("aria-label").filter(|label| !label.is_empty()) {
        proposals.push((
            format!("{tag}[aria-label={}]", css_string(label)),
            LocatorBasis::AriaLabel,
        ));
    }
    if let Some(kind) = node.attr("type").filter(|kind| !kind.is_empty()) {
        proposals.push((format!("{tag}[type={}]", css_string(kind)), LocatorBasis::InputType));
    }
    if !node.text.is_empty() && node.text.split(' ').count() <= LONG_LABEL_WORDS {
        proposals.push((LocatorExpr::text(&node.text), LocatorBasis::Text));
    }

    let mut unique: Vec<LocatorCandidate> = proposals
        .into_iter()
        .filter(|(locator, _)| resolves_uniquely(snapshot, locator, node.index))
        .map(|(locator, basis)| LocatorCandidate { locator, basis })
        .collect();
    unique.push(LocatorCandidate {
        locator: structural_path(snapshot, node),
        basis: LocatorBasis::Path,
    });
    unique
}

/// Preferred unique locator for the element.
pub fn locator_for(snapshot: &DocumentSnapshot, node: &ElementNode) -> LocatorCandidate {
    locator_candidates(snapshot, node)
        .into_iter()
        .next()
        .unwrap_or_else(|| LocatorCandidate {
            locator: structural_path(snapshot, node),
            basis: LocatorBasis::Path,
        })
}

pub fn resolves_uniquely(snapshot: &DocumentSnapshot, locator: &str, index: usize) -> bool {
    matches!(snapshot.query(locator).as_deref(), Ok([only]) if *only == index)
}

/// `html > body > form:nth-child(1) > button:nth-child(3)` style path.
pub fn structural_path(snapshot: &DocumentSnapshot, node: &ElementNode) -> String {
    let mut chain: Vec<&ElementNode> = vec![node];
    chain.extend(snapshot.ancestors(node.index));
    chain.reverse();

    let segments: Vec<String> = chain
        .iter()
        .map(|step| match step.parent {
            None => step.tag.clone(),
            Some(parent) => {
                let position = snapshot
                    .children(parent)
                    .position(|sibling| sibling.index == step.index)
                    .map(|pos| pos + 1)
                    .unwrap_or(1);
                format!("{}:nth-child({position})", step.tag)
            }
        })
        .collect();
    segments.join(" > ")
}

/// Builds a strategy targeting one snapshot element.
pub fn element_strategy(
    generator: GeneratorType,
    snapshot: &DocumentSnapshot,
    node: &ElementNode,
    confidence: f64,
    source: &str,
) -> Strategy {
    let candidate = locator_for(snapshot, node);
    Strategy::new(
        candidate.locator,
        generator,
        confidence,
        generator.tier(),
        Provenance::new(source)
            .with_detail(candidate.basis.name())
            .with_overlap(Provenance::node_key(&snapshot.id, node.index)),
    )
}

/// Same as [`element_strategy`] with an explicit tier.
pub fn element_strategy_in(
    generator: GeneratorType,
    tier: PerformanceTier,
    snapshot: &DocumentSnapshot,
    node: &ElementNode,
    confidence: f64,
    source: &str,
) -> Strategy {
    let mut strategy = element_strategy(generator, snapshot, node, confidence, source);
    strategy.tier = tier;
    strategy
}

/// Linear map of a match score onto `[floor, floor + span]`.
pub fn scaled(floor: f64, span: f64, score: f64) -> f64 {
    (floor + span * score.clamp(0.0, 1.0)).min(0.99)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(html: &str) -> DocumentSnapshot {
        DocumentSnapshot::from_html("m", html)
    }

    fn find<'a>(snapshot: &'a DocumentSnapshot, tag: &str) -> &'a ElementNode {
        snapshot
            .elements
            .iter()
            .find(|node| node.tag == tag)
            .expect("element present")
    }

    #[test]
    fn label_scores_follow_match_quality() {
        let intent = Intent::new("login button", "login", None);
        assert_eq!(label_score("Login", &intent), 1.0);
        assert_eq!(label_score("Sign in", &intent), 0.9);
        assert_eq!(label_score("Login now", &intent), 0.8);
        assert_eq!(label_score("Please sign in here", &intent), 0.7);
        assert_eq!(label_score("Register", &intent), 0.0);
    }

    #[test]
    fn attributes_count_slightly_less_than_labels() {
        let snap = snapshot(r#"<input name="password" type="password">"#);
        let intent = Intent::new("password field", "login", None);
        let score = element_match_score(find(&snap, "input"), &intent);
        assert!((score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn dynamic_ids_are_detected() {
        assert!(is_dynamic_id("ext-gen1234"));
        assert!(is_dynamic_id("j_id0:form:save"));
        assert!(is_dynamic_id("input-20491"));
        assert!(!is_dynamic_id("saveButton"));
    }

    #[test]
    fn locators_prefer_stable_ids_and_stay_unique() {
        let snap = snapshot(
            r#"<body><form>
                <button id="ext-gen123">Save</button>
                <button id="cancelBtn">Cancel</button>
            </form></body>"#,
        );
        let save = snap
            .elements
            .iter()
            .find(|node| node.text == "Save")
            .unwrap();
        let cancel = snap
            .elements
            .iter()
            .find(|node| node.text == "Cancel")
            .unwrap();

        assert_eq!(locator_for(&snap, cancel).locator, "#cancelBtn");
        let save_locator = locator_for(&snap, save);
        assert_eq!(save_locator.basis, LocatorBasis::Text);
        assert_eq!(snap.query(&save_locator.locator).unwrap(), vec![save.index]);
    }

    #[test]
    fn structural_path_resolves_to_the_element() {
        let snap = snapshot("<body><div><span>a</span><span>b</span></div></body>");
        let second = snap
            .elements
            .iter()
            .find(|node| node.text == "b")
            .unwrap();
        let path = structural_path(&snap, second);
        assert_eq!(snap.query(&path).unwrap(), vec![second.index]);
    }

    #[test]
    fn kinds_accept_roles_and_native_tags() {
        let snap = snapshot(r#"<div role="button">Go</div><input type="submit" value="Go">"#);
        let div = find(&snap, "div");
        let input = find(&snap, "input");
        assert!(kind_matches(div, ElementKind::Button));
        assert!(kind_matches(input, ElementKind::Button));
        assert!(!kind_matches(input, ElementKind::Input));
    }
}
