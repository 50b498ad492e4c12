//! Accessibility generator: ARIA roles and accessible names.

use async_trait::async_trait;
use helix_core_types::{
    DocumentSnapshot, ElementKind, ElementNode, GeneratorType, Intent, PlatformContext, Provenance,
    Strategy,
};

use crate::errors::GeneratorError;
use crate::generator::Generator;
use crate::matching::{
    css_string, effectively_hidden, label_score, locator_for, resolves_uniquely, scaled, MIN_MATCH,
};

/// Intent keywords that imply an ARIA role.
const ROLE_KEYWORDS: &[(&str, &[&str])] = &[
    ("search", &["searchbox", "search"]),
    ("menu", &["menu", "menubar", "menuitem", "navigation"]),
    ("navigation", &["navigation", "menubar"]),
    ("tab", &["tab"]),
    ("dialog", &["dialog", "alertdialog"]),
    ("checkbox", &["checkbox", "switch"]),
    ("toggle", &["switch", "checkbox"]),
    ("option", &["option", "menuitem"]),
    ("link", &["link"]),
    ("button", &["button"]),
    ("dropdown", &["combobox", "listbox"]),
    ("field", &["textbox", "searchbox", "combobox"]),
];

/// Explicit role, or the implicit role of the native element.
pub fn effective_role(node: &ElementNode) -> Option<&str> {
    if let Some(role) = node.role() {
        return Some(role);
    }
    let role = match node.tag.as_str() {
        "button" => "button",
        "a" if node.has_attr("href") => "link",
        "select" => "combobox",
        "textarea" => "textbox",
        "nav" => "navigation",
        "dialog" => "dialog",
        "input" => match node.input_type() {
            Some("submit" | "button" | "reset" | "image") => "button",
            Some("checkbox") => "checkbox",
            Some("radio") => "radio",
            Some("search") => "searchbox",
            Some("hidden") => return None,
            _ => "textbox",
        },
        _ => return None,
    };
    Some(role)
}

/// Accessible name following the usual precedence: `aria-labelledby`,
/// `aria-label`, associated `<label>`, then content and `title`.
pub fn accessible_name(snapshot: &DocumentSnapshot, node: &ElementNode) -> Option<String> {
    if let Some(ids) = node.attr("aria-labelledby") {
        let name: Vec<&str> = ids
            .split_whitespace()
            .filter_map(|id| {
                snapshot
                    .elements
                    .iter()
                    .find(|candidate| candidate.attr("id") == Some(id))
            })
            .map(|label| label.text.as_str())
            .filter(|text| !text.is_empty())
            .collect();
        if !name.is_empty() {
            return Some(name.join(" "));
        }
    }
    if let Some(label) = node.attr("aria-label").filter(|label| !label.trim().is_empty()) {
        return Some(label.trim().to_string());
    }
    if let Some(id) = node.attr("id") {
        let explicit = snapshot
            .elements
            .iter()
            .find(|candidate| candidate.tag == "label" && candidate.attr("for") == Some(id));
        if let Some(label) = explicit.filter(|label| !label.text.is_empty()) {
            return Some(label.text.clone());
        }
    }
    if let Some(wrapping) = snapshot.ancestors(node.index).find(|a| a.tag == "label") {
        if !wrapping.text.is_empty() {
            return Some(wrapping.text.clone());
        }
    }
    node.label().map(str::to_string)
}

/// Glyph names that stand for a control's action.
const ICON_SYNONYMS: &[(&str, &str)] = &[
    ("floppy", "save"),
    ("disk", "save"),
    ("pencil", "edit"),
    ("trash", "delete"),
    ("bin", "delete"),
    ("times", "close"),
    ("x", "close"),
    ("plus", "add"),
    ("cog", "settings"),
    ("gear", "settings"),
    ("magnifier", "search"),
    ("bars", "menu"),
    ("hamburger", "menu"),
    ("house", "home"),
];

/// Icon-library prefixes and sizing words that carry no meaning.
const ICON_NOISE: &[&str] = &[
    "fa", "fas", "far", "fab", "o", "alt", "solid", "icon", "icons", "ico", "glyphicon", "bi",
    "material", "utility", "action", "standard", "slds", "button", "svg", "sm", "lg", "small",
    "large",
];

fn is_icon_element(node: &ElementNode) -> bool {
    matches!(node.tag.as_str(), "svg" | "use" | "img" | "i" | "span" | "lightning-icon")
}

/// Name implied by the icon a nameless control renders, e.g. `fa-floppy-o`,
/// `icon-name="utility:save"` or `<use href="...#delete">`.
pub fn icon_name(snapshot: &DocumentSnapshot, node: &ElementNode) -> Option<String> {
    let mut raw: Vec<String> = node.classes().map(str::to_string).collect();
    for inner in snapshot
        .elements
        .iter()
        .skip(node.index + 1)
        .take_while(|inner| inner.depth > node.depth)
        .filter(|inner| is_icon_element(inner))
    {
        raw.extend(inner.classes().map(str::to_string));
        if let Some(name) = inner.attr("icon-name") {
            raw.push(name.to_string());
        }
        for key in ["href", "xlink:href"] {
            if let Some(fragment) = inner.attr(key).and_then(|href| href.rsplit_once('#')) {
                raw.push(fragment.1.to_string());
            }
        }
        if inner.classes().any(|class| class.starts_with("material-icons")) {
            raw.push(inner.text.clone());
        }
    }

    let mut words: Vec<&str> = Vec::new();
    for word in raw
        .iter()
        .flat_map(|chunk| chunk.split(|c: char| !c.is_ascii_alphanumeric()))
        .filter(|word| !word.is_empty())
    {
        let word = ICON_SYNONYMS
            .iter()
            .find(|(glyph, _)| word.eq_ignore_ascii_case(glyph))
            .map_or(word, |(_, meaning)| *meaning);
        let noise = ICON_NOISE.iter().any(|noise| word.eq_ignore_ascii_case(noise));
        if !noise && !words.contains(&word) {
            words.push(word);
        }
    }
    (!words.is_empty()).then(|| words.join(" "))
}

fn expected_roles(intent: &Intent) -> Vec<&'static str> {
    let mut roles: Vec<&'static str> = intent.element_kind().roles().to_vec();
    for token in &intent.normalized_tokens {
        if let Some((_, mapped)) = ROLE_KEYWORDS.iter().find(|(keyword, _)| *keyword == token.as_str()) {
            for role in mapped.iter() {
                if !roles.contains(role) {
                    roles.push(*role);
                }
            }
        }
    }
    roles
}

/// Glyph-derived names are guesses; they start below spoken names.
const ICON_FLOOR: f64 = 0.4;

pub struct AccessibilityGenerator;

impl AccessibilityGenerator {
    fn locator(&self, snapshot: &DocumentSnapshot, node: &ElementNode) -> (String, &'static str) {
        if let Some(label) = node.attr("aria-label").filter(|label| !label.is_empty()) {
            let locator = format!("[aria-label={}]", css_string(label));
            if resolves_uniquely(snapshot, &locator, node.index) {
                return (locator, "aria_label");
            }
        }
        if let Some(role) = node.role() {
            let locator = format!("[role={}]", css_string(role));
            if resolves_uniquely(snapshot, &locator, node.index) {
                return (locator, "role");
            }
        }
        let candidate = locator_for(snapshot, node);
        (candidate.locator, candidate.basis.name())
    }
}

#[async_trait]
impl Generator for AccessibilityGenerator {
    async fn generate(
        &self,
        intent: &Intent,
        context: &PlatformContext,
    ) -> Result<Vec<Strategy>, GeneratorError> {
        let snapshot = &context.snapshot;
        let roles = expected_roles(intent);
        let any_kind = intent.element_kind() == ElementKind::Any;

        let mut strategies = Vec::new();
        for node in snapshot.body_elements() {
            let Some(role) = effective_role(node) else {
                continue;
            };
            if effectively_hidden(snapshot, node) {
                continue;
            }
            let role_fit = if roles.iter().any(|expected| *expected == role) {
                1.0
            } else if any_kind || roles.is_empty() {
                0.85
            } else {
                continue;
            };
            let (name, source, floor) = match accessible_name(snapshot, node) {
                Some(name) => (name, "accessible_name", 0.5),
                None => match icon_name(snapshot, node) {
                    Some(name) => (name, "icon_glyph", ICON_FLOOR),
                    None => continue,
                },
            };
            let score = label_score(&name, intent);
            if score < MIN_MATCH {
                continue;
            }
            let (locator, basis) = self.locator(snapshot, node);
            strategies.push(Strategy::new(
                locator,
                GeneratorType::Accessibility,
                scaled(floor, 0.4, score) * role_fit,
                GeneratorType::Accessibility.tier(),
                Provenance::new(source)
                    .with_detail(format!("{role}/{basis}"))
                    .with_overlap(Provenance::node_key(&snapshot.id, node.index)),
            ));
        }
        Ok(strategies)
    }

    fn generator_type(&self) -> GeneratorType {
        GeneratorType::Accessibility
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;

    #[tokio::test]
    async fn aria_label_names_an_icon_button() {
        let page = r#"<div>
            <button aria-label="Search"><svg></svg></button>
            <button aria-label="Menu"><svg></svg></button>
        </div>"#;
        let intent = Intent::new("search button", "home", None);
        let strategies = AccessibilityGenerator
            .generate(&intent, &context(page))
            .await
            .unwrap();
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].locator, "[aria-label=\"Search\"]");
        assert!(strategies[0].raw_confidence > 0.85);
    }

    #[tokio::test]
    async fn nameless_icon_buttons_match_by_glyph() {
        let page = r#"<div class="toolbar">
            <button id="b1"><svg><use href="/icons/utility-sprite/svg/symbols.svg#save"></use></svg></button>
            <button id="b2"><i class="fa fa-trash"></i></button>
            <button id="b3"><span class="material-icons">home</span></button>
        </div>"#;
        let save = AccessibilityGenerator
            .generate(&Intent::new("save button", "record", None), &context(page))
            .await
            .unwrap();
        assert_eq!(save.len(), 1);
        assert_eq!(save[0].locator, "#b1");
        assert_eq!(save[0].provenance.source, "icon_glyph");
        assert!(save[0].raw_confidence < 0.9);

        let delete = AccessibilityGenerator
            .generate(&Intent::new("delete button", "record", None), &context(page))
            .await
            .unwrap();
        assert_eq!(delete.len(), 1);
        assert_eq!(delete[0].locator, "#b2");
    }

    #[test]
    fn icon_names_drop_library_prefixes() {
        let snapshot = DocumentSnapshot::from_html(
            "i",
            r#"<button><i class="fa fa-floppy-o"></i></button>
               <button><lightning-icon icon-name="utility:edit"></lightning-icon></button>
               <button>Plain</button>"#,
        );
        let names: Vec<Option<String>> = snapshot
            .body_elements()
            .filter(|node| node.tag == "button")
            .map(|node| icon_name(&snapshot, node))
            .collect();
        assert_eq!(
            names,
            vec![Some("save".to_string()), Some("edit".to_string()), None]
        );
    }

    #[tokio::test]
    async fn label_for_names_the_input() {
        let page = r#"<form>
            <label for="amt">Amount</label><input id="amt" type="text">
            <label for="cur">Currency</label><select id="cur"></select>
        </form>"#;
        let intent = Intent::new("amount field", "form", None);
        let strategies = AccessibilityGenerator
            .generate(&intent, &context(page))
            .await
            .unwrap();
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].locator, "#amt");
        assert_eq!(
            strategies[0].provenance.detail.as_deref(),
            Some("textbox/id")
        );
    }

    #[test]
    fn implicit_roles_follow_native_semantics() {
        let snapshot = DocumentSnapshot::from_html(
            "r",
            r#"<a href="/x">x</a><input type="checkbox"><input type="hidden">"#,
        );
        let roles: Vec<Option<&str>> = snapshot
            .body_elements()
            .map(effective_role)
            .collect();
        assert_eq!(roles, vec![Some("link"), Some("checkbox"), None]);
    }
}
