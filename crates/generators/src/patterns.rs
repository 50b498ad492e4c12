//! Tier 0 pattern table.
//!
//! A fixed bank of platform-independent selectors for the controls that
//! appear on nearly every enterprise application (sign-in forms, save and
//! cancel actions, search, navigation, plain form fields). The table is
//! evaluated synchronously against the snapshot; no generator is invoked.

use std::collections::HashMap;

use helix_core_types::{
    DocumentSnapshot, ElementKind, GeneratorType, Intent, PerformanceTier, Provenance, Strategy,
};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::matching::{effectively_hidden, element_match_score, kind_matches, locator_for, MIN_MATCH};

/// Source tag carried by every pattern-table strategy.
pub const PATTERN_SOURCE: &str = "pattern_table";

/// Patterns are reported as structural evidence found at the instant tier.
pub const PATTERN_GENERATOR: GeneratorType = GeneratorType::Structural;

/// Label agreement assumed for selectors that identify the control alone.
const INTRINSIC_MATCH: f64 = 0.7;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PatternCategory {
    Authentication,
    Actions,
    Search,
    Navigation,
    Forms,
}

impl PatternCategory {
    pub fn name(self) -> &'static str {
        match self {
            PatternCategory::Authentication => "authentication",
            PatternCategory::Actions => "actions",
            PatternCategory::Search => "search",
            PatternCategory::Navigation => "navigation",
            PatternCategory::Forms => "forms",
        }
    }
}

#[derive(Debug)]
pub struct PatternSelector {
    pub css: &'static str,
    /// The selector alone identifies the control; label agreement optional.
    pub intrinsic: bool,
}

const fn labelled(css: &'static str) -> PatternSelector {
    PatternSelector {
        css,
        intrinsic: false,
    }
}

const fn intrinsic(css: &'static str) -> PatternSelector {
    PatternSelector {
        css,
        intrinsic: true,
    }
}

#[derive(Debug)]
pub struct Pattern {
    pub name: &'static str,
    pub category: PatternCategory,
    /// Canonical concept that triggers the pattern; `None` for kind-only patterns.
    pub concept: Option<&'static str>,
    pub kind: ElementKind,
    pub base_confidence: f64,
    pub selectors: &'static [PatternSelector],
}

impl Pattern {
    fn applies_to(&self, intent: &Intent) -> bool {
        let intent_kind = intent.element_kind();
        let kind_ok = intent_kind == ElementKind::Any || intent_kind == self.kind;
        match self.concept {
            Some(concept) => {
                kind_ok
                    && intent
                        .concepts()
                        .iter()
                        .any(|candidate| candidate.canonical == concept)
            }
            None => intent_kind == self.kind && !intent.target_terms().is_empty(),
        }
    }
}

const BUTTONS: &[PatternSelector] = &[
    labelled("button[type=\"submit\"]"),
    labelled("input[type=\"submit\"]"),
    labelled("button"),
    labelled("input[type=\"button\"]"),
    labelled("[role=\"button\"]"),
];

const PATTERNS: &[Pattern] = &[
    Pattern {
        name: "login",
        category: PatternCategory::Authentication,
        concept: Some("login"),
        kind: ElementKind::Button,
        base_confidence: 0.85,
        selectors: BUTTONS,
    },
    Pattern {
        name: "logout",
        category: PatternCategory::Authentication,
        concept: Some("logout"),
        kind: ElementKind::Button,
        base_confidence: 0.80,
        selectors: BUTTONS,
    },
    Pattern {
        name: "username",
        category: PatternCategory::Authentication,
        concept: Some("username"),
        kind: ElementKind::Input,
        base_confidence: 0.90,
        selectors: &[
            intrinsic("input[autocomplete=\"username\"]"),
            labelled("input[type=\"email\"]"),
            labelled("input[type=\"text\"]"),
            labelled("input:not([type])"),
        ],
    },
    Pattern {
        name: "password",
        category: PatternCategory::Authentication,
        concept: Some("password"),
        kind: ElementKind::Input,
        base_confidence: 0.95,
        selectors: &[intrinsic("input[type=\"password\"]")],
    },
    Pattern {
        name: "save",
        category: PatternCategory::Actions,
        concept: Some("save"),
        kind: ElementKind::Button,
        base_confidence: 0.80,
        selectors: BUTTONS,
    },
    Pattern {
        name: "cancel",
        category: PatternCategory::Actions,
        concept: Some("cancel"),
        kind: ElementKind::Button,
        base_confidence: 0.75,
        selectors: BUTTONS,
    },
    Pattern {
        name: "continue",
        category: PatternCategory::Actions,
        concept: Some("next"),
        kind: ElementKind::Button,
        base_confidence: 0.75,
        selectors: BUTTONS,
    },
    Pattern {
        name: "search_field",
        category: PatternCategory::Search,
        concept: Some("search"),
        kind: ElementKind::Input,
        base_confidence: 0.85,
        selectors: &[
            intrinsic("input[type=\"search\"]"),
            intrinsic("[role=\"searchbox\"]"),
            labelled("input[type=\"text\"]"),
            labelled("input:not([type])"),
        ],
    },
    Pattern {
        name: "search_button",
        category: PatternCategory::Search,
        concept: Some("search"),
        kind: ElementKind::Button,
        base_confidence: 0.80,
        selectors: BUTTONS,
    },
    Pattern {
        name: "menu",
        category: PatternCategory::Navigation,
        concept: Some("menu"),
        kind: ElementKind::Button,
        base_confidence: 0.80,
        selectors: &[
            labelled("button[aria-haspopup]"),
            labelled("button[aria-expanded]"),
            labelled("[role=\"button\"]"),
            labelled("button"),
        ],
    },
    Pattern {
        name: "home",
        category: PatternCategory::Navigation,
        concept: Some("home"),
        kind: ElementKind::Link,
        base_confidence: 0.75,
        selectors: &[intrinsic("a[href=\"/\"]"), labelled("a[href]")],
    },
    Pattern {
        name: "input",
        category: PatternCategory::Forms,
        concept: None,
        kind: ElementKind::Input,
        base_confidence: 0.70,
        selectors: &[labelled("input"), labelled("textarea")],
    },
    Pattern {
        name: "dropdown",
        category: PatternCategory::Forms,
        concept: None,
        kind: ElementKind::Select,
        base_confidence: 0.75,
        selectors: &[labelled("select"), labelled("[role=\"combobox\"]")],
    },
];

/// The compiled universal pattern bank.
pub static UNIVERSAL_PATTERNS: Lazy<PatternTable> = Lazy::new(PatternTable::universal);

#[derive(Debug)]
pub struct PatternTable {
    patterns: &'static [Pattern],
}

impl PatternTable {
    pub fn universal() -> Self {
        Self { patterns: PATTERNS }
    }

    pub fn patterns(&self) -> &'static [Pattern] {
        self.patterns
    }

    /// Evaluate every applicable pattern against the snapshot.
    ///
    /// Confidence is `base * (0.8 + 0.3 * match)`, divided by the square root
    /// of the number of equally plausible elements a selector hits, capped at
    /// 0.99. At most one strategy is kept per element.
    pub fn evaluate(&self, intent: &Intent, snapshot: &DocumentSnapshot) -> Vec<Strategy> {
        let mut best: HashMap<usize, Strategy> = HashMap::new();

        for pattern in self.patterns.iter().filter(|p| p.applies_to(intent)) {
            for selector in pattern.selectors {
                let Ok(hits) = snapshot.query(selector.css) else {
                    debug!(selector = selector.css, "pattern selector rejected");
                    continue;
                };
                let plausible: Vec<(usize, f64)> = hits
                    .iter()
                    .filter_map(|index| snapshot.element(*index))
                    .filter(|node| kind_matches(node, pattern.kind))
                    .filter(|node| !effectively_hidden(snapshot, node))
                    .filter_map(|node| {
                        let mut score = element_match_score(node, intent);
                        if selector.intrinsic {
                            score = score.max(INTRINSIC_MATCH);
                        }
                        (score >= MIN_MATCH).then_some((node.index, score))
                    })
                    .collect();
                if plausible.is_empty() {
                    continue;
                }

                let ambiguity = (plausible.len() as f64).sqrt();
                for (index, score) in plausible {
                    let Some(node) = snapshot.element(index) else {
                        continue;
                    };
                    let confidence =
                        (pattern.base_confidence * (0.8 + 0.3 * score)).min(0.99) / ambiguity;
                    let locator = if hits.len() == 1 {
                        selector.css.to_string()
                    } else {
                        locator_for(snapshot, node).locator
                    };
                    let strategy = Strategy::new(
                        locator,
                        PATTERN_GENERATOR,
                        confidence,
                        PerformanceTier::Instant,
                        Provenance::new(PATTERN_SOURCE)
                            .with_detail(format!("{}/{}", pattern.category.name(), pattern.name))
                            .with_overlap(Provenance::node_key(&snapshot.id, index)),
                    );
                    match best.get(&index) {
                        Some(existing) if existing.raw_confidence >= strategy.raw_confidence => {}
                        _ => {
                            best.insert(index, strategy);
                        }
                    }
                }
            }
        }

        let mut strategies: Vec<Strategy> = best.into_values().collect();
        strategies.sort_by(helix_core_types::rank_order);
        strategies
    }
}
