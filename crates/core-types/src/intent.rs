//! Human-phrased intents and their normalized form.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::PlatformId;

/// Words that carry no targeting information.
const FILLER_WORDS: &[&str] = &["the", "a", "an", "on", "click", "press", "tap", "to"];

static WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").expect("static word regex"));

/// A group of interchangeable phrases describing the same UI concept.
#[derive(Debug)]
pub struct Concept {
    pub canonical: &'static str,
    pub phrases: &'static [&'static str],
}

pub const CONCEPTS: &[Concept] = &[
    Concept {
        canonical: "login",
        phrases: &["login", "log in", "sign in", "signin", "logon"],
    },
    Concept {
        canonical: "logout",
        phrases: &["logout", "log out", "sign out", "signout"],
    },
    Concept {
        canonical: "save",
        phrases: &["save", "submit", "apply", "send"],
    },
    Concept {
        canonical: "cancel",
        phrases: &["cancel", "close", "dismiss", "abort"],
    },
    Concept {
        canonical: "next",
        phrases: &["next", "continue", "proceed", "forward"],
    },
    Concept {
        canonical: "back",
        phrases: &["back", "previous", "return"],
    },
    Concept {
        canonical: "search",
        phrases: &["search", "find", "query", "filter"],
    },
    Concept {
        canonical: "username",
        phrases: &["username", "user name", "user", "email"],
    },
    Concept {
        canonical: "password",
        phrases: &["password", "passcode", "pwd"],
    },
    Concept {
        canonical: "menu",
        phrases: &["menu", "navigation", "nav"],
    },
    Concept {
        canonical: "home",
        phrases: &["home", "dashboard"],
    },
    Concept {
        canonical: "new",
        phrases: &["new", "create", "add"],
    },
    Concept {
        canonical: "delete",
        phrases: &["delete", "remove"],
    },
    Concept {
        canonical: "edit",
        phrases: &["edit", "modify", "update"],
    },
];

/// Kind of control the intent names, if any.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Button,
    Input,
    Link,
    Select,
    Checkbox,
    Any,
}

impl ElementKind {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "button" | "btn" => Some(ElementKind::Button),
            "field" | "input" | "textbox" | "box" | "textarea" => Some(ElementKind::Input),
            "link" | "anchor" => Some(ElementKind::Link),
            "dropdown" | "select" | "combobox" | "picklist" => Some(ElementKind::Select),
            "checkbox" | "toggle" => Some(ElementKind::Checkbox),
            _ => None,
        }
    }

    /// Tags that natively implement the kind.
    pub fn tags(self) -> &'static [&'static str] {
        match self {
            ElementKind::Button => &["button", "input"],
            ElementKind::Input => &["input", "textarea"],
            ElementKind::Link => &["a"],
            ElementKind::Select => &["select"],
            ElementKind::Checkbox => &["input"],
            ElementKind::Any => &[],
        }
    }

    /// ARIA roles that implement the kind.
    pub fn roles(self) -> &'static [&'static str] {
        match self {
            ElementKind::Button => &["button"],
            ElementKind::Input => &["textbox", "searchbox"],
            ElementKind::Link => &["link"],
            ElementKind::Select => &["combobox", "listbox"],
            ElementKind::Checkbox => &["checkbox", "switch"],
            ElementKind::Any => &[],
        }
    }
}

/// Immutable, request-scoped description of the UI target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub raw_text: String,
    pub normalized_tokens: Vec<String>,
    pub page_type: String,
    pub platform_hint: Option<PlatformId>,
}

impl Intent {
    pub fn new(
        raw_text: impl Into<String>,
        page_type: impl Into<String>,
        platform_hint: Option<PlatformId>,
    ) -> Self {
        let raw_text = raw_text.into();
        let normalized_tokens = tokenize(&raw_text)
            .into_iter()
            .filter(|token| !FILLER_WORDS.contains(&token.as_str()))
            .collect();
        Self {
            raw_text,
            normalized_tokens,
            page_type: page_type.into().trim().to_ascii_lowercase(),
            platform_hint,
        }
    }

    pub fn normalized(&self) -> String {
        self.normalized_tokens.join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.normalized_tokens.is_empty()
    }

    /// Control kind named by the intent ("save button" -> `Button`).
    pub fn element_kind(&self) -> ElementKind {
        self.normalized_tokens
            .iter()
            .rev()
            .find_map(|token| ElementKind::from_token(token))
            .unwrap_or(ElementKind::Any)
    }

    /// Tokens that describe the target itself rather than its kind.
    pub fn target_terms(&self) -> Vec<&str> {
        self.normalized_tokens
            .iter()
            .map(String::as_str)
            .filter(|token| ElementKind::from_token(token).is_none())
            .collect()
    }

    pub fn target_phrase(&self) -> String {
        self.target_terms().join(" ")
    }

    /// Concepts mentioned by the intent, in table order.
    pub fn concepts(&self) -> Vec<&'static Concept> {
        let normalized = self.normalized();
        CONCEPTS
            .iter()
            .filter(|concept| {
                concept
                    .phrases
                    .iter()
                    .any(|phrase| contains_phrase(&normalized, phrase))
            })
            .collect()
    }

    /// Every phrase an element label may carry to match this intent.
    pub fn match_phrases(&self) -> Vec<String> {
        let mut phrases: Vec<String> = Vec::new();
        let target = self.target_phrase();
        if !target.is_empty() {
            phrases.push(target);
        }
        for concept in self.concepts() {
            for phrase in concept.phrases {
                if !phrases.iter().any(|existing| existing == phrase) {
                    phrases.push((*phrase).to_string());
                }
            }
        }
        phrases
    }

    /// Deterministic synonym rewrite. `variant` selects which alternative
    /// phrase replaces each recognised concept; `None` when nothing in the
    /// intent has a synonym.
    pub fn paraphrase(&self, variant: usize) -> Option<Intent> {
        let mut rewritten = self.normalized();
        let mut changed = false;
        for concept in self.concepts() {
            let Some(current) = concept
                .phrases
                .iter()
                .find(|phrase| contains_phrase(&rewritten, phrase))
            else {
                continue;
            };
            let alternatives: Vec<&&str> = concept
                .phrases
                .iter()
                .filter(|phrase| *phrase != current)
                .collect();
            if alternatives.is_empty() {
                continue;
            }
            let replacement = alternatives[variant % alternatives.len()];
            rewritten = replace_phrase(&rewritten, current, replacement);
            changed = true;
        }
        if !changed {
            return None;
        }
        Some(Intent::new(
            rewritten,
            self.page_type.clone(),
            self.platform_hint.clone(),
        ))
    }
}

/// Lowercase alphanumeric word split.
pub fn tokenize(text: &str) -> Vec<String> {
    WORDS
        .find_iter(&text.to_ascii_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Whole-word phrase containment over normalized text.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let haystack = tokenize(haystack);
    let needle = tokenize(phrase);
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle.as_slice())
}

fn replace_phrase(haystack: &str, from: &str, to: &str) -> String {
    let tokens = tokenize(haystack);
    let needle = tokenize(from);
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    let mut idx = 0;
    let mut replaced = false;
    while idx < tokens.len() {
        if !replaced
            && idx + needle.len() <= tokens.len()
            && tokens[idx..idx + needle.len()] == needle[..]
        {
            out.extend(tokenize(to));
            idx += needle.len();
            replaced = true;
        } else {
            out.push(tokens[idx].clone());
            idx += 1;
        }
    }
    out.join(" ")
}
