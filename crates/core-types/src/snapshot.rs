//! Flattened document snapshots and locator evaluation against them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },
}

/// Parsed form of a locator expression.
#[derive(Clone, Debug, PartialEq)]
pub enum LocatorExpr {
    /// Plain CSS selector.
    Css(String),
    /// `text=<label>`: innermost element whose text equals the label.
    Text(String),
    /// `visual:click(x,y)`: screen coordinates.
    Visual { x: i64, y: i64 },
    /// `pierce/<css>`: CSS evaluated across shadow roots. Snapshots carry
    /// shadow content inline, so the selector applies to the flat tree.
    Pierce(String),
}

impl LocatorExpr {
    pub fn parse(locator: &str) -> Result<Self, SnapshotError> {
        let trimmed = locator.trim();
        if trimmed.is_empty() {
            return Err(invalid(locator, "empty locator"));
        }
        if let Some(label) = trimmed.strip_prefix("text=") {
            let label = label.trim().trim_matches('"').trim_matches('\'');
            if label.is_empty() {
                return Err(invalid(locator, "empty text label"));
            }
            return Ok(LocatorExpr::Text(label.to_string()));
        }
        if let Some(css) = trimmed.strip_prefix("pierce/") {
            let css = css.trim();
            if css.is_empty() {
                return Err(invalid(locator, "empty pierce selector"));
            }
            Selector::parse(css).map_err(|err| invalid(locator, &format!("{err:?}")))?;
            return Ok(LocatorExpr::Pierce(css.to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("visual:click(") {
            let coords = rest
                .strip_suffix(')')
                .ok_or_else(|| invalid(locator, "unterminated coordinates"))?;
            let mut parts = coords.split(',').map(|part| part.trim().parse::<i64>());
            return match (parts.next(), parts.next(), parts.next()) {
                (Some(Ok(x)), Some(Ok(y)), None) => Ok(LocatorExpr::Visual { x, y }),
                _ => Err(invalid(locator, "coordinates must be two integers")),
            };
        }
        Selector::parse(trimmed).map_err(|err| invalid(locator, &format!("{err:?}")))?;
        Ok(LocatorExpr::Css(trimmed.to_string()))
    }

    pub fn visual(x: i64, y: i64) -> String {
        format!("visual:click({x},{y})")
    }

    pub fn text(label: &str) -> String {
        format!("text={}", collapse_whitespace(label))
    }

    pub fn pierce(css: &str) -> String {
        format!("pierce/{css}")
    }
}

fn invalid(locator: &str, reason: &str) -> SnapshotError {
    SnapshotError::InvalidLocator {
        locator: locator.to_string(),
        reason: reason.to_string(),
    }
}

/// One element of the document, in document order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub index: usize,
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    /// Whitespace-collapsed text content, including descendants.
    pub text: String,
    pub parent: Option<usize>,
    pub depth: usize,
}

impl ElementNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn role(&self) -> Option<&str> {
        self.attr("role")
    }

    pub fn input_type(&self) -> Option<&str> {
        if self.tag == "input" {
            Some(self.attr("type").unwrap_or("text"))
        } else {
            None
        }
    }

    /// Human-visible label: text, button value, or accessible attributes.
    pub fn label(&self) -> Option<&str> {
        if !self.text.is_empty() {
            return Some(&self.text);
        }
        if matches!(self.input_type(), Some("submit" | "button" | "reset")) {
            if let Some(value) = self.attr("value") {
                return Some(value);
            }
        }
        ["aria-label", "title", "placeholder", "alt"]
            .iter()
            .find_map(|name| self.attr(name))
    }

    pub fn is_interactive(&self) -> bool {
        match self.tag.as_str() {
            "button" | "select" | "textarea" => true,
            "a" => self.has_attr("href"),
            "input" => self.input_type() != Some("hidden"),
            _ => {
                self.has_attr("onclick")
                    || self.has_attr("tabindex")
                    || matches!(
                        self.role(),
                        Some(
                            "button"
                                | "link"
                                | "textbox"
                                | "searchbox"
                                | "combobox"
                                | "checkbox"
                                | "menuitem"
                                | "tab"
                                | "switch"
                        )
                    )
            }
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.has_attr("hidden")
            || self.attr("aria-hidden") == Some("true")
            || self.input_type() == Some("hidden")
            || self
                .attr("style")
                .map(|style| {
                    let style = style.replace(' ', "").to_ascii_lowercase();
                    style.contains("display:none") || style.contains("visibility:hidden")
                })
                .unwrap_or(false)
    }

    pub fn is_disabled(&self) -> bool {
        self.has_attr("disabled") || self.attr("aria-disabled") == Some("true")
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }
}

/// Immutable capture of a rendered document.
#[derive(Clone, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub id: String,
    pub html: String,
    pub elements: Vec<ElementNode>,
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
}

impl fmt::Debug for DocumentSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSnapshot")
            .field("id", &self.id)
            .field("elements", &self.elements.len())
            .field("has_screenshot", &self.screenshot.is_some())
            .finish()
    }
}

impl DocumentSnapshot {
    pub fn from_html(id: impl Into<String>, html: impl Into<String>) -> Self {
        let html = html.into();
        let document = Html::parse_document(&html);
        let ordered: Vec<ElementRef<'_>> = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .collect();
        let positions: HashMap<_, usize> = ordered
            .iter()
            .enumerate()
            .map(|(index, element)| (element.id(), index))
            .collect();
        let mut elements: Vec<ElementNode> = Vec::with_capacity(ordered.len());

        for (index, element) in ordered.iter().enumerate() {
            let parent = element
                .parent()
                .and_then(ElementRef::wrap)
                .and_then(|parent| positions.get(&parent.id()).copied());
            let depth = parent
                .map(|idx: usize| elements[idx].depth + 1)
                .unwrap_or(0);
            elements.push(ElementNode {
                index,
                tag: element.value().name().to_ascii_lowercase(),
                attributes: element
                    .value()
                    .attrs()
                    .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
                    .collect(),
                text: collapse_whitespace(&element.text().collect::<Vec<_>>().join(" ")),
                parent,
                depth,
            });
        }

        Self {
            id: id.into(),
            html,
            elements,
            screenshot: None,
        }
    }

    pub fn with_screenshot(mut self, screenshot: Vec<u8>) -> Self {
        self.screenshot = Some(screenshot);
        self
    }

    pub fn element(&self, index: usize) -> Option<&ElementNode> {
        self.elements.get(index)
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = &ElementNode> {
        self.elements
            .iter()
            .filter(move |node| node.parent == Some(index))
    }

    pub fn ancestors(&self, index: usize) -> Ancestors<'_> {
        Ancestors {
            snapshot: self,
            next: self.element(index).and_then(|node| node.parent),
        }
    }

    /// Elements in document order, skipping document scaffolding.
    pub fn body_elements(&self) -> impl Iterator<Item = &ElementNode> {
        self.elements.iter().filter(|node| {
            !matches!(
                node.tag.as_str(),
                "html" | "head" | "body" | "script" | "style" | "meta" | "link" | "title"
            )
        })
    }

    /// Indices of the elements the locator resolves to. Visual locators
    /// cannot be evaluated against markup and resolve to nothing.
    pub fn query(&self, locator: &str) -> Result<Vec<usize>, SnapshotError> {
        match LocatorExpr::parse(locator)? {
            LocatorExpr::Css(selector) | LocatorExpr::Pierce(selector) => {
                self.query_css(&selector, locator)
            }
            LocatorExpr::Text(label) => Ok(self.query_text(&label)),
            LocatorExpr::Visual { .. } => Ok(Vec::new()),
        }
    }

    fn query_css(&self, selector: &str, locator: &str) -> Result<Vec<usize>, SnapshotError> {
        let selector =
            Selector::parse(selector).map_err(|err| invalid(locator, &format!("{err:?}")))?;
        let document = Html::parse_document(&self.html);
        let positions: HashMap<_, usize> = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .enumerate()
            .map(|(index, element)| (element.id(), index))
            .collect();
        Ok(document
            .select(&selector)
            .filter_map(|element| positions.get(&element.id()).copied())
            .collect())
    }

    fn query_text(&self, label: &str) -> Vec<usize> {
        let wanted = collapse_whitespace(label).to_lowercase();
        let matches: Vec<usize> = self
            .body_elements()
            .filter(|node| node.text.to_lowercase() == wanted)
            .map(|node| node.index)
            .collect();
        // keep the innermost match of every nested chain
        matches
            .iter()
            .copied()
            .filter(|candidate| {
                !matches.iter().any(|other| {
                    other != candidate && self.ancestors(*other).any(|a| a.index == *candidate)
                })
            })
            .collect()
    }
}

pub struct Ancestors<'a> {
    snapshot: &'a DocumentSnapshot,
    next: Option<usize>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ElementNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.snapshot.element(self.next?)?;
        self.next = node.parent;
        Some(node)
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
