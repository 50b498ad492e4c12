//! Candidate location strategies.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{GeneratorType, PerformanceTier};

/// Where a strategy came from and why it was proposed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Producing source (`pattern_table`, `aria_label`, `vision`, `cache`, ...).
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Lightweight identity of the targeted element. Two strategies with the
    /// same key point at the same element even when their locators differ.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlap_key: Option<String>,
}

impl Provenance {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            detail: None,
            overlap_key: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_overlap(mut self, key: impl Into<String>) -> Self {
        self.overlap_key = Some(key.into());
        self
    }

    /// Overlap key for a snapshot element.
    pub fn node_key(snapshot_id: &str, index: usize) -> String {
        format!("{snapshot_id}#{index}")
    }
}

/// A candidate answer to a resolution request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub locator: String,
    pub generator: GeneratorType,
    pub raw_confidence: f64,
    pub fused_confidence: f64,
    pub tier: PerformanceTier,
    pub provenance: Provenance,
}

impl Strategy {
    pub fn new(
        locator: impl Into<String>,
        generator: GeneratorType,
        raw_confidence: f64,
        tier: PerformanceTier,
        provenance: Provenance,
    ) -> Self {
        let raw_confidence = clamp_unit(raw_confidence);
        Self {
            locator: locator.into(),
            generator,
            raw_confidence,
            fused_confidence: raw_confidence,
            tier,
            provenance,
        }
    }

    /// De-duplication identity.
    pub fn dedup_key(&self) -> (&str, GeneratorType) {
        (self.locator.as_str(), self.generator)
    }

    /// Whether two strategies point at the same element.
    pub fn overlaps(&self, other: &Strategy) -> bool {
        if self.locator == other.locator {
            return true;
        }
        matches!(
            (&self.provenance.overlap_key, &other.provenance.overlap_key),
            (Some(a), Some(b)) if a == b
        )
    }

    pub fn summary(&self) -> StrategySummary {
        StrategySummary {
            locator: self.locator.clone(),
            generator: self.generator,
            fused_confidence: self.fused_confidence,
            tier: self.tier,
        }
    }
}

/// Caller-facing projection of a strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub locator: String,
    pub generator: GeneratorType,
    pub fused_confidence: f64,
    pub tier: PerformanceTier,
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Stable ranking order: fused confidence descending, cheaper tier first,
/// then generator name and locator so equal inputs always rank equally.
pub fn rank_order(a: &Strategy, b: &Strategy) -> Ordering {
    b.fused_confidence
        .partial_cmp(&a.fused_confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.tier.cmp(&b.tier))
        .then_with(|| a.generator.name().cmp(b.generator.name()))
        .then_with(|| a.locator.cmp(&b.locator))
}
