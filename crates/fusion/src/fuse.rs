//! Confidence fusion.
//!
//! `fused = raw * weight(platform, generator) * agreement_bonus`, where the
//! bonus grows with the number of distinct generator types that proposed the
//! same element: `min(1 + step * (k - 1), max_bonus)`.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use helix_core_types::{clamp_unit, GeneratorType, PlatformId, Strategy};
use serde::{Deserialize, Serialize};

use crate::weights::WeightTable;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub agreement_step: f64,
    pub max_bonus: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            agreement_step: 0.1,
            max_bonus: 1.3,
        }
    }
}

impl FusionConfig {
    pub fn agreement_bonus(&self, agreeing_types: usize) -> f64 {
        let extra = agreeing_types.saturating_sub(1) as f64;
        (1.0 + self.agreement_step * extra).min(self.max_bonus).max(1.0)
    }
}

#[derive(Clone)]
pub struct ConfidenceFusion {
    config: FusionConfig,
    weights: Arc<WeightTable>,
}

impl ConfidenceFusion {
    pub fn new(config: FusionConfig, weights: Arc<WeightTable>) -> Self {
        Self { config, weights }
    }

    pub fn weights(&self) -> &Arc<WeightTable> {
        &self.weights
    }

    /// Rescore the union of candidates and return them ranked, best first.
    ///
    /// Duplicate `(locator, generator)` pairs collapse to the one with the
    /// highest raw confidence. Ties rank the cheaper tier first, then the
    /// more trusted generator, then generator name and locator text.
    pub fn fuse(&self, strategies: Vec<Strategy>, platform: &PlatformId) -> Vec<Strategy> {
        let mut unique = dedup(strategies);

        let agreement: Vec<usize> = unique
            .iter()
            .map(|strategy| {
                unique
                    .iter()
                    .filter(|other| strategy.overlaps(other))
                    .map(|other| other.generator)
                    .collect::<BTreeSet<GeneratorType>>()
                    .len()
            })
            .collect();

        let mut weight_of: HashMap<GeneratorType, f64> = HashMap::new();
        for (strategy, agreeing) in unique.iter_mut().zip(agreement) {
            let weight = *weight_of
                .entry(strategy.generator)
                .or_insert_with(|| self.weights.get(platform, strategy.generator));
            strategy.fused_confidence =
                clamp_unit(strategy.raw_confidence * weight * self.config.agreement_bonus(agreeing));
        }

        unique.sort_by(|a, b| {
            let weight = |s: &Strategy| weight_of.get(&s.generator).copied().unwrap_or(1.0);
            b.fused_confidence
                .partial_cmp(&a.fused_confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.tier.cmp(&b.tier))
                .then_with(|| {
                    weight(b)
                        .partial_cmp(&weight(a))
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.generator.name().cmp(b.generator.name()))
                .then_with(|| a.locator.cmp(&b.locator))
        });
        unique
    }
}

fn dedup(strategies: Vec<Strategy>) -> Vec<Strategy> {
    let mut kept: Vec<Strategy> = Vec::with_capacity(strategies.len());
    let mut position: HashMap<(String, GeneratorType), usize> = HashMap::new();
    for strategy in strategies {
        let key = (strategy.locator.clone(), strategy.generator);
        match position.get(&key) {
            Some(&idx) => {
                let existing = &kept[idx];
                let better = strategy.raw_confidence > existing.raw_confidence
                    || (strategy.raw_confidence == existing.raw_confidence
                        && strategy.tier < existing.tier);
                if better {
                    kept[idx] = strategy;
                }
            }
            None => {
                position.insert(key, kept.len());
                kept.push(strategy);
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::WeightConfig;
    use helix_core_types::{PerformanceTier, Provenance};

    fn fusion() -> ConfidenceFusion {
        ConfidenceFusion::new(
            FusionConfig::default(),
            Arc::new(WeightTable::new(WeightConfig::default())),
        )
    }

    fn strategy(locator: &str, generator: GeneratorType, raw: f64) -> Strategy {
        Strategy::new(
            locator,
            generator,
            raw,
            generator.tier(),
            Provenance::new("test"),
        )
    }

    #[test]
    fn agreement_bonus_is_capped() {
        let config = FusionConfig::default();
        assert_eq!(config.agreement_bonus(0), 1.0);
        assert_eq!(config.agreement_bonus(1), 1.0);
        assert!((config.agreement_bonus(3) - 1.2).abs() < 1e-12);
        assert_eq!(config.agreement_bonus(9), 1.3);
    }

    #[test]
    fn agreeing_generators_reinforce_each_other() {
        let fused = fusion().fuse(
            vec![
                strategy("#save", GeneratorType::Semantic, 0.6),
                strategy("#save", GeneratorType::Structural, 0.5),
                strategy("#other", GeneratorType::Accessibility, 0.6),
            ],
            &PlatformId::generic(),
        );
        let save = fused
            .iter()
            .find(|s| s.generator == GeneratorType::Semantic)
            .unwrap();
        assert!((save.fused_confidence - 0.66).abs() < 1e-12);
        assert_eq!(fused[0].locator, "#save");
    }

    #[test]
    fn overlap_keys_count_as_agreement() {
        let by_text = Strategy::new(
            "text=Save",
            GeneratorType::Behavioral,
            0.5,
            PerformanceTier::Medium,
            Provenance::new("t").with_overlap("s#7"),
        );
        let by_id = Strategy::new(
            "#save",
            GeneratorType::Timing,
            0.5,
            PerformanceTier::Medium,
            Provenance::new("t").with_overlap("s#7"),
        );
        let fused = fusion().fuse(vec![by_text, by_id], &PlatformId::generic());
        assert!(fused.iter().all(|s| (s.fused_confidence - 0.55).abs() < 1e-12));
    }

    #[test]
    fn duplicates_keep_the_highest_raw_confidence() {
        let fused = fusion().fuse(
            vec![
                strategy("#a", GeneratorType::State, 0.4),
                strategy("#a", GeneratorType::State, 0.7),
            ],
            &PlatformId::generic(),
        );
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].raw_confidence, 0.7);
    }

    #[test]
    fn learned_weights_scale_and_clamp() {
        let fusion = fusion();
        let platform = PlatformId::new("sap_fiori");
        fusion.weights().set(&platform, GeneratorType::Visual, 3.0);
        let fused = fusion.fuse(
            vec![strategy("visual:click(1,1)", GeneratorType::Visual, 0.5)],
            &platform,
        );
        assert_eq!(fused[0].fused_confidence, 1.0);
    }

    #[test]
    fn raising_an_input_never_lowers_its_fused_score() {
        let platform = PlatformId::generic();
        let low = fusion().fuse(vec![strategy("#x", GeneratorType::Contextual, 0.4)], &platform);
        let high = fusion().fuse(vec![strategy("#x", GeneratorType::Contextual, 0.5)], &platform);
        assert!(high[0].fused_confidence >= low[0].fused_confidence);

        let boosted = fusion();
        boosted.weights().reward(&platform, GeneratorType::Contextual);
        let weighted = boosted.fuse(vec![strategy("#x", GeneratorType::Contextual, 0.4)], &platform);
        assert!(weighted[0].fused_confidence >= low[0].fused_confidence);
    }

    #[test]
    fn raising_a_weight_never_drops_its_rank() {
        let platform = PlatformId::new("workday");
        let fusion = fusion();
        let candidates = || {
            vec![
                strategy("#semantic", GeneratorType::Semantic, 0.5),
                strategy("#structural", GeneratorType::Structural, 0.5),
                strategy("#behavioral", GeneratorType::Behavioral, 0.5),
                strategy("#timing", GeneratorType::Timing, 0.5),
                strategy("#mutation", GeneratorType::Mutation, 0.5),
            ]
        };
        let rank = |fused: &[Strategy]| {
            fused
                .iter()
                .position(|s| s.generator == GeneratorType::Timing)
                .unwrap()
        };

        fusion.weights().set(&platform, GeneratorType::Timing, 0.1);
        let mut previous = rank(&fusion.fuse(candidates(), &platform));
        assert_eq!(previous, 4);
        for step in [0.5, 0.99, 1.0, 1.01, 1.5] {
            fusion.weights().set(&platform, GeneratorType::Timing, step);
            let current = rank(&fusion.fuse(candidates(), &platform));
            assert!(current <= previous, "weight {step} moved rank {previous} -> {current}");
            previous = current;
        }
        for _ in 0..40 {
            fusion.weights().reward(&platform, GeneratorType::Timing);
            let current = rank(&fusion.fuse(candidates(), &platform));
            assert!(current <= previous);
            previous = current;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn equal_scores_rank_cheaper_tiers_then_trusted_generators() {
        let platform = PlatformId::generic();
        let fusion = fusion();
        fusion.weights().set(&platform, GeneratorType::Behavioral, 1.0);
        let fused = fusion.fuse(
            vec![
                strategy("#c", GeneratorType::Mutation, 0.5),
                strategy("#b", GeneratorType::Timing, 0.5),
                strategy("#a", GeneratorType::Behavioral, 0.5),
                strategy("#d", GeneratorType::Structural, 0.5),
            ],
            &platform,
        );
        let order: Vec<&str> = fused.iter().map(|s| s.locator.as_str()).collect();
        assert_eq!(order, vec!["#d", "#a", "#b", "#c"]);
    }
}
