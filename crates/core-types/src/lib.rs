//! Shared primitives for the Helix locator engine.
//!
//! Everything request-scoped (intents, platform contexts, candidate
//! strategies) and the collaborator contracts the engine depends on live
//! here so that every other crate agrees on one vocabulary.

pub mod collaborators;
pub mod intent;
pub mod outcome;
pub mod snapshot;
pub mod strategy;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use collaborators::*;
pub use intent::*;
pub use outcome::*;
pub use snapshot::*;
pub use strategy::*;

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a target application family (`salesforce_lightning`, `workday`, ...).
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlatformId(pub String);

impl PlatformId {
    pub const GENERIC: &'static str = "generic";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_ascii_lowercase())
    }

    pub fn generic() -> Self {
        Self(Self::GENERIC.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cost class of a strategy source, scheduled progressively.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Instant,
    Fast,
    Medium,
    Expensive,
}

impl PerformanceTier {
    pub const ALL: [PerformanceTier; 4] = [
        PerformanceTier::Instant,
        PerformanceTier::Fast,
        PerformanceTier::Medium,
        PerformanceTier::Expensive,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PerformanceTier::Instant => "instant",
            PerformanceTier::Fast => "fast",
            PerformanceTier::Medium => "medium",
            PerformanceTier::Expensive => "expensive",
        }
    }

    pub fn index(self) -> usize {
        match self {
            PerformanceTier::Instant => 0,
            PerformanceTier::Fast => 1,
            PerformanceTier::Medium => 2,
            PerformanceTier::Expensive => 3,
        }
    }
}

impl fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The closed set of heuristic generator variants.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorType {
    Semantic,
    Contextual,
    Visual,
    Behavioral,
    Structural,
    Accessibility,
    Mutation,
    Timing,
    State,
}

impl GeneratorType {
    pub const ALL: [GeneratorType; 9] = [
        GeneratorType::Semantic,
        GeneratorType::Contextual,
        GeneratorType::Visual,
        GeneratorType::Behavioral,
        GeneratorType::Structural,
        GeneratorType::Accessibility,
        GeneratorType::Mutation,
        GeneratorType::Timing,
        GeneratorType::State,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GeneratorType::Semantic => "semantic",
            GeneratorType::Contextual => "contextual",
            GeneratorType::Visual => "visual",
            GeneratorType::Behavioral => "behavioral",
            GeneratorType::Structural => "structural",
            GeneratorType::Accessibility => "accessibility",
            GeneratorType::Mutation => "mutation",
            GeneratorType::Timing => "timing",
            GeneratorType::State => "state",
        }
    }

    /// Scheduling tier of the generator. Nothing maps to `Instant`: that tier
    /// is served by the pattern table without invoking any generator.
    pub fn tier(self) -> PerformanceTier {
        match self {
            GeneratorType::Semantic | GeneratorType::Accessibility | GeneratorType::Structural => {
                PerformanceTier::Fast
            }
            GeneratorType::Contextual
            | GeneratorType::Behavioral
            | GeneratorType::State
            | GeneratorType::Timing => PerformanceTier::Medium,
            GeneratorType::Visual | GeneratorType::Mutation => PerformanceTier::Expensive,
        }
    }

    pub fn in_tier(tier: PerformanceTier) -> Vec<GeneratorType> {
        Self::ALL
            .into_iter()
            .filter(|generator| generator.tier() == tier)
            .collect()
    }
}

impl fmt::Display for GeneratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
