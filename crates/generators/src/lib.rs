//! Strategy generators for the Helix locator engine
//!
//! Nine heuristic generators, each turning an intent and a platform context
//! into candidate strategies, plus the Tier 0 pattern table that is consulted
//! before any generator runs.

pub mod accessibility;
pub mod behavioral;
pub mod contextual;
pub mod errors;
pub mod generator;
pub mod matching;
pub mod mutation;
pub mod patterns;
pub mod semantic;
pub mod state;
pub mod static_page;
pub mod structural;
pub mod timing;
pub mod visual;

pub use accessibility::AccessibilityGenerator;
pub use behavioral::BehavioralGenerator;
pub use contextual::ContextualGenerator;
pub use errors::GeneratorError;
pub use generator::{Collaborators, Generator, GeneratorRegistry};
pub use mutation::MutationGenerator;
pub use patterns::{PatternTable, PATTERN_SOURCE, UNIVERSAL_PATTERNS};
pub use semantic::SemanticGenerator;
pub use state::StateGenerator;
pub use static_page::StaticPage;
pub use structural::StructuralGenerator;
pub use timing::TimingGenerator;
pub use visual::VisualGenerator;
