//! Confidence fusion for the Helix locator engine.
//!
//! Candidates from every generator are rescored with learned
//! per-(platform, generator) weights and an agreement bonus; the weights
//! themselves are adjusted by bounded multiplicative feedback.

pub mod fuse;
pub mod weights;

pub use fuse::{ConfidenceFusion, FusionConfig};
pub use weights::{WeightConfig, WeightRecord, WeightTable, DEFAULT_WEIGHT};
