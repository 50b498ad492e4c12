//! Helix locator engine
//!
//! Turns natural-language UI intents ("login button") into validated element
//! locators. Cached strategies are tried first, then the tiered generator
//! cascade, then healing. Outcomes feed the per-platform weight table and the
//! strategy cache so later requests get cheaper.

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod errors;
pub mod observe;

pub use checkpoint::{CheckpointStats, Checkpointer, LearningState};
pub use config::{load_config, HelixConfig, LoggingConfig, StorageConfig, CONFIG_ENV};
pub use engine::{LocatorEngine, ResolveRequest, ResolveResponse};
pub use errors::HelixError;
pub use observe::init_tracing;

pub use action_locator::{
    AttemptSource, FailureReason, FeedbackReceipt, LocatorError, ValidationAttempt,
};
pub use helix_core_types::{
    BoundingBox, CollaboratorError, DocumentSnapshot, GeneratorType, LanguageUnderstanding,
    PerformanceTier, PlatformId, RenderingContext, RequestId, ResolutionOutcome, Strategy,
    ValidationReport, VisionService,
};
pub use helix_generators::{Collaborators, GeneratorRegistry};
