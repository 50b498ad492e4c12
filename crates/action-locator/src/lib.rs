//! Validation, self-healing and feedback for locator resolution
//!
//! This crate turns a ranked tier resolution into one validated answer:
//! - live validation of candidates through the rendering collaborator
//! - a bounded healing state machine (paraphrase, alternate platform,
//!   visual fallback)
//! - feedback into learned weights and the strategy cache, idempotent per key
//! - an append-only outcome log

pub mod errors;
pub mod feedback;
pub mod healer;
pub mod idempotency;
pub mod outcome_log;
pub mod types;
pub mod validator;

pub use errors::*;
pub use feedback::*;
pub use healer::*;
pub use idempotency::*;
pub use outcome_log::*;
pub use types::*;
pub use validator::*;
