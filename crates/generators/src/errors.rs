//! Error types for strategy generators

use helix_core_types::{CollaboratorError, GeneratorType, SnapshotError};
use thiserror::Error;

/// Generator error enumeration
///
/// Generator errors never escape a tier: the scheduler logs them and treats
/// the generator as having produced nothing.
#[derive(Debug, Error, Clone)]
pub enum GeneratorError {
    /// External collaborator call failed
    #[error("{generator} collaborator failed: {source}")]
    Collaborator {
        generator: GeneratorType,
        #[source]
        source: CollaboratorError,
    },

    /// Snapshot could not be evaluated
    #[error("{generator} snapshot error: {source}")]
    Snapshot {
        generator: GeneratorType,
        #[source]
        source: SnapshotError,
    },

    /// Intent cannot be handled by this generator
    #[error("{generator} rejected intent: {reason}")]
    InvalidIntent {
        generator: GeneratorType,
        reason: String,
    },

    /// Generator exceeded its soft deadline
    #[error("{0} exceeded its soft deadline")]
    Timeout(GeneratorType),

    /// Generator was cancelled before completing
    #[error("{0} cancelled")]
    Cancelled(GeneratorType),
}

impl GeneratorError {
    pub fn collaborator(generator: GeneratorType, source: CollaboratorError) -> Self {
        GeneratorError::Collaborator { generator, source }
    }

    pub fn generator(&self) -> GeneratorType {
        match self {
            GeneratorError::Collaborator { generator, .. }
            | GeneratorError::Snapshot { generator, .. }
            | GeneratorError::InvalidIntent { generator, .. } => *generator,
            GeneratorError::Timeout(generator) | GeneratorError::Cancelled(generator) => *generator,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            GeneratorError::Timeout(_) => true,
            GeneratorError::Collaborator { source, .. } => source.is_infrastructure(),
            _ => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high)
    pub fn severity(&self) -> u8 {
        match self {
            GeneratorError::Collaborator { .. } | GeneratorError::Snapshot { .. } => 2,
            GeneratorError::Timeout(_) => 1,
            _ => 0,
        }
    }
}
