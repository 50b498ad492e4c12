//! Error types for the locator pipeline

use helix_core_types::CollaboratorError;
use helix_scheduler::SchedulerError;
use helix_strategy_cache::CacheError;
use thiserror::Error;

/// Locator error enumeration
///
/// "Not found" and "healing exhausted" are not errors: they come back as
/// structured reports so callers can choose their own fallback.
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Rendering collaborator unreachable or failing at transport level
    #[error("rendering collaborator failed: {0}")]
    Infrastructure(CollaboratorError),

    /// Resolution was cancelled by the caller
    #[error("resolution cancelled")]
    Cancelled,

    /// Scheduler rejected the request
    #[error("scheduler error: {0}")]
    Scheduler(SchedulerError),

    /// Learning state could not be read or written
    #[error("cache error: {0}")]
    Cache(String),

    /// Outcome reported for a request this engine never served
    #[error("unknown request: {0}")]
    UnknownRequest(String),

    /// Request fields are out of range
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Outcome log could not be written
    #[error("outcome log error: {0}")]
    OutcomeLog(String),
}

impl From<SchedulerError> for LocatorError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Cancelled => LocatorError::Cancelled,
            other => LocatorError::Scheduler(other),
        }
    }
}

impl From<CacheError> for LocatorError {
    fn from(err: CacheError) -> Self {
        LocatorError::Cache(err.to_string())
    }
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::Infrastructure(err) => matches!(err, CollaboratorError::Transport(_)),
            LocatorError::Cancelled | LocatorError::OutcomeLog(_) => true,
            _ => false,
        }
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::Infrastructure(_) => 3,
            LocatorError::Scheduler(_) | LocatorError::Cache(_) => 2,
            LocatorError::OutcomeLog(_) | LocatorError::UnknownRequest(_) => 1,
            LocatorError::Cancelled | LocatorError::InvalidRequest(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_cancellation_maps_to_cancelled() {
        let err: LocatorError = SchedulerError::Cancelled.into();
        assert!(matches!(err, LocatorError::Cancelled));
        assert_eq!(err.severity(), 0);
    }

    #[test]
    fn transport_failures_are_retryable() {
        let transport = LocatorError::Infrastructure(CollaboratorError::Transport("reset".into()));
        let down = LocatorError::Infrastructure(CollaboratorError::Unreachable("gone".into()));
        assert!(transport.is_retryable());
        assert!(!down.is_retryable());
        assert_eq!(down.severity(), 3);
    }
}
