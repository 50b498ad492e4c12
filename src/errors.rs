//! Top-level error type of the engine facade.

use std::io;

use action_locator::LocatorError;
use helix_scheduler::SchedulerError;
use helix_strategy_cache::CacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelixError {
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[source] io::Error),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("state storage failed: {0}")]
    Storage(#[from] io::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Locator(#[from] LocatorError),
}

impl HelixError {
    pub fn is_retryable(&self) -> bool {
        match self {
            HelixError::Storage(_) => true,
            HelixError::Cache(err) => err.is_retryable(),
            HelixError::Locator(err) => err.is_retryable(),
            HelixError::Scheduler(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// 0=low, 1=medium, 2=high, 3=critical
    pub fn severity(&self) -> u8 {
        match self {
            HelixError::ConfigIo(_) | HelixError::ConfigParse(_) | HelixError::InvalidConfig(_) => 3,
            HelixError::Storage(_) => 2,
            HelixError::Cache(err) => err.severity(),
            HelixError::Scheduler(err) => err.severity(),
            HelixError::Locator(err) => err.severity(),
        }
    }
}
