use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("resolution cancelled by caller")]
    Cancelled,
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulerError::Cancelled)
    }

    pub fn severity(&self) -> u8 {
        match self {
            SchedulerError::Cancelled => 0,
            SchedulerError::InvalidConfig(_) => 2,
        }
    }
}
