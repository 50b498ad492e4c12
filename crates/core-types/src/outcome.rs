use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RequestId, Strategy};

/// Append-only audit record of one resolution request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub request_id: RequestId,
    pub chosen_strategy: Option<Strategy>,
    pub success: bool,
    pub latency_ms: u64,
    pub healing_attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

impl ResolutionOutcome {
    pub fn new(
        request_id: RequestId,
        chosen_strategy: Option<Strategy>,
        success: bool,
        latency_ms: u64,
        healing_attempts: u32,
    ) -> Self {
        Self {
            request_id,
            chosen_strategy,
            success,
            latency_ms,
            healing_attempts,
            recorded_at: Utc::now(),
        }
    }
}
