//! Caller-visible result of one send request

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::AttemptResult;

/// Terminal state of a send request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// A provider accepted the message
    Delivered,
    /// Every primary attempt and the fallback attempt were rejected
    Failed,
    /// The caller cancelled the request before it reached another terminal state
    Cancelled,
}

/// Which tier of the policy an attempt belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptTier {
    Primary,
    Fallback,
}

/// Diagnostic record of a single attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-indexed position of this attempt within the request
    pub number: u32,
    pub provider: String,
    pub tier: AttemptTier,
    /// `None` when the attempt was abandoned by cancellation
    pub result: Option<AttemptResult>,
    /// Backoff waited before this attempt started, if any
    pub backoff_before: Option<Duration>,
}

/// Outcome of one send request.
///
/// Attempt counts and the history are diagnostic metadata; callers rendering
/// an outcome for end users should rely on [`DeliveryOutcome::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    /// Provider invocations started, including the fallback attempt
    pub attempts_made: u32,
    /// Provider in use when the request reached its terminal state.
    ///
    /// A request cancelled before its fallback attempt started reports the
    /// primary here, with `used_fallback` false.
    pub provider_used: String,
    pub used_fallback: bool,
    pub history: Vec<AttemptRecord>,
}

impl DeliveryOutcome {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered)
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.status, DeliveryStatus::Cancelled)
    }

    /// Number of attempts made against the primary provider.
    #[must_use]
    pub fn primary_attempts(&self) -> usize {
        self.history
            .iter()
            .filter(|record| record.tier == AttemptTier::Primary)
            .count()
    }

    /// Sum of backoff waits taken during the request.
    #[must_use]
    pub fn total_backoff(&self) -> Duration {
        self.history
            .iter()
            .filter_map(|record| record.backoff_before)
            .sum()
    }
}
