use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::MessageId;

/// The recorded result of a single delivery attempt.
///
/// Requeued attempts are recorded as `Failed` together with the error that
/// caused the requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Sent,
    Failed,
}

/// Immutable record of one delivery attempt.
///
/// Written by the attempt executor according to the configured log policy;
/// never mutated afterwards. Retention is left to external cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptLog {
    pub message_id: MessageId,
    pub recorded_at: DateTime<Utc>,
    pub status: AttemptStatus,
    pub error: Option<String>,
}

impl AttemptLog {
    #[must_use]
    pub const fn sent(message_id: MessageId, recorded_at: DateTime<Utc>) -> Self {
        Self {
            message_id,
            recorded_at,
            status: AttemptStatus::Sent,
            error: None,
        }
    }

    #[must_use]
    pub const fn failed(
        message_id: MessageId,
        recorded_at: DateTime<Utc>,
        error: String,
    ) -> Self {
        Self {
            message_id,
            recorded_at,
            status: AttemptStatus::Failed,
            error: Some(error),
        }
    }
}
