//! Retry policy for failed delivery attempts.
//!
//! The policy is a fixed interval: a requeued message becomes eligible
//! again exactly `retry_interval_secs` after the failed attempt. There is
//! no exponential backoff.

use chrono::{DateTime, TimeDelta, Utc};
use postroom_common::message::{Message, Status};
use serde::Deserialize;

use crate::executor::AttemptOutcome;

const fn default_max_retries() -> u32 {
    0
}

const fn default_retry_interval_secs() -> u64 {
    900 // 15 minutes
}

/// Where a settled message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Sent,
    Requeued,
    Failed,
}

/// Retry configuration and the per-message state machine driven by attempt
/// outcomes.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries before a transiently failing message
    /// fails terminally.
    ///
    /// Default: 0 (a transient failure fails the message immediately)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay before a requeued message becomes eligible again.
    ///
    /// Default: 900 seconds (15 minutes)
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_interval_secs: default_retry_interval_secs(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn retry_interval(&self) -> TimeDelta {
        TimeDelta::seconds(i64::try_from(self.retry_interval_secs).unwrap_or(i64::MAX))
    }

    /// Apply one attempt outcome to a claimed message.
    ///
    /// Every exit from `Sending` lands in exactly one of `Sent`, `Queued`,
    /// or `Failed`, and always clears the claim. A transient failure
    /// consumes a retry; once the count reaches `max_retries` the message
    /// fails terminally, so a queued message always has
    /// `number_of_retries < max_retries`.
    pub fn settle(
        &self,
        message: &mut Message,
        outcome: &AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Disposition {
        message.claimed_at = None;

        match outcome {
            AttemptOutcome::Delivered => {
                message.status = Status::Sent;
                Disposition::Sent
            }
            AttemptOutcome::TransientFailure(_) => {
                message.number_of_retries += 1;

                if message.number_of_retries < self.max_retries {
                    message.status = Status::Queued;
                    message.scheduled_time = Some(now + self.retry_interval());
                    Disposition::Requeued
                } else {
                    message.status = Status::Failed;
                    Disposition::Failed
                }
            }
            AttemptOutcome::PermanentFailure(_) => {
                message.status = Status::Failed;
                Disposition::Failed
            }
        }
    }
}
