//! Configuration for the queue engine

use postroom_common::message::Priority;
use serde::Deserialize;

use crate::retry::RetryPolicy;

const fn default_batch_size() -> usize {
    100
}

const fn default_batch_timeout_secs() -> u64 {
    180 // 3 minutes
}

const fn default_reclaim_after_secs() -> u64 {
    360 // twice the default batch timeout
}

const fn default_poll_interval_secs() -> u64 {
    30
}

/// Ordering policy applied when selecting the next batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SendingOrder {
    /// Priority rank first (`now > high > medium > low`), creation order
    /// within a rank.
    #[default]
    PriorityFifo,
    /// Creation order only, priority ignored.
    Fifo,
}

/// Which delivery attempts get an attempt-log record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogPolicy {
    /// Record nothing.
    None,
    /// Record failed attempts only (including those that were requeued).
    FailuresOnly,
    /// Record every attempt.
    #[default]
    All,
}

impl LogPolicy {
    #[must_use]
    pub const fn should_log(self, failed: bool) -> bool {
        match self {
            Self::None => false,
            Self::FailuresOnly => failed,
            Self::All => true,
        }
    }
}

/// Configuration for one worker's queue engine.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Maximum messages claimed per processing run
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub sending_order: SendingOrder,

    #[serde(default)]
    pub log_policy: LogPolicy,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Wall-clock bound on draining one claimed batch (in seconds)
    ///
    /// Checked between sends; when exceeded, unattempted messages are
    /// released back to the queue and the run reports itself truncated.
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,

    /// Age after which a `sending` claim counts as orphaned (in seconds)
    ///
    /// A worker that dies mid-batch leaves its claims behind; the reclaim
    /// sweep releases any claim older than this back to the queue.
    #[serde(default = "default_reclaim_after_secs")]
    pub reclaim_after_secs: u64,

    /// How often the serve loop polls the store (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Priority assigned to messages that do not specify one
    #[serde(default)]
    pub default_priority: Priority,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            sending_order: SendingOrder::default(),
            log_policy: LogPolicy::default(),
            retry: RetryPolicy::default(),
            batch_timeout_secs: default_batch_timeout_secs(),
            reclaim_after_secs: default_reclaim_after_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            default_priority: Priority::default(),
        }
    }
}
