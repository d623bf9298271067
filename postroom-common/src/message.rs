use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;

static GENERATOR: LazyLock<Mutex<ulid::Generator>> =
    LazyLock::new(|| Mutex::new(ulid::Generator::new()));

/// Identifier for a queued message.
///
/// This is a globally unique identifier (ULID) that serves as both the message
/// id and the filename stem for durably stored records. ULIDs are
/// lexicographically sortable by creation time and collision-resistant, so
/// sorting by id is sorting by creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    id: ulid::Ulid,
}

impl MessageId {
    /// Parse a message id from a record filename like `01ARYZ6S41….bin`.
    ///
    /// Validates that the filename is a valid ULID to prevent path traversal.
    ///
    /// # Security
    /// This function explicitly rejects:
    /// - Path separators (/ and \)
    /// - Directory traversal patterns (..)
    /// - Invalid ULID format
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        let stem = filename.strip_suffix(".bin")?;
        let id = ulid::Ulid::from_string(stem).ok()?;

        Some(Self { id })
    }

    /// Create a message id from an existing ULID.
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    /// Generate a new unique message id.
    ///
    /// Generation is monotonic within the process, so ids created in the
    /// same millisecond still sort in creation order.
    #[must_use]
    pub fn generate() -> Self {
        let id = GENERATOR
            .lock()
            .generate()
            .unwrap_or_else(|_| ulid::Ulid::new());

        Self { id }
    }

    /// Get the underlying ULID.
    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }

    /// Get the timestamp (milliseconds since Unix epoch) encoded in this id.
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.id.timestamp_ms()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl serde::Serialize for MessageId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

/// Delivery priority of a queued message.
///
/// `Now` is a synchronous-send hint: the message is dispatched at enqueue
/// time and never enters the dequeue path. The remaining ranks only order
/// messages within the queue.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Now,
}

impl Priority {
    /// Numeric rank used for descending priority ordering.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Now => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Now => "now",
        })
    }
}

/// Delivery state of a message.
///
/// `Queued` messages are picked up by workers, transitioning through
/// `Sending` while a worker holds the claim. `Sent` and `Failed` are
/// terminal: nothing in the queue engine transitions out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Queued,
    Sending,
    Sent,
    Failed,
}

impl Status {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        })
    }
}

/// A file attached to a message, stored inline with its record and deleted
/// with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mimetype: String,
    pub content: Vec<u8>,
}

/// Validation errors raised before a message is accepted into the queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("A message requires at least one recipient")]
    NoRecipients,

    #[error("The scheduled time may not be later than the expiry time")]
    ScheduledAfterExpiry,
}

/// A single outbound message record.
///
/// Content is resolved before enqueue; the queue engine treats it as opaque
/// and only reads the scheduling and bookkeeping fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,

    pub from: Address,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,

    pub subject: String,
    pub body: String,
    pub html_body: Option<String>,
    pub attachments: Vec<Attachment>,
    /// RFC 5322 Message-ID header value, generated at enqueue when enabled.
    pub message_id: Option<String>,

    /// Earliest eligible send time. Unset means immediately eligible.
    pub scheduled_time: Option<DateTime<Utc>>,
    /// The message will not be sent at or after this instant.
    pub expires_at: Option<DateTime<Utc>>,

    pub priority: Priority,
    pub status: Status,
    pub number_of_retries: u32,
    /// Which registered delivery backend to use. Empty selects the default.
    pub backend_alias: String,

    pub created: DateTime<Utc>,
    /// Set while a worker holds the claim on this message.
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a queued message with the given sender and recipients,
    /// everything else defaulted.
    #[must_use]
    pub fn new(from: Address, to: Vec<Address>, created: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::generate(),
            from,
            to,
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            body: String::new(),
            html_body: None,
            attachments: Vec::new(),
            message_id: None,
            scheduled_time: None,
            expires_at: None,
            priority: Priority::default(),
            status: Status::Queued,
            number_of_retries: 0,
            backend_alias: String::new(),
            created,
            claimed_at: None,
        }
    }

    /// Check the constraints enforced at enqueue time.
    ///
    /// # Errors
    /// If the message has no `to` recipients, or its scheduled time falls
    /// after its expiry time.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.to.is_empty() {
            return Err(MessageError::NoRecipients);
        }

        if let (Some(scheduled), Some(expires)) = (self.scheduled_time, self.expires_at)
            && scheduled > expires
        {
            return Err(MessageError::ScheduledAfterExpiry);
        }

        Ok(())
    }

    /// Whether this message may be picked up by a worker at `now`:
    /// queued, due, and not expired.
    #[must_use]
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == Status::Queued
            && self.scheduled_time.is_none_or(|scheduled| scheduled <= now)
            && self.expires_at.is_none_or(|expires| expires > now)
    }
}
