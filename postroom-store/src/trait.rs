use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postroom_common::{
    attempt::AttemptLog,
    message::{Message, MessageId},
};

use crate::error::Result;

/// Durable storage contract for queued messages and their attempt logs.
///
/// The store is the single source of truth and the only coordination surface
/// between delivery workers: workers share no in-memory state, so the
/// atomicity of [`claim`](MessageStore::claim) is what guarantees that no two
/// workers ever process the same message.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Persist a new message record under its pre-generated id.
    async fn insert(&self, message: &Message) -> Result<()>;

    /// Read a message record regardless of its status.
    async fn read(&self, id: &MessageId) -> Result<Message>;

    /// All messages that are eligible at `now`: queued, due, and not expired.
    ///
    /// The returned records are a snapshot; callers must still [`claim`]
    /// each message before processing it.
    ///
    /// [`claim`]: MessageStore::claim
    async fn eligible(&self, now: DateTime<Utc>) -> Result<Vec<Message>>;

    /// Atomically transition a message from `Queued` to `Sending`,
    /// re-verifying eligibility at `now`.
    ///
    /// Returns `Ok(None)` when the message is already claimed by another
    /// worker or no longer eligible. Contention is an expected outcome of
    /// concurrent dequeue, not an error, and the caller must skip to its
    /// next candidate without waiting.
    async fn claim(&self, id: &MessageId, now: DateTime<Utc>) -> Result<Option<Message>>;

    /// Persist an updated record, moving it to the state its `status` field
    /// says it is in. Called by the claim holder to commit the exit from
    /// `Sending`.
    async fn update(&self, message: &Message) -> Result<()>;

    /// Return a `Sending` message to `Queued`, clearing its claim.
    ///
    /// A no-op if the message is not currently `Sending`.
    async fn release(&self, id: &MessageId) -> Result<()>;

    /// Ids of `Sending` messages whose claim is older than `cutoff`:
    /// orphans left behind by a worker that died mid-batch.
    async fn stale_claims(&self, cutoff: DateTime<Utc>) -> Result<Vec<MessageId>>;

    /// Append an immutable delivery-attempt record.
    async fn append_log(&self, entry: &AttemptLog) -> Result<()>;

    /// All attempt records for one message, oldest first.
    async fn logs_for(&self, id: &MessageId) -> Result<Vec<AttemptLog>>;
}
