use async_trait::async_trait;
use postroom_common::message::Message;

use crate::error::SendError;

/// A pluggable transport capable of attempting delivery of a single message.
///
/// Delivery is at-least-once: the queue engine may hand the same message to
/// `send` again after a transient failure (or after a crash between the send
/// and the status commit), so idempotence is the transport's or recipient's
/// concern.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Attempt delivery of `message`.
    ///
    /// # Errors
    /// [`SendError::Temporary`] for retryable conditions,
    /// [`SendError::Permanent`] for terminal ones.
    async fn send(&self, message: &Message) -> Result<(), SendError>;
}
