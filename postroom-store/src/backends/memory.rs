use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use postroom_common::{
    attempt::AttemptLog,
    message::{Message, MessageId, Status},
};

use crate::{StoreError, r#trait::MessageStore};

/// In-memory message store implementation
///
/// Messages live in a `DashMap`, attempt logs in a `Vec`. Primarily intended
/// for tests and transient queues; the per-entry locking of the map gives
/// [`claim`](MessageStore::claim) the same atomic compare-and-transition
/// semantics the file store gets from directory renames, but only within a
/// single process.
///
/// # Concurrency
/// `claim` takes the entry's exclusive shard lock for the duration of the
/// eligibility check and status flip, so concurrent claims on the same id
/// resolve to exactly one winner; the losers observe `Sending` and skip.
#[derive(Debug, Clone, Default)]
pub struct MemoryMessageStore {
    messages: Arc<DashMap<MessageId, Message>>,
    logs: Arc<RwLock<Vec<AttemptLog>>>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently stored, any status.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, message: &Message) -> crate::Result<()> {
        if self.messages.contains_key(&message.id) {
            return Err(StoreError::AlreadyExists(message.id.clone()));
        }

        self.messages.insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn read(&self, id: &MessageId) -> crate::Result<Message> {
        self.messages
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn eligible(&self, now: DateTime<Utc>) -> crate::Result<Vec<Message>> {
        Ok(self
            .messages
            .iter()
            .filter(|entry| entry.value().is_eligible(now))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn claim(&self, id: &MessageId, now: DateTime<Utc>) -> crate::Result<Option<Message>> {
        let Some(mut entry) = self.messages.get_mut(id) else {
            return Ok(None);
        };

        let message = entry.value_mut();
        if !message.is_eligible(now) {
            return Ok(None);
        }

        message.status = Status::Sending;
        message.claimed_at = Some(now);

        Ok(Some(message.clone()))
    }

    async fn update(&self, message: &Message) -> crate::Result<()> {
        let Some(mut entry) = self.messages.get_mut(&message.id) else {
            return Err(StoreError::NotFound(message.id.clone()));
        };

        *entry.value_mut() = message.clone();
        Ok(())
    }

    async fn release(&self, id: &MessageId) -> crate::Result<()> {
        let Some(mut entry) = self.messages.get_mut(id) else {
            return Err(StoreError::NotFound(id.clone()));
        };

        let message = entry.value_mut();
        if message.status == Status::Sending {
            message.status = Status::Queued;
            message.claimed_at = None;
        }

        Ok(())
    }

    async fn stale_claims(&self, cutoff: DateTime<Utc>) -> crate::Result<Vec<MessageId>> {
        let mut ids: Vec<_> = self
            .messages
            .iter()
            .filter(|entry| {
                let message = entry.value();
                message.status == Status::Sending
                    && message.claimed_at.is_none_or(|claimed| claimed < cutoff)
            })
            .map(|entry| entry.key().clone())
            .collect();

        ids.sort();
        Ok(ids)
    }

    async fn append_log(&self, entry: &AttemptLog) -> crate::Result<()> {
        self.logs.write().push(entry.clone());
        Ok(())
    }

    async fn logs_for(&self, id: &MessageId) -> crate::Result<Vec<AttemptLog>> {
        Ok(self
            .logs
            .read()
            .iter()
            .filter(|entry| &entry.message_id == id)
            .cloned()
            .collect())
    }
}
