//! Batch selection and claiming

use std::sync::Arc;

use chrono::{DateTime, Utc};
use postroom_common::message::Message;
use postroom_store::{MessageStore, StoreError};
use tracing::trace;

use crate::config::SendingOrder;

/// Selects and exclusively claims the next eligible batch from the store.
///
/// Selection is a snapshot; the claim on each candidate is the atomic step,
/// delegated to [`MessageStore::claim`]. Contended candidates are skipped,
/// never waited on, so concurrent workers partition the eligible set
/// between themselves instead of serializing on it.
#[derive(Debug, Clone)]
pub struct Scheduler {
    store: Arc<dyn MessageStore>,
    order: SendingOrder,
}

impl Scheduler {
    #[must_use]
    pub const fn new(store: Arc<dyn MessageStore>, order: SendingOrder) -> Self {
        Self { store, order }
    }

    /// Claim up to `batch_size` eligible messages in sending order.
    ///
    /// Returns an empty batch (not an error) when nothing is eligible or
    /// every candidate was claimed by other workers first. Ids are ULIDs,
    /// so the ascending-id tie-break is ascending creation time.
    ///
    /// # Errors
    /// Only on store faults; contention is not an error.
    pub async fn dequeue(
        &self,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>, StoreError> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }

        let mut candidates = self.store.eligible(now).await?;

        match self.order {
            SendingOrder::PriorityFifo => candidates.sort_by(|a, b| {
                b.priority
                    .rank()
                    .cmp(&a.priority.rank())
                    .then_with(|| a.id.cmp(&b.id))
            }),
            SendingOrder::Fifo => candidates.sort_by(|a, b| a.id.cmp(&b.id)),
        }

        let mut claimed = Vec::with_capacity(batch_size.min(candidates.len()));

        for candidate in candidates {
            if claimed.len() == batch_size {
                break;
            }

            match self.store.claim(&candidate.id, now).await? {
                Some(message) => claimed.push(message),
                // Another worker won the race for this one
                None => trace!(message_id = %candidate.id, "Skipping contended message"),
            }
        }

        Ok(claimed)
    }
}
