use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use postroom_common::message::Message;

use crate::{error::SendError, r#trait::Backend};

/// In-memory delivery sink
///
/// Accepts every message and keeps a copy, in delivery order. Useful for
/// development environments and assertions in tests; nothing ever leaves the
/// process.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    delivered: Arc<Mutex<Vec<Message>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages delivered so far, in order.
    #[must_use]
    pub fn delivered(&self) -> Vec<Message> {
        self.delivered.lock().clone()
    }

    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().len()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn send(&self, message: &Message) -> Result<(), SendError> {
        self.delivered.lock().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use postroom_common::address::Address;

    use super::*;

    #[tokio::test]
    async fn records_deliveries_in_order() {
        let backend = MemoryBackend::new();

        let first = Message::new(
            Address::new("sender@example.com"),
            vec![Address::new("one@example.com")],
            Utc::now(),
        );
        let second = Message::new(
            Address::new("sender@example.com"),
            vec![Address::new("two@example.com")],
            Utc::now(),
        );

        backend.send(&first).await.unwrap();
        backend.send(&second).await.unwrap();

        let delivered = backend.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].id, first.id);
        assert_eq!(delivered[1].id, second.id);
    }
}
