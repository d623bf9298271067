//! Per-attempt event publication

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use postroom_common::message::MessageId;
use tracing::warn;

/// What happened to a message on this attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Sent,
    Requeued,
    Failed,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Sent => "sent",
            Self::Requeued => "requeued",
            Self::Failed => "failed",
        })
    }
}

/// Published after a delivery attempt's state transition has been committed
/// to the store.
#[derive(Debug, Clone)]
pub struct DeliveryEvent {
    pub kind: EventKind,
    pub message_id: MessageId,
    /// The retry count after this attempt settled
    pub retries: u32,
    pub error: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A subscriber to delivery events.
pub trait Listener: Send + Sync {
    fn on_delivery(&self, event: &DeliveryEvent);
}

/// Ordered, synchronous publish/subscribe registry for delivery events.
///
/// Listeners are registered once at startup; `subscribe` needs `&mut self`,
/// so registration necessarily finishes before the bus is shared with the
/// workers. Publication invokes listeners in registration order, within the
/// publishing worker's flow. Registration order across process restarts is
/// whatever the startup wiring does: stable iff that wiring is.
///
/// A panicking listener is isolated: the panic is caught and logged, the
/// remaining listeners still run, and the already-committed state
/// transition is unaffected.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Arc<dyn Listener>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn Listener>) {
        self.listeners.push(listener);
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn publish(&self, event: &DeliveryEvent) {
        for listener in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_delivery(event))).is_err() {
                warn!(
                    kind = %event.kind,
                    message_id = %event.message_id,
                    "Event listener panicked"
                );
            }
        }
    }
}
