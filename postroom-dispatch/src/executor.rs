//! Per-message delivery attempts

use std::sync::Arc;

use postroom_backend::{BackendRegistry, SendError};
use postroom_common::{attempt::AttemptLog, clock::Clock, message::Message};
use postroom_store::MessageStore;
use tracing::{debug, warn};

use crate::config::LogPolicy;

/// Result of one delivery attempt, as observed by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered,
    /// Network or server-side condition; retryable.
    TransientFailure(String),
    /// Recipient or content problem; not retryable.
    PermanentFailure(String),
}

impl AttemptOutcome {
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// The failure reason, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Delivered => None,
            Self::TransientFailure(reason) | Self::PermanentFailure(reason) => Some(reason),
        }
    }
}

/// Invokes the resolved backend for each claimed message and records the
/// attempt.
#[derive(Debug, Clone)]
pub struct Executor {
    registry: Arc<BackendRegistry>,
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    log_policy: LogPolicy,
}

impl Executor {
    #[must_use]
    pub const fn new(
        registry: Arc<BackendRegistry>,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
        log_policy: LogPolicy,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            log_policy,
        }
    }

    /// Attempt delivery of one claimed message.
    ///
    /// Never returns an error: every failure mode is folded into the
    /// outcome, so one message cannot abort the rest of its batch.
    pub async fn attempt(&self, message: &Message) -> AttemptOutcome {
        let outcome = self.attempt_inner(message).await;

        debug!(
            message_id = %message.id,
            delivered = outcome.is_delivered(),
            error = outcome.error(),
            "Delivery attempt finished"
        );

        self.record(message, &outcome).await;

        outcome
    }

    async fn attempt_inner(&self, message: &Message) -> AttemptOutcome {
        let backend = match self.registry.resolve(&message.backend_alias) {
            Ok(backend) => backend,
            // An alias that resolves nowhere is a wiring mistake;
            // retrying the same record cannot fix it.
            Err(e) => return AttemptOutcome::PermanentFailure(e.to_string()),
        };

        let task = {
            let backend = Arc::clone(&backend);
            let message = message.clone();
            tokio::spawn(async move { backend.send(&message).await })
        };

        match task.await {
            Ok(Ok(())) => AttemptOutcome::Delivered,
            Ok(Err(SendError::Temporary(reason))) => AttemptOutcome::TransientFailure(reason),
            Ok(Err(SendError::Permanent(reason))) => AttemptOutcome::PermanentFailure(reason),
            // The backend panicked; isolate it and treat it like any other
            // transient fault
            Err(e) => AttemptOutcome::TransientFailure(format!("Delivery task aborted: {e}")),
        }
    }

    /// Write the attempt-log record the configured policy asks for.
    ///
    /// A failed log write is reported but does not change the delivery
    /// outcome.
    async fn record(&self, message: &Message, outcome: &AttemptOutcome) {
        if !self.log_policy.should_log(!outcome.is_delivered()) {
            return;
        }

        let now = self.clock.now();
        let entry = match outcome {
            AttemptOutcome::Delivered => AttemptLog::sent(message.id.clone(), now),
            AttemptOutcome::TransientFailure(reason)
            | AttemptOutcome::PermanentFailure(reason) => {
                AttemptLog::failed(message.id.clone(), now, reason.clone())
            }
        };

        if let Err(e) = self.store.append_log(&entry).await {
            warn!(message_id = %message.id, error = %e, "Failed to record delivery attempt");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use postroom_backend::{Backend, TestBackend};
    use postroom_common::{address::Address, attempt::AttemptStatus, clock::SystemClock};
    use postroom_store::MemoryMessageStore;

    use super::*;

    fn message() -> Message {
        Message::new(
            Address::new("sender@example.com"),
            vec![Address::new("recipient@example.com")],
            Utc::now(),
        )
    }

    fn build_executor(backend: TestBackend, log_policy: LogPolicy) -> (Executor, Arc<MemoryMessageStore>) {
        let mut registry = BackendRegistry::new("test");
        registry.register("test", Arc::new(backend));

        let store = Arc::new(MemoryMessageStore::new());
        let executor = Executor::new(
            Arc::new(registry),
            Arc::clone(&store) as Arc<dyn MessageStore>,
            Arc::new(SystemClock),
            log_policy,
        );

        (executor, store)
    }

    #[tokio::test]
    async fn outcomes_follow_the_backend() {
        let backend = TestBackend::succeeding();
        backend.push_outcome(Err(SendError::Temporary("busy".to_string())));
        backend.push_outcome(Err(SendError::Permanent("rejected".to_string())));
        let (executor, _) = build_executor(backend, LogPolicy::None);

        let msg = message();
        assert_eq!(
            executor.attempt(&msg).await,
            AttemptOutcome::TransientFailure("busy".to_string())
        );
        assert_eq!(
            executor.attempt(&msg).await,
            AttemptOutcome::PermanentFailure("rejected".to_string())
        );
        assert_eq!(executor.attempt(&msg).await, AttemptOutcome::Delivered);
    }

    #[tokio::test]
    async fn unknown_alias_is_a_permanent_failure() {
        let (executor, _) = build_executor(TestBackend::succeeding(), LogPolicy::None);

        let mut msg = message();
        msg.backend_alias = "nowhere".to_string();

        let outcome = executor.attempt(&msg).await;
        assert!(matches!(outcome, AttemptOutcome::PermanentFailure(_)));
    }

    #[tokio::test]
    async fn log_policy_controls_attempt_records() {
        // All: both successes and failures are recorded
        let backend = TestBackend::succeeding();
        backend.push_outcome(Err(SendError::Temporary("busy".to_string())));
        let (executor, store) = build_executor(backend, LogPolicy::All);
        let msg = message();
        executor.attempt(&msg).await;
        executor.attempt(&msg).await;
        let logs = store.logs_for(&msg.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].status, AttemptStatus::Failed);
        assert_eq!(logs[1].status, AttemptStatus::Sent);

        // FailuresOnly: the success is not recorded
        let backend = TestBackend::succeeding();
        backend.push_outcome(Err(SendError::Temporary("busy".to_string())));
        let (executor, store) = build_executor(backend, LogPolicy::FailuresOnly);
        let msg = message();
        executor.attempt(&msg).await;
        executor.attempt(&msg).await;
        let logs = store.logs_for(&msg.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, AttemptStatus::Failed);
        assert_eq!(logs[0].error.as_deref(), Some("busy"));

        // None: nothing is recorded
        let (executor, store) = build_executor(TestBackend::succeeding(), LogPolicy::None);
        let msg = message();
        executor.attempt(&msg).await;
        assert!(store.logs_for(&msg.id).await.unwrap().is_empty());
    }

    #[derive(Debug)]
    struct PanickingBackend;

    #[async_trait]
    impl Backend for PanickingBackend {
        async fn send(&self, _message: &Message) -> Result<(), SendError> {
            panic!("backend bug");
        }
    }

    #[tokio::test]
    async fn a_panicking_backend_is_a_transient_failure() {
        let mut registry = BackendRegistry::new("panic");
        registry.register("panic", Arc::new(PanickingBackend));

        let store = Arc::new(MemoryMessageStore::new());
        let executor = Executor::new(
            Arc::new(registry),
            store as Arc<dyn MessageStore>,
            Arc::new(SystemClock),
            LogPolicy::None,
        );

        let outcome = executor.attempt(&message()).await;
        assert!(matches!(outcome, AttemptOutcome::TransientFailure(_)));
    }
}
