//! Queue processing orchestration

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::TimeDelta;
use postroom_backend::BackendRegistry;
use postroom_common::{Signal, clock::Clock, internal, message::Message};
use postroom_store::MessageStore;
use tracing::{debug, error, info, warn};

use crate::{
    config::DispatchConfig,
    error::DispatchError,
    events::{DeliveryEvent, EventBus, EventKind},
    executor::Executor,
    retry::Disposition,
    scheduler::Scheduler,
};

/// Whether a processing run drained its batch or hit the batch timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunOutcome {
    #[default]
    Completed,
    Truncated,
}

/// Counters for one processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub sent: usize,
    pub failed: usize,
    pub requeued: usize,
    /// Claimed but released unattempted because the batch timed out
    pub skipped: usize,
    pub outcome: RunOutcome,
}

impl ProcessReport {
    /// Messages whose delivery was actually attempted this run.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.sent + self.failed + self.requeued
    }

    fn absorb(&mut self, other: &Self) {
        self.sent += other.sent;
        self.failed += other.failed;
        self.requeued += other.requeued;
        self.skipped += other.skipped;
        if other.outcome == RunOutcome::Truncated {
            self.outcome = RunOutcome::Truncated;
        }
    }
}

/// The delivery engine for one worker process.
///
/// Multiple processors in independent processes may point at the same
/// store; the store's claim step is the only coordination between them.
/// Within one processor, a batch is drained sequentially.
#[derive(Debug)]
pub struct QueueProcessor {
    store: Arc<dyn MessageStore>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
    scheduler: Scheduler,
    executor: Executor,
}

impl QueueProcessor {
    /// Wire the engine together.
    ///
    /// # Errors
    /// Fails fast on backend wiring mistakes; nothing is processed with a
    /// registry that cannot resolve its own default alias.
    pub fn new(
        store: Arc<dyn MessageStore>,
        registry: Arc<BackendRegistry>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Result<Self, DispatchError> {
        registry.validate()?;

        internal!(
            level = INFO,
            "Initialising queue processor with backends {:?}",
            registry.aliases()
        );

        let scheduler = Scheduler::new(Arc::clone(&store), config.sending_order);
        let executor = Executor::new(
            registry,
            Arc::clone(&store),
            Arc::clone(&clock),
            config.log_policy,
        );

        Ok(Self {
            store,
            events,
            clock,
            config,
            scheduler,
            executor,
        })
    }

    /// Claim one batch and drain it.
    ///
    /// Per-message delivery failures never surface here; they feed the
    /// retry state machine and the report. The returned error space is
    /// store faults only; in that case the batch aborts, and transitions
    /// already committed stay committed.
    pub async fn process_queue(&self) -> Result<ProcessReport, DispatchError> {
        let now = self.clock.now();
        let batch = self.scheduler.dequeue(self.config.batch_size, now).await?;

        let mut report = ProcessReport::default();
        if batch.is_empty() {
            debug!("No eligible messages");
            return Ok(report);
        }

        info!(count = batch.len(), "Processing claimed batch");
        let deadline = Instant::now() + Duration::from_secs(self.config.batch_timeout_secs);
        let mut pending = batch.into_iter();

        while let Some(mut message) = pending.next() {
            // Cooperative deadline check between sends; an in-flight send
            // is always allowed to finish.
            if Instant::now() >= deadline {
                report.outcome = RunOutcome::Truncated;
                self.release_unattempted(message, &mut pending, &mut report)
                    .await?;
                break;
            }

            let outcome = self.executor.attempt(&message).await;
            let settled_at = self.clock.now();
            let disposition = self.config.retry.settle(&mut message, &outcome, settled_at);

            // Commit the transition before telling anyone about it
            self.store.update(&message).await?;

            let kind = match disposition {
                Disposition::Sent => {
                    report.sent += 1;
                    EventKind::Sent
                }
                Disposition::Requeued => {
                    report.requeued += 1;
                    EventKind::Requeued
                }
                Disposition::Failed => {
                    report.failed += 1;
                    EventKind::Failed
                }
            };

            self.events.publish(&DeliveryEvent {
                kind,
                message_id: message.id.clone(),
                retries: message.number_of_retries,
                error: outcome.error().map(str::to_string),
                occurred_at: settled_at,
            });
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            requeued = report.requeued,
            skipped = report.skipped,
            truncated = report.outcome == RunOutcome::Truncated,
            "Finished batch"
        );

        Ok(report)
    }

    /// Hand claimed-but-unattempted messages back to the queue when the
    /// batch deadline cuts the run short.
    async fn release_unattempted(
        &self,
        next: Message,
        rest: &mut std::vec::IntoIter<Message>,
        report: &mut ProcessReport,
    ) -> Result<(), DispatchError> {
        warn!(
            remaining = rest.len() + 1,
            "Batch timeout exceeded, releasing unattempted messages"
        );

        for message in std::iter::once(next).chain(rest) {
            self.store.release(&message.id).await?;
            report.skipped += 1;
        }

        Ok(())
    }

    /// Drain batch after batch until the queue is empty or a batch is
    /// truncated by its timeout.
    pub async fn process_until_done(&self) -> Result<ProcessReport, DispatchError> {
        let mut total = ProcessReport::default();

        loop {
            let report = self.process_queue().await?;
            let drained = report.attempted() == 0 && report.skipped == 0;
            total.absorb(&report);

            if drained || report.outcome == RunOutcome::Truncated {
                break;
            }
        }

        Ok(total)
    }

    /// Release `Sending` claims older than the reclaim window.
    ///
    /// A worker that dies mid-batch leaves its claimed messages stuck in
    /// `Sending`; this sweep makes them eligible again. Runs at startup
    /// and once per poll cycle.
    pub async fn reclaim_stale(&self) -> Result<usize, DispatchError> {
        let cutoff = self.clock.now()
            - TimeDelta::seconds(i64::try_from(self.config.reclaim_after_secs).unwrap_or(i64::MAX));

        let ids = self.store.stale_claims(cutoff).await?;
        let count = ids.len();

        for id in ids {
            warn!(message_id = %id, "Reclaiming orphaned claim");
            self.store.release(&id).await?;
        }

        Ok(count)
    }

    /// Run the worker poll loop until shutdown.
    ///
    /// # Errors
    /// Currently only on channel breakage; store faults within a cycle are
    /// logged and the next cycle retried.
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), DispatchError> {
        internal!(level = INFO, "Queue processor starting");

        let mut poll_timer =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));

        loop {
            tokio::select! {
                _ = poll_timer.tick() => {
                    match self.reclaim_stale().await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "Reclaimed orphaned claims"),
                        Err(e) => error!(error = %e, "Error reclaiming orphaned claims"),
                    }

                    match self.process_queue().await {
                        Ok(report) if report.attempted() > 0 || report.skipped > 0 => {
                            info!(
                                sent = report.sent,
                                failed = report.failed,
                                requeued = report.requeued,
                                skipped = report.skipped,
                                "Processed batch"
                            );
                        }
                        Ok(_) => debug!("Queue empty"),
                        Err(e) => error!(error = %e, "Error processing queue"),
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            internal!(level = INFO, "Queue processor received shutdown signal");
                            break;
                        }
                        Err(e) => {
                            error!("Queue processor shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// The store this processor works against.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// The executor, for synchronous dispatch outside the queue.
    #[must_use]
    pub const fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The event bus this processor publishes to.
    #[must_use]
    pub const fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}
