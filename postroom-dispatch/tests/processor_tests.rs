//! Integration tests for the queue processor

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;
use postroom_backend::{BackendRegistry, MemoryBackend, SendError, TestBackend};
use postroom_common::{
    address::Address,
    clock::{Clock, ManualClock},
    message::{Message, MessageId, Priority, Status},
};
use postroom_dispatch::{
    DeliveryEvent, DispatchConfig, DispatchError, EventBus, EventKind, Listener, LogPolicy,
    QueueProcessor, RetryPolicy, RunOutcome,
};
use postroom_store::{FileMessageStore, MemoryMessageStore, MessageStore};

#[derive(Default)]
struct RecordingListener {
    seen: Mutex<Vec<(EventKind, u32, Option<String>)>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<(EventKind, u32, Option<String>)> {
        self.seen.lock().clone()
    }

    fn count_of(&self, kind: EventKind) -> usize {
        self.seen.lock().iter().filter(|(k, _, _)| *k == kind).count()
    }
}

impl Listener for RecordingListener {
    fn on_delivery(&self, event: &DeliveryEvent) {
        self.seen
            .lock()
            .push((event.kind, event.retries, event.error.clone()));
    }
}

struct Harness {
    store: Arc<MemoryMessageStore>,
    clock: Arc<ManualClock>,
    listener: Arc<RecordingListener>,
    processor: QueueProcessor,
}

fn registry_of(backend: Arc<dyn postroom_backend::Backend>) -> Arc<BackendRegistry> {
    let mut registry = BackendRegistry::new("default");
    registry.register("default", backend);
    Arc::new(registry)
}

fn harness(backend: Arc<dyn postroom_backend::Backend>, config: DispatchConfig) -> Harness {
    let store = Arc::new(MemoryMessageStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let listener = Arc::new(RecordingListener::default());

    let mut bus = EventBus::new();
    bus.subscribe(Arc::clone(&listener) as Arc<dyn Listener>);

    let processor = QueueProcessor::new(
        Arc::clone(&store) as Arc<dyn MessageStore>,
        registry_of(backend),
        Arc::new(bus),
        Arc::clone(&clock) as Arc<dyn Clock>,
        config,
    )
    .expect("Failed to build processor");

    Harness {
        store,
        clock,
        listener,
        processor,
    }
}

fn queued_message(priority: Priority) -> Message {
    let mut message = Message::new(
        Address::new("sender@example.com"),
        vec![Address::new("recipient@example.com")],
        Utc::now(),
    );
    message.priority = priority;
    message
}

#[tokio::test]
async fn batches_drain_in_priority_then_creation_order() {
    let delivered = MemoryBackend::new();
    let config = DispatchConfig {
        batch_size: 2,
        ..DispatchConfig::default()
    };
    let harness = harness(Arc::new(delivered.clone()), config);

    let mut expected = Vec::new();
    for priority in [
        Priority::High,
        Priority::High,
        Priority::Medium,
        Priority::Medium,
        Priority::Low,
    ] {
        let message = queued_message(priority);
        harness.store.insert(&message).await.unwrap();
        expected.push(message.id.clone());
    }
    // Creation order within a rank; the two highs first, then the mediums,
    // then the low
    let queued_order: Vec<_> = expected;

    let first = harness.processor.process_queue().await.unwrap();
    assert_eq!(first.sent, 2);
    let second = harness.processor.process_queue().await.unwrap();
    assert_eq!(second.sent, 2);
    let third = harness.processor.process_queue().await.unwrap();
    assert_eq!(third.sent, 1);

    let order: Vec<_> = delivered.delivered().iter().map(|m| m.id.clone()).collect();
    assert_eq!(order, queued_order);

    assert_eq!(harness.listener.count_of(EventKind::Sent), 5);
}

#[tokio::test]
async fn transient_failures_follow_the_retry_schedule() {
    // Three transient failures in a row with a limit of three retries
    let config = DispatchConfig {
        retry: RetryPolicy {
            max_retries: 3,
            retry_interval_secs: 900,
        },
        ..DispatchConfig::default()
    };
    let backend = TestBackend::failing(SendError::Temporary("server busy".to_string()));
    let harness = harness(Arc::new(backend), config);

    let message = queued_message(Priority::Medium);
    harness.store.insert(&message).await.unwrap();

    // Attempt 1: requeued 15 minutes out
    let start = harness.clock.now();
    let report = harness.processor.process_queue().await.unwrap();
    assert_eq!(report.requeued, 1);

    let record = harness.store.read(&message.id).await.unwrap();
    assert_eq!(record.status, Status::Queued);
    assert_eq!(record.number_of_retries, 1);
    assert_eq!(record.scheduled_time, Some(start + TimeDelta::minutes(15)));

    // Not yet due: nothing to process
    assert_eq!(harness.processor.process_queue().await.unwrap().attempted(), 0);

    // Attempt 2
    harness.clock.advance(TimeDelta::minutes(15));
    assert_eq!(harness.processor.process_queue().await.unwrap().requeued, 1);
    assert_eq!(
        harness.store.read(&message.id).await.unwrap().number_of_retries,
        2
    );

    // Attempt 3 exhausts the limit
    harness.clock.advance(TimeDelta::minutes(15));
    let report = harness.processor.process_queue().await.unwrap();
    assert_eq!(report.failed, 1);

    let record = harness.store.read(&message.id).await.unwrap();
    assert_eq!(record.status, Status::Failed);
    assert_eq!(record.number_of_retries, 3);

    // Exactly one "failed" event, and no further retries scheduled
    assert_eq!(harness.listener.count_of(EventKind::Failed), 1);
    assert_eq!(harness.listener.count_of(EventKind::Requeued), 2);
    harness.clock.advance(TimeDelta::hours(1));
    assert_eq!(harness.processor.process_queue().await.unwrap().attempted(), 0);
}

#[tokio::test]
async fn permanent_failure_fails_without_consuming_retries() {
    let config = DispatchConfig {
        retry: RetryPolicy {
            max_retries: 3,
            retry_interval_secs: 900,
        },
        ..DispatchConfig::default()
    };
    let backend = TestBackend::failing(SendError::Permanent("550 user unknown".to_string()));
    let harness = harness(Arc::new(backend), config);

    let message = queued_message(Priority::Medium);
    harness.store.insert(&message).await.unwrap();

    let report = harness.processor.process_queue().await.unwrap();
    assert_eq!(report.failed, 1);

    let record = harness.store.read(&message.id).await.unwrap();
    assert_eq!(record.status, Status::Failed);
    assert_eq!(record.number_of_retries, 0);

    assert_eq!(
        harness.listener.events(),
        vec![(
            EventKind::Failed,
            0,
            Some("550 user unknown".to_string())
        )]
    );
}

#[tokio::test]
async fn events_carry_committed_state() {
    let config = DispatchConfig::default();
    let backend = TestBackend::succeeding();
    backend.push_outcome(Err(SendError::Temporary("busy".to_string())));
    let harness = harness(Arc::new(backend), config);

    // Two messages: the first (by creation order) hits the transient
    // failure, the second delivers. max_retries is 0, so the failure is
    // terminal.
    let first = queued_message(Priority::Medium);
    let second = queued_message(Priority::Medium);
    harness.store.insert(&first).await.unwrap();
    harness.store.insert(&second).await.unwrap();

    harness.processor.process_queue().await.unwrap();

    assert_eq!(
        harness.listener.events(),
        vec![
            (EventKind::Failed, 1, Some("busy".to_string())),
            (EventKind::Sent, 0, None),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_partition_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spool");

    let seed = FileMessageStore::open(path.clone()).await.unwrap();
    let mut ids = HashSet::new();
    for _ in 0..15 {
        let message = queued_message(Priority::Medium);
        ids.insert(message.id.clone());
        seed.insert(&message).await.unwrap();
    }

    // Two workers over the same directory, sharing nothing but the store
    let build_worker = |backend: TestBackend| {
        let path = path.clone();
        async move {
            let store = Arc::new(FileMessageStore::open(path).await.unwrap());
            QueueProcessor::new(
                store as Arc<dyn MessageStore>,
                registry_of(Arc::new(backend)),
                Arc::new(EventBus::new()),
                Arc::new(ManualClock::new(Utc::now())) as Arc<dyn Clock>,
                DispatchConfig {
                    batch_size: 10,
                    ..DispatchConfig::default()
                },
            )
            .unwrap()
        }
    };

    let left_backend = TestBackend::succeeding();
    let right_backend = TestBackend::succeeding();
    let left = build_worker(left_backend.clone()).await;
    let right = build_worker(right_backend.clone()).await;

    let (left_report, right_report) = tokio::join!(
        tokio::spawn(async move { left.process_queue().await.unwrap() }),
        tokio::spawn(async move { right.process_queue().await.unwrap() }),
    );
    let left_report = left_report.unwrap();
    let right_report = right_report.unwrap();

    let left_ids: HashSet<MessageId> = left_backend.calls().into_iter().collect();
    let right_ids: HashSet<MessageId> = right_backend.calls().into_iter().collect();

    assert!(left_ids.is_disjoint(&right_ids), "Workers attempted the same message");
    assert_eq!(left_ids.len() + right_ids.len(), 15);
    assert_eq!(left_report.sent + right_report.sent, 15);

    let union: HashSet<_> = left_ids.union(&right_ids).cloned().collect();
    assert_eq!(union, ids);
}

#[tokio::test]
async fn zero_batch_timeout_releases_the_whole_batch() {
    let config = DispatchConfig {
        batch_timeout_secs: 0,
        ..DispatchConfig::default()
    };
    let backend = TestBackend::succeeding();
    let harness = harness(Arc::new(backend.clone()), config);

    for _ in 0..3 {
        harness
            .store
            .insert(&queued_message(Priority::Medium))
            .await
            .unwrap();
    }

    let report = harness.processor.process_queue().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Truncated);
    assert_eq!(report.skipped, 3);
    assert_eq!(report.attempted(), 0);
    assert_eq!(backend.call_count(), 0);

    // Released, not stuck in Sending: everything is eligible again
    let now = harness.clock.now();
    assert_eq!(harness.store.eligible(now).await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_batches_are_truncated_partway() {
    let config = DispatchConfig {
        batch_timeout_secs: 1,
        ..DispatchConfig::default()
    };
    let backend = TestBackend::succeeding().with_delay(Duration::from_millis(600));
    let harness = harness(Arc::new(backend.clone()), config);

    for _ in 0..3 {
        harness
            .store
            .insert(&queued_message(Priority::Medium))
            .await
            .unwrap();
    }

    let report = harness.processor.process_queue().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Truncated);
    assert_eq!(report.sent, 2);
    assert_eq!(report.skipped, 1);

    // The released message is claimable by the next cycle
    let next = harness.processor.process_queue().await.unwrap();
    assert_eq!(next.sent, 1);
    assert_eq!(next.outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn until_done_drains_the_queue_in_batches() {
    let config = DispatchConfig {
        batch_size: 3,
        ..DispatchConfig::default()
    };
    let harness = harness(Arc::new(TestBackend::succeeding()), config);

    for _ in 0..7 {
        harness
            .store
            .insert(&queued_message(Priority::Medium))
            .await
            .unwrap();
    }

    let report = harness.processor.process_until_done().await.unwrap();
    assert_eq!(report.sent, 7);
    assert_eq!(report.outcome, RunOutcome::Completed);

    // A truncated batch stops the drain loop instead of spinning
    let truncating = DispatchConfig {
        batch_timeout_secs: 0,
        ..DispatchConfig::default()
    };
    let harness = self::harness(Arc::new(TestBackend::succeeding()), truncating);
    harness
        .store
        .insert(&queued_message(Priority::Medium))
        .await
        .unwrap();

    let report = harness.processor.process_until_done().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Truncated);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn reclaim_stale_requeues_orphaned_claims() {
    let config = DispatchConfig {
        reclaim_after_secs: 360,
        ..DispatchConfig::default()
    };
    let harness = harness(Arc::new(TestBackend::succeeding()), config);

    let message = queued_message(Priority::Medium);
    harness.store.insert(&message).await.unwrap();

    // A claim committed and then abandoned, as if the worker died
    let claim_time = harness.clock.now();
    harness
        .store
        .claim(&message.id, claim_time)
        .await
        .unwrap()
        .unwrap();

    // Too fresh to reclaim
    assert_eq!(harness.processor.reclaim_stale().await.unwrap(), 0);

    harness.clock.advance(TimeDelta::minutes(10));
    assert_eq!(harness.processor.reclaim_stale().await.unwrap(), 1);

    let record = harness.store.read(&message.id).await.unwrap();
    assert_eq!(record.status, Status::Queued);
    assert_eq!(record.claimed_at, None);

    // And the recovered message goes on to deliver
    let report = harness.processor.process_queue().await.unwrap();
    assert_eq!(report.sent, 1);
}

#[tokio::test]
async fn expired_and_future_messages_are_never_attempted() {
    let backend = TestBackend::succeeding();
    let harness = harness(Arc::new(backend.clone()), DispatchConfig::default());
    let now = harness.clock.now();

    let mut future = queued_message(Priority::High);
    future.scheduled_time = Some(now + TimeDelta::hours(1));
    harness.store.insert(&future).await.unwrap();

    let mut expired = queued_message(Priority::High);
    expired.expires_at = Some(now - TimeDelta::hours(1));
    harness.store.insert(&expired).await.unwrap();

    let report = harness.processor.process_queue().await.unwrap();
    assert_eq!(report.attempted(), 0);
    assert_eq!(backend.call_count(), 0);

    // The scheduled one becomes eligible once due; the expired one never
    harness.clock.advance(TimeDelta::hours(1));
    let report = harness.processor.process_queue().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(backend.calls(), vec![future.id]);
}

#[tokio::test]
async fn attempt_logs_follow_the_policy() {
    let config = DispatchConfig {
        log_policy: LogPolicy::FailuresOnly,
        ..DispatchConfig::default()
    };
    let backend = TestBackend::succeeding();
    backend.push_outcome(Err(SendError::Temporary("busy".to_string())));
    let harness = harness(Arc::new(backend), config);

    let failing = queued_message(Priority::Medium);
    let succeeding = queued_message(Priority::Medium);
    harness.store.insert(&failing).await.unwrap();
    harness.store.insert(&succeeding).await.unwrap();

    harness.processor.process_queue().await.unwrap();

    assert_eq!(harness.store.logs_for(&failing.id).await.unwrap().len(), 1);
    assert!(harness.store.logs_for(&succeeding.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn a_broken_registry_fails_at_startup() {
    let registry = Arc::new(BackendRegistry::new("missing"));

    let result = QueueProcessor::new(
        Arc::new(MemoryMessageStore::new()) as Arc<dyn MessageStore>,
        registry,
        Arc::new(EventBus::new()),
        Arc::new(ManualClock::new(Utc::now())) as Arc<dyn Clock>,
        DispatchConfig::default(),
    );

    assert!(matches!(result, Err(DispatchError::Configuration(_))));
}

#[tokio::test]
async fn store_faults_surface_from_process_queue() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spool");
    let store = Arc::new(FileMessageStore::open(path.clone()).await.unwrap());

    let processor = QueueProcessor::new(
        store as Arc<dyn MessageStore>,
        registry_of(Arc::new(TestBackend::succeeding())),
        Arc::new(EventBus::new()),
        Arc::new(ManualClock::new(Utc::now())) as Arc<dyn Clock>,
        DispatchConfig::default(),
    )
    .unwrap();

    // Pull the queue directory out from under the store
    std::fs::remove_dir_all(path.join("queued")).unwrap();

    assert!(matches!(
        processor.process_queue().await,
        Err(DispatchError::Store(_))
    ));
}
