//! Delivery queue engine for outbound messages
//!
//! This crate provides the worker-side core of the queue:
//! - Claim the next eligible batch in priority/time order
//! - Attempt delivery through the registered backends
//! - Apply the retry policy and commit each state transition
//! - Publish per-attempt events to subscribers
//! - Bound batch wall-clock time and recover orphaned claims

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod processor;
pub mod retry;
pub mod scheduler;

pub use config::{DispatchConfig, LogPolicy, SendingOrder};
pub use error::DispatchError;
pub use events::{DeliveryEvent, EventBus, EventKind, Listener};
pub use executor::{AttemptOutcome, Executor};
pub use processor::{ProcessReport, QueueProcessor, RunOutcome};
pub use retry::{Disposition, RetryPolicy};
pub use scheduler::Scheduler;
