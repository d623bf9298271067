use postroom_backend::ConfigurationError;
use postroom_store::StoreError;
use thiserror::Error;

/// Faults that abort a processing run.
///
/// Per-message delivery failures are deliberately absent: they are folded
/// into the retry state machine and the run's report. Only store-level and
/// configuration-level faults surface to the caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The durable store is unreachable or failing. The current batch
    /// aborts; transitions already committed remain valid, and claims only
    /// exist as committed store state.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Backend wiring mistake, raised while building the engine at startup.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}
