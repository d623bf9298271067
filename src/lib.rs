//! postroom is a durable outbound mail queue with concurrent delivery
//! workers.
//!
//! Producers enqueue messages through a [`Mailer`]; worker processes drain
//! the shared store with [`Mailer::process_queue`] or [`Mailer::serve`],
//! retrying transient failures and recording every attempt. The store is
//! the only coordination surface between workers.

pub mod config;
pub mod mail;

use std::sync::Arc;

use postroom_common::clock::{Clock, SystemClock};
use postroom_dispatch::{EventBus, QueueProcessor};

pub use config::Config;
pub use mail::{Draft, MailError, Mailer};
pub use postroom_backend as backend;
pub use postroom_common as common;
pub use postroom_dispatch as dispatch;
pub use postroom_store as store;

/// Build a ready-to-run [`Mailer`] from configuration.
///
/// Event listeners must already be registered on `events`: the bus is
/// shared with the workers here and cannot be subscribed to afterwards.
///
/// # Errors
/// On store initialization failures or backend wiring mistakes, before any
/// message is touched.
pub async fn build(config: Config, events: EventBus) -> anyhow::Result<Mailer> {
    let store = config.store.into_store().await?;
    let registry = Arc::new(config.backends.into_registry()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let processor = QueueProcessor::new(
        store,
        registry,
        Arc::new(events),
        Arc::clone(&clock),
        config.queue,
    )?;

    Ok(Mailer::new(processor, clock, config.message_id_fqdn))
}
