//! Delivery transports for outbound messages
//!
//! A backend is the capability to attempt delivery of a single message.
//! Backends are registered under string aliases in a [`BackendRegistry`]
//! built once at startup; each queued message names the alias it wants (or
//! none, selecting the process-wide default).

pub mod config;
pub mod error;
pub mod memory;
pub mod registry;
pub mod smtp;
pub mod r#trait;

pub use config::{BackendConfig, BackendsConfig};
pub use error::{ConfigurationError, SendError};
pub use memory::MemoryBackend;
pub use registry::BackendRegistry;
pub use smtp::{SmtpBackend, SmtpConfig};
pub use test::TestBackend;
pub use r#trait::Backend;
