pub mod address;
pub mod attempt;
pub mod clock;
pub mod logging;
pub mod message;

pub use tracing;

/// Control signal broadcast to long-running components.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
