//! Typed error handling for delivery transports.
//!
//! This module distinguishes between:
//! - Permanent failures (invalid recipient/content, rejections) - don't retry
//! - Temporary failures (network or server-side conditions) - retry later
//! - Configuration errors (wiring mistakes) - fatal at startup

use thiserror::Error;

/// The outcome classification of a failed delivery attempt.
///
/// The retry controller uses this split to decide between requeueing a
/// message and failing it terminally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Temporary failure that can be retried later (connection refused,
    /// server busy, timeouts).
    #[error("Temporary failure: {0}")]
    Temporary(String),

    /// Permanent failure that should not be retried (invalid recipient,
    /// rejected content).
    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl SendError {
    /// Returns `true` if this error is temporary and the attempt should be
    /// retried.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Returns `true` if this error is permanent and the message should
    /// fail terminally.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }
}

/// Static wiring mistakes in backend configuration.
///
/// These are raised while building the registry at startup and are never
/// recovered silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// An alias was referenced (as the default or by a message) that no
    /// backend is registered under.
    #[error("Unknown backend alias: {0}")]
    UnknownAlias(String),

    /// The registry was built without any backends.
    #[error("No delivery backends are registered")]
    NoBackends,

    /// A backend's own configuration could not be turned into a transport.
    #[error("Invalid backend configuration: {0}")]
    InvalidBackend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_error_classification() {
        let temporary = SendError::Temporary("connection refused".to_string());
        assert!(temporary.is_temporary());
        assert!(!temporary.is_permanent());

        let permanent = SendError::Permanent("550 user unknown".to_string());
        assert!(permanent.is_permanent());
        assert!(!permanent.is_temporary());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            SendError::Temporary("server busy".to_string()).to_string(),
            "Temporary failure: server busy"
        );
        assert_eq!(
            ConfigurationError::UnknownAlias("sendgrid".to_string()).to_string(),
            "Unknown backend alias: sendgrid"
        );
    }
}
