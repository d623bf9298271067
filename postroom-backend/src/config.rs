use std::{collections::HashMap, sync::Arc};

use serde::Deserialize;

use crate::{
    error::ConfigurationError, memory::MemoryBackend, registry::BackendRegistry,
    smtp::{SmtpBackend, SmtpConfig}, r#trait::Backend,
};

/// Configuration for a single delivery backend
///
/// SMTP relay in TOML config:
/// ```toml
/// [backends.available.smtp]
/// type = "smtp"
/// host = "mail.example.com"
/// port = 587
/// starttls = true
/// ```
///
/// In-process sink for development:
/// ```toml
/// [backends.available.sink]
/// type = "memory"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Smtp(SmtpConfig),
    Memory,
}

impl BackendConfig {
    /// Convert the configuration into a concrete transport.
    ///
    /// # Errors
    /// If the transport cannot be built from this configuration.
    pub fn into_backend(self) -> Result<Arc<dyn Backend>, ConfigurationError> {
        Ok(match self {
            Self::Smtp(config) => Arc::new(SmtpBackend::new(&config)?),
            Self::Memory => Arc::new(MemoryBackend::new()),
        })
    }
}

fn default_alias() -> String {
    "smtp".to_string()
}

/// The full backend section of the configuration: a default alias plus the
/// aliased transports available to messages.
///
/// When no backends are listed, a plain SMTP transport to localhost is
/// registered under the default alias, so a bare config still delivers.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendsConfig {
    /// Alias used for messages that do not name a backend
    #[serde(default = "default_alias")]
    pub default: String,

    #[serde(default)]
    pub available: HashMap<String, BackendConfig>,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            default: default_alias(),
            available: HashMap::new(),
        }
    }
}

impl BackendsConfig {
    /// Build and validate the registry. This is the startup fail-fast
    /// point: an unknown default alias or an unbuildable transport aborts
    /// here.
    ///
    /// # Errors
    /// If any transport fails to build, or the default alias is not among
    /// the registered ones.
    pub fn into_registry(self) -> Result<BackendRegistry, ConfigurationError> {
        let mut available = self.available;
        if available.is_empty() {
            available.insert(default_alias(), BackendConfig::Smtp(SmtpConfig::default()));
        }

        let mut registry = BackendRegistry::new(self.default);
        for (alias, config) in available {
            registry.register(alias, config.into_backend()?);
        }

        registry.validate()?;

        Ok(registry)
    }
}
