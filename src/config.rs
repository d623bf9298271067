use std::path::Path;

use postroom_backend::BackendsConfig;
use postroom_dispatch::DispatchConfig;
use postroom_store::StoreConfig;
use serde::Deserialize;

/// Top-level configuration for a postroom process.
///
/// ```toml
/// [store]
/// type = "file"
/// path = "/var/spool/postroom"
///
/// [queue]
/// batch_size = 100
/// sending_order = "priority-fifo"
/// log_policy = "all"
/// batch_timeout_secs = 180
///
/// [queue.retry]
/// max_retries = 3
/// retry_interval_secs = 900
///
/// [backends]
/// default = "relay"
///
/// [backends.available.relay]
/// type = "smtp"
/// host = "mail.example.com"
/// port = 587
/// starttls = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub queue: DispatchConfig,
    pub backends: BackendsConfig,

    /// Domain used for generated Message-ID headers. Unset disables
    /// Message-ID generation.
    pub message_id_fqdn: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// If the file cannot be read, or if the configuration file is invalid.
    pub fn from_config(file: impl AsRef<Path>) -> std::io::Result<Self> {
        let config = std::fs::read_to_string(file)?;

        toml::from_str(&config)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string()))
    }
}
