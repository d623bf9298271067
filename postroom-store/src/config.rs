use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{
    backends::{FileMessageStore, MemoryMessageStore},
    r#trait::MessageStore,
};

/// Configuration for the message store
///
/// Allows runtime selection of the store implementation through the
/// configuration file.
///
/// File-backed store in TOML config:
/// ```toml
/// [store]
/// type = "file"
/// path = "/var/spool/postroom"
/// ```
///
/// Memory-backed store for testing:
/// ```toml
/// [store]
/// type = "memory"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// File-based store (production)
    File {
        path: PathBuf,
    },
    /// Memory-based store (testing/development)
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from("/var/spool/postroom"),
        }
    }
}

impl StoreConfig {
    /// Convert the configuration into a concrete store
    ///
    /// Returns an Arc'd trait object that can be used polymorphically
    /// throughout the application.
    ///
    /// # Errors
    /// If file store initialization fails (path validation, directory
    /// creation, permissions).
    pub async fn into_store(self) -> crate::Result<Arc<dyn MessageStore>> {
        Ok(match self {
            Self::File { path } => Arc::new(FileMessageStore::open(path).await?),
            Self::Memory => Arc::new(MemoryMessageStore::new()),
        })
    }
}
