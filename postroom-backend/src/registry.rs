use std::{collections::HashMap, sync::Arc};

use crate::{error::ConfigurationError, r#trait::Backend};

/// Alias-keyed registry of delivery backends.
///
/// Built and validated once at startup, then shared read-only with every
/// worker component. Messages select a backend by alias; an empty alias
/// selects the process-wide default.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
    default_alias: String,
}

impl BackendRegistry {
    #[must_use]
    pub fn new(default_alias: impl Into<String>) -> Self {
        Self {
            backends: HashMap::new(),
            default_alias: default_alias.into(),
        }
    }

    /// Register a backend under `alias`, replacing any previous registration.
    pub fn register(&mut self, alias: impl Into<String>, backend: Arc<dyn Backend>) {
        self.backends.insert(alias.into(), backend);
    }

    /// Fail-fast wiring check, run at startup.
    ///
    /// # Errors
    /// If no backends are registered, or the default alias is not among
    /// them.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.backends.is_empty() {
            return Err(ConfigurationError::NoBackends);
        }

        if !self.backends.contains_key(&self.default_alias) {
            return Err(ConfigurationError::UnknownAlias(self.default_alias.clone()));
        }

        Ok(())
    }

    /// Resolve an alias to its backend. An empty alias resolves to the
    /// default backend.
    ///
    /// # Errors
    /// If the (non-empty) alias is not registered.
    pub fn resolve(&self, alias: &str) -> Result<Arc<dyn Backend>, ConfigurationError> {
        let alias = if alias.is_empty() {
            &self.default_alias
        } else {
            alias
        };

        self.backends
            .get(alias)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownAlias(alias.to_string()))
    }

    #[must_use]
    pub fn default_alias(&self) -> &str {
        &self.default_alias
    }

    /// Registered aliases, sorted for stable logging.
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<_> = self.backends.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }
}
