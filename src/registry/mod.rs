// Provider registry
// Keeps every registered lamp provider and hands out shared handles by id

pub mod memory;
pub mod provider;

pub use memory::MemoryProvider;
pub use provider::{Change, Group, Lamp, Provider, ProviderError};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Errors raised by registry lookups and registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("provider {0} does not exist")]
    UnknownProvider(String),

    #[error("provider {0} is already registered")]
    DuplicateProvider(String),
}

/// Registry of lamp providers keyed by their id
///
/// Built once at startup, then shared (`Arc<Registry>`) with the sequencer
/// and whatever control surface sits in front of it.
#[derive(Default)]
pub struct Registry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
    closed: AtomicBool,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider. Ids must be unique.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<(), RegistryError> {
        let id = provider.id().to_string();
        if self.providers.contains_key(&id) {
            return Err(RegistryError::DuplicateProvider(id));
        }
        tracing::debug!(provider = %id, "provider registered");
        self.providers.insert(id, provider);
        Ok(())
    }

    /// All registered providers, ordered by id
    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.providers.values().cloned().collect()
    }

    /// Look up a provider by id
    pub fn get_provider(&self, id: &str) -> Result<Arc<dyn Provider>, RegistryError> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProvider(id.to_string()))
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Close every provider. Only the first call has an effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for (id, provider) in &self.providers {
            tracing::debug!(provider = %id, "closing provider");
            provider.close();
        }
    }
}
