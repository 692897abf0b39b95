//! Per-integration diagnostics providers

use std::sync::Arc;

use dashmap::DashMap;
use ha_config_entries::ConfigEntry;
use ha_registries::DeviceEntry;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::{DiagnosticsError, DiagnosticsResult};

/// Projects an integration's live state into a JSON document.
///
/// Implementations read what the coordinator already holds. They never
/// perform I/O, never mutate state, and return the same output for the same
/// state.
pub trait DiagnosticsProvider: Send + Sync {
    fn config_entry_diagnostics(&self, entry: &ConfigEntry) -> DiagnosticsResult<Value>;

    fn device_diagnostics(
        &self,
        entry: &ConfigEntry,
        _device: &DeviceEntry,
    ) -> DiagnosticsResult<Value> {
        Err(DiagnosticsError::DeviceDiagnosticsUnsupported(
            entry.domain.clone(),
        ))
    }
}

/// Serialize a projection value
pub fn to_diagnostics<T: Serialize + ?Sized>(value: &T) -> DiagnosticsResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Domain -> provider lookup
#[derive(Default)]
pub struct DiagnosticsRegistry {
    providers: DashMap<String, Arc<dyn DiagnosticsProvider>>,
}

impl DiagnosticsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, domain: impl Into<String>, provider: Arc<dyn DiagnosticsProvider>) {
        let domain = domain.into();
        debug!("Registered diagnostics provider for domain: {}", domain);
        self.providers.insert(domain, provider);
    }

    pub fn get(&self, domain: &str) -> Option<Arc<dyn DiagnosticsProvider>> {
        self.providers.get(domain).map(|r| Arc::clone(r.value()))
    }

    pub fn has_provider(&self, domain: &str) -> bool {
        self.providers.contains_key(domain)
    }

    /// Registered domains, sorted
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<_> = self.providers.iter().map(|r| r.key().clone()).collect();
        domains.sort();
        domains
    }
}
