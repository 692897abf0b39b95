//! Retrieval of diagnostics documents for config entries and devices

use ha_config_entries::{ConfigEntries, ConfigEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::provider::{DiagnosticsProvider, DiagnosticsRegistry};
use crate::{DiagnosticsError, DiagnosticsResult};

/// Facts about the running host included with every download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeAssistantInfo {
    pub version: String,
    pub os_name: String,
    pub arch: String,
}

impl HomeAssistantInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            os_name: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationManifest {
    pub domain: String,
}

/// A complete diagnostics download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsPayload {
    pub home_assistant: HomeAssistantInfo,
    pub integration_manifest: IntegrationManifest,
    pub data: Value,
}

impl DiagnosticsPayload {
    fn new(domain: &str, data: Value) -> Self {
        Self {
            home_assistant: HomeAssistantInfo::current(),
            integration_manifest: IntegrationManifest {
                domain: domain.to_string(),
            },
            data,
        }
    }
}

/// Look up a loaded entry and the provider for its domain
fn loaded_entry_and_provider(
    entries: &ConfigEntries,
    registry: &DiagnosticsRegistry,
    entry_id: &str,
) -> DiagnosticsResult<(ConfigEntry, std::sync::Arc<dyn DiagnosticsProvider>)> {
    let entry = entries
        .get(entry_id)
        .ok_or_else(|| DiagnosticsError::EntryNotFound(entry_id.to_string()))?;

    if !entry.is_loaded() {
        return Err(DiagnosticsError::NotLoaded {
            entry_id: entry_id.to_string(),
            state: entry.state,
        });
    }

    let provider = registry
        .get(&entry.domain)
        .ok_or_else(|| DiagnosticsError::NoProvider(entry.domain.clone()))?;

    Ok((entry, provider))
}

/// Diagnostics for a config entry
#[instrument(skip(entries, registry))]
pub fn get_config_entry_diagnostics(
    entries: &ConfigEntries,
    registry: &DiagnosticsRegistry,
    entry_id: &str,
) -> DiagnosticsResult<DiagnosticsPayload> {
    let (entry, provider) = loaded_entry_and_provider(entries, registry, entry_id)?;
    let data = provider.config_entry_diagnostics(&entry)?;
    debug!(domain = %entry.domain, "Generated config entry diagnostics");
    Ok(DiagnosticsPayload::new(&entry.domain, data))
}

/// Diagnostics for one device of a config entry
#[instrument(skip(entries, registry))]
pub fn get_device_diagnostics(
    entries: &ConfigEntries,
    registry: &DiagnosticsRegistry,
    entry_id: &str,
    device_id: &str,
) -> DiagnosticsResult<DiagnosticsPayload> {
    let (entry, provider) = loaded_entry_and_provider(entries, registry, entry_id)?;

    let device = entries
        .context()
        .registries
        .devices
        .get(device_id)
        .filter(|device| device.config_entries.contains(&entry.entry_id))
        .ok_or_else(|| DiagnosticsError::DeviceNotFound(device_id.to_string()))?;

    let data = provider.device_diagnostics(&entry, &device)?;
    debug!(domain = %entry.domain, "Generated device diagnostics");
    Ok(DiagnosticsPayload::new(&entry.domain, data))
}
