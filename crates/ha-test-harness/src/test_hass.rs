//! Isolated host for integration tests

use std::sync::Arc;

use ha_config_entries::{ConfigEntries, ConfigEntry, ConfigEntryState, Integration, SetupContext};
use ha_core::State;
use ha_diagnostics::{
    get_config_entry_diagnostics, DiagnosticsPayload, DiagnosticsProvider, DiagnosticsRegistry,
    DiagnosticsResult,
};
use ha_registries::{Registries, Storage};
use ha_state_store::StateStore;
use serde_json::{json, Value};
use tempfile::TempDir;

/// A host with its own temporary config dir, registries and state store
pub struct TestHomeAssistant {
    pub registries: Arc<Registries>,
    pub states: Arc<StateStore>,
    pub config_entries: Arc<ConfigEntries>,
    pub diagnostics: DiagnosticsRegistry,
    config_dir: TempDir,
}

impl TestHomeAssistant {
    pub fn new() -> Self {
        let config_dir = TempDir::new().expect("Failed to create temp config dir");
        let storage = Arc::new(Storage::new(config_dir.path()));
        let registries = Arc::new(Registries::new(Arc::clone(&storage)));
        let states = Arc::new(StateStore::new());
        let ctx = SetupContext::new(Arc::clone(&registries), Arc::clone(&states));

        Self {
            registries,
            states,
            config_entries: Arc::new(ConfigEntries::new(storage, ctx)),
            diagnostics: DiagnosticsRegistry::new(),
            config_dir,
        }
    }

    pub fn config_dir(&self) -> &std::path::Path {
        self.config_dir.path()
    }

    /// Make an integration (and its diagnostics provider) available
    pub fn register(
        &self,
        integration: Arc<dyn Integration>,
        diagnostics: Option<Arc<dyn DiagnosticsProvider>>,
    ) {
        if let Some(provider) = diagnostics {
            self.diagnostics.register(integration.domain(), provider);
        }
        self.config_entries.register_integration(integration);
    }

    /// Schedule setup of an entry and wait for it to settle
    pub async fn setup(&self, entry_id: &str) -> ConfigEntryState {
        self.config_entries.schedule_setup(entry_id).await;
        self.block_till_done().await;
        self.entry(entry_id).state
    }

    pub async fn unload(&self, entry_id: &str) -> ConfigEntryState {
        self.config_entries
            .unload(entry_id)
            .await
            .unwrap_or_else(|e| panic!("Failed to unload {}: {}", entry_id, e))
    }

    pub async fn block_till_done(&self) {
        self.config_entries.block_till_done().await;
    }

    pub fn entry(&self, entry_id: &str) -> ConfigEntry {
        self.config_entries
            .get(entry_id)
            .unwrap_or_else(|| panic!("Unknown config entry {}", entry_id))
    }

    pub fn get_state(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id)
    }

    /// Assert that an entity is in a specific state
    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.states.get_state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }

    /// Registry entries and current states of every entity an entry
    /// created, in registration order.
    ///
    /// Generated ids and timestamps are left out so the result can be
    /// compared against a stored snapshot.
    pub fn entity_snapshot(&self, entry_id: &str) -> Value {
        let entities: Vec<Value> = self
            .registries
            .entities
            .entries_for_config_entry(entry_id)
            .iter()
            .map(|entity| {
                let device = entity
                    .device_id
                    .as_deref()
                    .and_then(|id| self.registries.devices.get(id));
                let state = self.states.get(&entity.entity_id);
                json!({
                    "entity_id": entity.entity_id,
                    "unique_id": entity.unique_id,
                    "platform": entity.platform,
                    "original_name": entity.original_name,
                    "device": device.as_ref().and_then(|d| d.name.clone()),
                    "device_class": entity.original_device_class,
                    "unit_of_measurement": entity.unit_of_measurement,
                    "entity_category": entity.entity_category,
                    "state": state.as_ref().map(|s| s.state.clone()),
                    "attributes": state.map(|s| Value::Object(s.attributes)),
                })
            })
            .collect();
        Value::Array(entities)
    }

    /// Full diagnostics download for an entry
    pub fn diagnostics_payload(&self, entry_id: &str) -> DiagnosticsResult<DiagnosticsPayload> {
        get_config_entry_diagnostics(&self.config_entries, &self.diagnostics, entry_id)
    }

    /// Just the integration's projection
    pub fn diagnostics(&self, entry_id: &str) -> DiagnosticsResult<Value> {
        self.diagnostics_payload(entry_id).map(|payload| payload.data)
    }
}

impl Default for TestHomeAssistant {
    fn default() -> Self {
        Self::new()
    }
}
