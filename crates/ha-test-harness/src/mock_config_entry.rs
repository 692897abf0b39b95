//! Mock config entry for testing

use ha_config_entries::{ConfigEntry, ConfigEntryDisabledBy, ConfigEntrySource};
use serde_json::{Map, Value};

use crate::TestHomeAssistant;

/// Builder for a config entry with stable identifying data.
///
/// Entry ids default to a fresh ULID; tests that snapshot anything keyed
/// by the entry should set one with [`with_entry_id`](Self::with_entry_id).
#[derive(Debug, Clone)]
pub struct MockConfigEntry {
    pub entry_id: String,
    pub domain: String,
    pub title: String,
    pub data: Map<String, Value>,
    pub options: Map<String, Value>,
    pub unique_id: Option<String>,
    pub version: u32,
    pub minor_version: u32,
    pub source: ConfigEntrySource,
    pub disabled_by: Option<ConfigEntryDisabledBy>,
}

impl MockConfigEntry {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: "Mock Title".to_string(),
            data: Map::new(),
            options: Map::new(),
            unique_id: None,
            version: 1,
            minor_version: 1,
            source: ConfigEntrySource::User,
            disabled_by: None,
        }
    }

    pub fn with_entry_id(mut self, entry_id: impl Into<String>) -> Self {
        self.entry_id = entry_id.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Replace the data with the fields of a JSON object
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    pub fn with_data_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    pub fn with_version(mut self, version: u32, minor_version: u32) -> Self {
        self.version = version;
        self.minor_version = minor_version;
        self
    }

    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled_by = Some(ConfigEntryDisabledBy::User);
        self
    }

    pub fn to_config_entry(&self) -> ConfigEntry {
        let mut entry = ConfigEntry::new(&self.domain, &self.title)
            .with_entry_id(&self.entry_id)
            .with_data(self.data.clone())
            .with_options(self.options.clone())
            .with_source(self.source.clone())
            .with_version(self.version, self.minor_version);
        entry.unique_id = self.unique_id.clone();
        entry.disabled_by = self.disabled_by;
        entry
    }

    /// Register the entry with the host, without setting it up
    pub async fn add_to_hass(&self, hass: &TestHomeAssistant) -> ConfigEntry {
        hass.config_entries
            .add(self.to_config_entry())
            .await
            .unwrap_or_else(|e| panic!("Failed to add mock entry {}: {}", self.entry_id, e))
    }
}

impl Default for MockConfigEntry {
    fn default() -> Self {
        Self::new("test")
    }
}
