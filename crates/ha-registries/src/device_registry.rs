//! Device Registry
//!
//! Tracks the physical or logical devices that integrations attach their
//! entities to. Devices are matched on `(domain, id)` identifiers.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

pub const STORAGE_KEY: &str = "core.device_registry";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 12;

/// A device identifier (domain, id) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceIdentifier(pub String, pub String);

impl DeviceIdentifier {
    pub fn new(domain: impl Into<String>, id: impl Into<String>) -> Self {
        Self(domain.into(), id.into())
    }

    pub fn domain(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.1
    }
}

/// Device description supplied by an integration when adding entities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<DeviceIdentifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl DeviceInfo {
    pub fn new(domain: &str, id: &str) -> Self {
        Self {
            identifiers: vec![DeviceIdentifier::new(domain, id)],
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn sw_version(mut self, version: impl Into<String>) -> Self {
        self.sw_version = Some(version.into());
        self
    }

    pub fn hw_version(mut self, version: impl Into<String>) -> Self {
        self.hw_version = Some(version.into());
        self
    }

    pub fn serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }
}

/// A registered device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: String,
    pub config_entries: Vec<String>,
    pub identifiers: Vec<DeviceIdentifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    fn from_info(config_entry_id: &str, info: &DeviceInfo) -> Self {
        let now = Utc::now();
        let mut entry = Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            config_entries: vec![config_entry_id.to_string()],
            identifiers: Vec::new(),
            name: None,
            manufacturer: None,
            model: None,
            sw_version: None,
            hw_version: None,
            serial_number: None,
            created_at: now,
            modified_at: now,
        };
        entry.merge(info);
        entry
    }

    /// Merge newer integration-supplied info into this entry.
    /// Fields the integration leaves unset keep their stored value.
    fn merge(&mut self, info: &DeviceInfo) {
        for identifier in &info.identifiers {
            if !self.identifiers.contains(identifier) {
                self.identifiers.push(identifier.clone());
            }
        }
        let fields = [
            (&mut self.name, &info.name),
            (&mut self.manufacturer, &info.manufacturer),
            (&mut self.model, &info.model),
            (&mut self.sw_version, &info.sw_version),
            (&mut self.hw_version, &info.hw_version),
            (&mut self.serial_number, &info.serial_number),
        ];
        for (stored, incoming) in fields {
            if incoming.is_some() {
                stored.clone_from(incoming);
            }
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    pub devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

pub struct DeviceRegistry {
    storage: Arc<Storage>,

    /// device id -> entry, registration order
    devices: RwLock<IndexMap<String, Arc<DeviceEntry>>>,

    /// identifier -> device id
    by_identifier: DashMap<DeviceIdentifier, String>,
}

impl DeviceRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            devices: RwLock::new(IndexMap::new()),
            by_identifier: DashMap::new(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load::<DeviceRegistryData>().await? {
            info!("Loading {} devices from storage", data.devices.len());
            for device in data.devices {
                self.index(Arc::new(device));
            }
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let data = DeviceRegistryData {
            devices: self.iter().iter().map(|d| (**d).clone()).collect(),
        };
        self.storage.save(&data).await?;
        debug!("Saved {} devices to storage", data.devices.len());
        Ok(())
    }

    fn index(&self, device: Arc<DeviceEntry>) {
        for identifier in &device.identifiers {
            self.by_identifier
                .insert(identifier.clone(), device.id.clone());
        }
        if let Ok(mut devices) = self.devices.write() {
            devices.insert(device.id.clone(), device);
        }
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.devices
            .read()
            .ok()
            .and_then(|d| d.get(device_id).cloned())
    }

    pub fn get_by_identifier(&self, domain: &str, id: &str) -> Option<Arc<DeviceEntry>> {
        let device_id = self
            .by_identifier
            .get(&DeviceIdentifier::new(domain, id))
            .map(|r| r.value().clone())?;
        self.get(&device_id)
    }

    /// Get or create a device for a config entry.
    ///
    /// An existing device matching any identifier is updated in place and
    /// linked to the config entry; otherwise a new device is created.
    pub fn get_or_create(&self, config_entry_id: &str, info: &DeviceInfo) -> Arc<DeviceEntry> {
        let existing = info
            .identifiers
            .iter()
            .find_map(|i| self.get_by_identifier(i.domain(), i.id()));

        let device = match existing {
            Some(existing) => {
                let mut device = (*existing).clone();
                device.merge(info);
                if !device.config_entries.iter().any(|c| c == config_entry_id) {
                    device.config_entries.push(config_entry_id.to_string());
                }
                device.modified_at = Utc::now();
                debug!("Updated existing device: {}", device.id);
                device
            }
            None => {
                let device = DeviceEntry::from_info(config_entry_id, info);
                info!(
                    "Registered new device: {} ({})",
                    device.display_name(),
                    device.id
                );
                device
            }
        };

        let device = Arc::new(device);
        self.index(Arc::clone(&device));
        device
    }

    pub fn devices_for_config_entry(&self, config_entry_id: &str) -> Vec<Arc<DeviceEntry>> {
        self.iter()
            .into_iter()
            .filter(|d| d.config_entries.iter().any(|c| c == config_entry_id))
            .collect()
    }

    /// Unlink a config entry from its devices, removing orphaned devices.
    /// Returns the ids of removed devices.
    pub fn clear_config_entry(&self, config_entry_id: &str) -> Vec<String> {
        let mut removed = Vec::new();
        for device in self.devices_for_config_entry(config_entry_id) {
            let mut updated = (*device).clone();
            updated.config_entries.retain(|c| c != config_entry_id);

            if updated.config_entries.is_empty() {
                for identifier in &updated.identifiers {
                    self.by_identifier.remove(identifier);
                }
                if let Ok(mut devices) = self.devices.write() {
                    devices.shift_remove(&updated.id);
                }
                info!("Removed device: {}", updated.id);
                removed.push(updated.id);
            } else {
                updated.modified_at = Utc::now();
                self.index(Arc::new(updated));
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.devices.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Vec<Arc<DeviceEntry>> {
        self.devices
            .read()
            .map(|d| d.values().cloned().collect())
            .unwrap_or_default()
    }
}
