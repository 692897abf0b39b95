//! Home Assistant Registries
//!
//! Persistent catalogs of what integrations have created:
//! - Entities (EntityRegistry)
//! - Devices (DeviceRegistry)
//!
//! Both use JSON persistence in the `.storage/` directory with versioning.

pub mod storage;

pub mod device_registry;
pub mod entity_registry;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

pub use entity_registry::{
    DisabledBy, EntityCategory, EntityEntry, EntityRegistry, EntityRegistryData,
    EntityRegistryError,
};

pub use device_registry::{
    DeviceEntry, DeviceIdentifier, DeviceInfo, DeviceRegistry, DeviceRegistryData,
};

use std::sync::Arc;

/// All registries bundled together
pub struct Registries {
    pub storage: Arc<Storage>,
    pub entities: Arc<EntityRegistry>,
    pub devices: Arc<DeviceRegistry>,
}

impl Registries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            entities: Arc::new(EntityRegistry::new(storage.clone())),
            devices: Arc::new(DeviceRegistry::new(storage.clone())),
            storage,
        }
    }

    pub async fn load_all(&self) -> StorageResult<()> {
        self.entities.load().await?;
        self.devices.load().await?;
        Ok(())
    }

    pub async fn save_all(&self) -> StorageResult<()> {
        self.entities.save().await?;
        self.devices.save().await?;
        Ok(())
    }

    /// Drop everything a config entry created
    pub fn clear_config_entry(&self, config_entry_id: &str) {
        self.entities.clear_config_entry(config_entry_id);
        self.devices.clear_config_entry(config_entry_id);
    }
}
