//! Entity Registry
//!
//! Catalog of entities created by integrations. Entities are keyed by
//! entity_id and deduplicated on `(domain, platform, unique_id)`, so a
//! re-setup of the same config entry reuses the ids it created before.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ha_core::slugify;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

#[derive(Debug, Error, Clone)]
pub enum EntityRegistryError {
    #[error("Entity not found: {0}")]
    NotFound(String),
}

/// Storage key for entity registry
pub const STORAGE_KEY: &str = "core.entity_registry";
pub const STORAGE_VERSION: u32 = 1;
pub const STORAGE_MINOR_VERSION: u32 = 19;

/// Reason an entity was disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledBy {
    ConfigEntry,
    Device,
    Integration,
    User,
}

/// Entity category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Config,
    Diagnostic,
}

/// A registered entity entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal ULID
    pub id: String,
    /// Full entity ID (domain.object_id)
    pub entity_id: String,
    /// Integration-provided identifier, stable across restarts
    pub unique_id: String,
    /// Integration domain that provides this entity
    pub platform: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_entry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Name supplied by the integration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    /// If true, the friendly name is prefixed with the device name
    #[serde(default)]
    pub has_entity_name: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_device_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<EntityCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<DisabledBy>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    pub fn new(
        entity_id: impl Into<String>,
        platform: impl Into<String>,
        unique_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.into(),
            unique_id: unique_id.into(),
            platform: platform.into(),
            config_entry_id: None,
            device_id: None,
            original_name: None,
            has_entity_name: false,
            original_device_class: None,
            unit_of_measurement: None,
            entity_category: None,
            original_icon: None,
            translation_key: None,
            disabled_by: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Domain part of the entity_id
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.entity_id)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }
}

/// Entity registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

type UniqueKey = (String, String, String);

/// Entity Registry
///
/// The primary index preserves registration order so listings for a
/// config entry come back in the order the integration added them.
pub struct EntityRegistry {
    storage: Arc<Storage>,

    /// entity_id -> entry
    by_entity_id: RwLock<IndexMap<String, Arc<EntityEntry>>>,

    /// (domain, platform, unique_id) -> entity_id
    by_unique_id: DashMap<UniqueKey, String>,
}

impl EntityRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_entity_id: RwLock::new(IndexMap::new()),
            by_unique_id: DashMap::new(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load::<EntityRegistryData>().await? {
            info!("Loading {} entities from storage", data.entities.len());
            for entry in data.entities {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let data = EntityRegistryData {
            entities: self.iter().iter().map(|e| (**e).clone()).collect(),
        };
        self.storage.save(&data).await?;
        debug!("Saved {} entities to storage", data.entities.len());
        Ok(())
    }

    fn unique_key(entry: &EntityEntry) -> UniqueKey {
        (
            entry.domain().to_string(),
            entry.platform.clone(),
            entry.unique_id.clone(),
        )
    }

    fn index_entry(&self, entry: Arc<EntityEntry>) {
        self.by_unique_id
            .insert(Self::unique_key(&entry), entry.entity_id.clone());
        if let Ok(mut idx) = self.by_entity_id.write() {
            idx.insert(entry.entity_id.clone(), entry);
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .ok()
            .and_then(|idx| idx.get(entity_id).cloned())
    }

    /// Look up the entity_id an integration registered for a unique_id
    pub fn get_entity_id(&self, domain: &str, platform: &str, unique_id: &str) -> Option<String> {
        self.by_unique_id
            .get(&(domain.to_string(), platform.to_string(), unique_id.to_string()))
            .map(|r| r.value().clone())
    }

    /// Get or create an entity entry
    ///
    /// If the `(domain, platform, unique_id)` triple is known the existing
    /// entry is returned untouched. Otherwise a fresh entity_id is generated
    /// from `suggested_object_id`.
    pub fn get_or_create(
        &self,
        domain: &str,
        platform: &str,
        unique_id: &str,
        suggested_object_id: &str,
        config_entry_id: Option<&str>,
        device_id: Option<&str>,
    ) -> Arc<EntityEntry> {
        if let Some(entity_id) = self.get_entity_id(domain, platform, unique_id) {
            if let Some(existing) = self.get(&entity_id) {
                debug!("Found existing entity by unique_id: {}", existing.entity_id);
                return existing;
            }
        }

        let entity_id = self.generate_entity_id(domain, suggested_object_id);
        let mut entry = EntityEntry::new(&entity_id, platform, unique_id);
        entry.config_entry_id = config_entry_id.map(String::from);
        entry.device_id = device_id.map(String::from);

        let entry = Arc::new(entry);
        self.index_entry(Arc::clone(&entry));
        info!("Registered new entity: {}", entity_id);
        entry
    }

    /// Apply a change to an entry and bump `modified_at`
    pub fn update<F>(&self, entity_id: &str, f: F) -> Result<Arc<EntityEntry>, EntityRegistryError>
    where
        F: FnOnce(&mut EntityEntry),
    {
        let mut idx = self
            .by_entity_id
            .write()
            .map_err(|_| EntityRegistryError::NotFound(entity_id.to_string()))?;
        let current = idx
            .get(entity_id)
            .ok_or_else(|| EntityRegistryError::NotFound(entity_id.to_string()))?;

        let mut entry = (**current).clone();
        let old_key = Self::unique_key(&entry);
        f(&mut entry);
        entry.entity_id = entity_id.to_string();
        entry.modified_at = Utc::now();

        let new_key = Self::unique_key(&entry);
        if new_key != old_key {
            self.by_unique_id.remove(&old_key);
            self.by_unique_id.insert(new_key, entity_id.to_string());
        }

        let entry = Arc::new(entry);
        idx.insert(entity_id.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let removed = self
            .by_entity_id
            .write()
            .ok()
            .and_then(|mut idx| idx.shift_remove(entity_id))?;
        self.by_unique_id.remove(&Self::unique_key(&removed));
        info!("Removed entity: {}", entity_id);
        Some(removed)
    }

    /// Entities created by a config entry, in registration order
    pub fn entries_for_config_entry(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        self.iter()
            .into_iter()
            .filter(|e| e.config_entry_id.as_deref() == Some(config_entry_id))
            .collect()
    }

    /// Remove every entity belonging to a config entry
    pub fn clear_config_entry(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        self.entries_for_config_entry(config_entry_id)
            .iter()
            .filter_map(|e| self.remove(&e.entity_id))
            .collect()
    }

    pub fn is_registered(&self, entity_id: &str) -> bool {
        self.by_entity_id
            .read()
            .map(|idx| idx.contains_key(entity_id))
            .unwrap_or(false)
    }

    /// Generate an entity_id that doesn't collide with a registered one.
    ///
    /// The suggestion is slugified; if `domain.slug` is taken, `_2`, `_3`, ...
    /// are appended until a free id is found.
    pub fn generate_entity_id(&self, domain: &str, suggested_object_id: &str) -> String {
        let preferred = format!("{}.{}", domain, slugify(suggested_object_id));
        if !self.is_registered(&preferred) {
            return preferred;
        }

        let mut suffix = 2;
        loop {
            let candidate = format!("{}_{}", preferred, suffix);
            if !self.is_registered(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.by_entity_id.read().map(|idx| idx.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries in registration order
    pub fn iter(&self) -> Vec<Arc<EntityEntry>> {
        self.by_entity_id
            .read()
            .map(|idx| idx.values().cloned().collect())
            .unwrap_or_default()
    }
}
