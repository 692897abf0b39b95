//! Config Entries Manager
//!
//! Owns every config entry, drives the lifecycle state machine and hands
//! entries to their integrations for setup and unload.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use ha_registries::{Storable, Storage, StorageResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entry::{ConfigEntry, ConfigEntryState, ConfigEntryUpdate, RuntimeData};
use crate::integration::{Integration, SetupContext, SetupError};
use crate::state_machine::{calculate_retry_delay, InvalidTransition};

/// Storage key for config entries
pub const STORAGE_KEY: &str = "core.config_entries";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 5;

/// Reason recorded when no integration is registered for an entry's domain
pub const INTEGRATION_NOT_FOUND: &str = "Integration not found";

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("Cannot set up entry in state {0:?}")]
    CannotSetup(ConfigEntryState),

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Storage error: {0}")]
    Storage(#[from] ha_registries::StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config entries data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Config Entries Manager
///
/// Entries are indexed by id, by domain and by `(domain, unique_id)`.
/// Setup and unload are serialized through a single lock so an entry never
/// sees two lifecycle operations at once.
pub struct ConfigEntries {
    storage: Arc<Storage>,

    ctx: SetupContext,

    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: domain -> set of entry_ids
    by_domain: DashMap<String, HashSet<String>>,

    /// Index: (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,

    setup_lock: Mutex<()>,

    /// Registered integrations by domain
    integrations: DashMap<String, Arc<dyn Integration>>,

    /// Setups started by `schedule_setup` that nobody has awaited yet
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>, ctx: SetupContext) -> Self {
        Self {
            storage,
            ctx,
            entries: DashMap::new(),
            by_domain: DashMap::new(),
            by_unique_id: DashMap::new(),
            setup_lock: Mutex::new(()),
            integrations: DashMap::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Host services shared with integrations
    pub fn context(&self) -> &SetupContext {
        &self.ctx
    }

    /// Load entries from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load::<ConfigEntriesData>().await? {
            info!("Loading {} config entries from storage", data.entries.len());
            for entry in data.entries {
                self.index_entry(entry);
            }
        }
        Ok(())
    }

    /// Save entries to storage
    pub async fn save(&self) -> StorageResult<()> {
        let data = ConfigEntriesData {
            entries: self.entries(),
        };
        self.storage.save(&data).await?;
        debug!("Saved {} config entries to storage", data.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: ConfigEntry) {
        let entry_id = entry.entry_id.clone();

        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry_id.clone());

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert((entry.domain.clone(), unique_id.clone()), entry_id.clone());
        }

        self.entries.insert(entry_id, entry);
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }

        self.entries.remove(&entry.entry_id);
    }

    /// Get an entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Get all entries for a domain
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        let mut entries: Vec<_> = self
            .by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        entries
    }

    /// Get loaded entries for a domain
    pub fn get_loaded_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.get_by_domain(domain)
            .into_iter()
            .filter(|e| e.is_loaded())
            .collect()
    }

    pub fn get_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        self.by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))
            .and_then(|entry_id| self.get(&entry_id))
    }

    /// All entries ordered by domain, then creation time
    pub fn entries(&self) -> Vec<ConfigEntry> {
        let mut entries: Vec<_> = self.entries.iter().map(|r| r.value().clone()).collect();
        entries.sort_by(|a, b| {
            a.domain
                .cmp(&b.domain)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        entries
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.entry_id).collect()
    }

    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<_> = self
            .by_domain
            .iter()
            .filter(|r| !r.value().is_empty())
            .map(|r| r.key().clone())
            .collect();
        domains.sort();
        domains
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a new config entry
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(ref unique_id) = entry.unique_id {
            if self.get_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.index_entry(entry.clone());
        self.save().await?;

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );

        Ok(entry)
    }

    /// Update an existing entry
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if let Some(Some(ref unique_id)) = update.unique_id {
            if let Some(other) = self.get_by_unique_id(&entry.domain, unique_id) {
                if other.entry_id != entry.entry_id {
                    return Err(ConfigEntriesError::AlreadyExists {
                        domain: entry.domain.clone(),
                        unique_id: unique_id.clone(),
                    });
                }
            }
        }

        self.unindex_entry(&entry);

        let mut updated = entry;
        if let Some(title) = update.title {
            updated.title = title;
        }
        if let Some(data) = update.data {
            updated.data = data;
        }
        if let Some(options) = update.options {
            updated.options = options;
        }
        if let Some(unique_id) = update.unique_id {
            updated.unique_id = unique_id;
        }
        if let Some(pref) = update.pref_disable_polling {
            updated.pref_disable_polling = pref;
        }
        if let Some(disabled_by) = update.disabled_by {
            updated.disabled_by = disabled_by;
        }
        updated.modified_at = Utc::now();

        self.index_entry(updated.clone());
        self.save().await?;

        debug!("Updated config entry: {}", entry_id);
        Ok(updated)
    }

    /// Remove an entry, unloading it first and dropping everything it
    /// registered
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.state != ConfigEntryState::NotLoaded && entry.state.is_recoverable() {
            self.unload(entry_id).await?;
        }

        self.remove_entity_states(entry_id);
        self.ctx.registries.clear_config_entry(entry_id);
        self.ctx.registries.save_all().await?;

        self.unindex_entry(&entry);
        self.save().await?;

        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );

        Ok(entry)
    }

    /// Register the integration that serves `integration.domain()`
    pub fn register_integration(&self, integration: Arc<dyn Integration>) {
        let domain = integration.domain().to_string();
        debug!("Registered integration for domain: {}", domain);
        self.integrations.insert(domain, integration);
    }

    pub fn integration(&self, domain: &str) -> Option<Arc<dyn Integration>> {
        self.integrations.get(domain).map(|r| Arc::clone(r.value()))
    }

    /// Apply a mutation to a stored entry
    fn with_entry_mut<R>(
        &self,
        entry_id: &str,
        f: impl FnOnce(&mut ConfigEntry) -> Result<R, InvalidTransition>,
    ) -> ConfigEntriesResult<R> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        Ok(f(entry.value_mut())?)
    }

    fn transition(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self.with_entry_mut(entry_id, |entry| {
            entry.try_set_state(state, reason)?;
            Ok(entry.clone())
        })?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(entry)
    }

    /// Set up an entry and return the state it ends in.
    ///
    /// Integration failures do not surface as errors: a not-ready
    /// integration leaves the entry in `SetupRetry`, any other failure in
    /// `SetupError`. Errors are reserved for unknown entries and illegal
    /// transitions.
    pub async fn setup(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntryState> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if entry.is_disabled() {
            debug!("Skipping setup for disabled entry: {}", entry_id);
            return Ok(entry.state);
        }
        if !entry.state.can_setup() {
            return Err(ConfigEntriesError::CannotSetup(entry.state));
        }

        let entry = self.transition(entry_id, ConfigEntryState::SetupInProgress, None)?;

        let Some(integration) = self.integration(&entry.domain) else {
            warn!(
                "Error setting up entry {} for {}: {}",
                entry.title, entry.domain, INTEGRATION_NOT_FOUND
            );
            self.transition(
                entry_id,
                ConfigEntryState::SetupError,
                Some(INTEGRATION_NOT_FOUND.to_string()),
            )?;
            return Ok(ConfigEntryState::SetupError);
        };

        match integration.async_setup_entry(&self.ctx, &entry).await {
            Ok(runtime_data) => {
                self.with_entry_mut(entry_id, |entry| {
                    entry.try_set_state(ConfigEntryState::Loaded, None)?;
                    entry.runtime_data = runtime_data;
                    Ok(())
                })?;
                info!("Setup completed for entry: {} ({})", entry.title, entry_id);
                Ok(ConfigEntryState::Loaded)
            }
            Err(SetupError::NotReady(reason)) => {
                let (tries, delay) = self.with_entry_mut(entry_id, |entry| {
                    entry.try_set_state(ConfigEntryState::SetupRetry, Some(reason.clone()))?;
                    let delay = calculate_retry_delay(entry.tries);
                    entry.next_retry_delay = Some(delay);
                    Ok((entry.increment_tries(), delay))
                })?;
                info!(
                    tries,
                    "Config entry '{}' for {} integration not ready yet: {}; retrying in background in {:.0} seconds",
                    entry.title,
                    entry.domain,
                    reason,
                    delay.as_secs_f64()
                );
                Ok(ConfigEntryState::SetupRetry)
            }
            Err(err) => {
                warn!(
                    "Error setting up entry {} for {}: {}",
                    entry.title, entry.domain, err
                );
                self.transition(entry_id, ConfigEntryState::SetupError, Some(err.to_string()))?;
                Ok(ConfigEntryState::SetupError)
            }
        }
    }

    /// Unload an entry and return the state it ends in.
    ///
    /// Only a loaded entry calls back into its integration; entries that
    /// never finished setup go straight back to `NotLoaded`. Entity states
    /// are removed, registry entries are kept.
    pub async fn unload(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntryState> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        match entry.state {
            ConfigEntryState::NotLoaded => return Ok(ConfigEntryState::NotLoaded),
            state if !state.is_recoverable() => {
                return Err(ConfigEntriesError::CannotUnload(state));
            }
            _ => {}
        }

        let was_loaded = entry.is_loaded();
        let entry = self.transition(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        let unloaded = match self.integration(&entry.domain) {
            Some(integration) if was_loaded => {
                integration.async_unload_entry(&self.ctx, &entry).await
            }
            _ => true,
        };

        if !unloaded {
            warn!("Failed to unload entry: {} ({})", entry.title, entry_id);
            self.transition(
                entry_id,
                ConfigEntryState::FailedUnload,
                Some("Unload failed".to_string()),
            )?;
            return Ok(ConfigEntryState::FailedUnload);
        }

        self.with_entry_mut(entry_id, |entry| {
            entry.try_set_state(ConfigEntryState::NotLoaded, None)?;
            entry.runtime_data = RuntimeData::none();
            Ok(())
        })?;
        self.remove_entity_states(entry_id);

        info!("Unloaded entry: {} ({})", entry.title, entry_id);
        Ok(ConfigEntryState::NotLoaded)
    }

    /// Reload an entry (unload + setup)
    pub async fn reload(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntryState> {
        self.unload(entry_id).await?;
        self.setup(entry_id).await
    }

    fn remove_entity_states(&self, entry_id: &str) {
        for entity in self.ctx.registries.entities.entries_for_config_entry(entry_id) {
            self.ctx.states.remove(&entity.entity_id);
        }
    }

    /// Start setting up an entry in the background.
    ///
    /// The task is tracked until [`block_till_done`](Self::block_till_done)
    /// awaits it.
    pub async fn schedule_setup(self: &Arc<Self>, entry_id: &str) {
        let manager = Arc::clone(self);
        let entry_id = entry_id.to_string();
        let handle = tokio::spawn(async move {
            if let Err(err) = manager.setup(&entry_id).await {
                warn!("Scheduled setup of {} failed: {}", entry_id, err);
            }
        });
        self.pending.lock().await.push(handle);
    }

    /// Wait until every scheduled setup has finished, including setups
    /// scheduled while waiting
    pub async fn block_till_done(&self) {
        loop {
            let handles = std::mem::take(&mut *self.pending.lock().await);
            if handles.is_empty() {
                break;
            }
            for result in futures::future::join_all(handles).await {
                if let Err(err) = result {
                    warn!("Scheduled setup task panicked: {}", err);
                }
            }
        }
    }

    /// Schedule setup of every enabled entry and wait for all of them
    pub async fn setup_all(self: &Arc<Self>) {
        for entry in self.entries() {
            if !entry.is_disabled() && entry.state.can_setup() {
                self.schedule_setup(&entry.entry_id).await;
            }
        }
        self.block_till_done().await;
    }

    /// Unload every loaded entry
    pub async fn unload_all(&self) {
        for entry in self.entries() {
            if entry.state == ConfigEntryState::NotLoaded || !entry.state.is_recoverable() {
                continue;
            }
            if let Err(err) = self.unload(&entry.entry_id).await {
                warn!("Error unloading {}: {}", entry.entry_id, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ConfigEntrySource;
    use async_trait::async_trait;
    use ha_core::{Attributes, EntityId};
    use ha_registries::Registries;
    use ha_state_store::StateStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Integration whose setup outcome is fixed at construction
    struct FakeIntegration {
        outcome: Result<(), SetupError>,
        unload_ok: bool,
        setups: AtomicUsize,
    }

    impl FakeIntegration {
        fn new(outcome: Result<(), SetupError>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                unload_ok: true,
                setups: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Integration for FakeIntegration {
        fn domain(&self) -> &str {
            "fake"
        }

        async fn async_setup_entry(
            &self,
            ctx: &SetupContext,
            entry: &ConfigEntry,
        ) -> Result<RuntimeData, SetupError> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()?;

            let registered = ctx.registries.entities.get_or_create(
                "sensor",
                "fake",
                "fake_value",
                "Fake value",
                Some(&entry.entry_id),
                None,
            );
            let entity_id: EntityId = registered.entity_id.parse().unwrap();
            ctx.states.set(&entity_id, "1", Attributes::new());

            Ok(RuntimeData::new(entry.title.clone()))
        }

        async fn async_unload_entry(&self, _ctx: &SetupContext, _entry: &ConfigEntry) -> bool {
            self.unload_ok
        }
    }

    fn create_test_manager() -> (TempDir, Arc<ConfigEntries>) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));
        let ctx = SetupContext::new(
            Arc::new(Registries::new(storage.clone())),
            Arc::new(StateStore::new()),
        );
        let manager = Arc::new(ConfigEntries::new(storage, ctx));
        (temp_dir, manager)
    }

    #[tokio::test]
    async fn test_add_entry() {
        let (_dir, manager) = create_test_manager();

        let entry = ConfigEntry::new("serial_bridge", "Bridge")
            .with_unique_id("bridge-001")
            .with_source(ConfigEntrySource::Usb);

        let added = manager.add(entry).await.unwrap();
        assert_eq!(added.domain, "serial_bridge");
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.domains(), vec!["serial_bridge"]);
    }

    #[tokio::test]
    async fn test_duplicate_unique_id_rejected() {
        let (_dir, manager) = create_test_manager();

        let entry1 = ConfigEntry::new("fake", "One").with_unique_id("same-id");
        let entry2 = ConfigEntry::new("fake", "Two").with_unique_id("same-id");
        let other_domain = ConfigEntry::new("other", "Three").with_unique_id("same-id");

        manager.add(entry1).await.unwrap();
        let result = manager.add(entry2).await;
        assert!(matches!(
            result,
            Err(ConfigEntriesError::AlreadyExists { .. })
        ));
        manager.add(other_domain).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_by_domain() {
        let (_dir, manager) = create_test_manager();

        manager.add(ConfigEntry::new("fake", "Fake 1")).await.unwrap();
        manager.add(ConfigEntry::new("fake", "Fake 2")).await.unwrap();
        manager.add(ConfigEntry::new("other", "Other")).await.unwrap();

        assert_eq!(manager.get_by_domain("fake").len(), 2);
        assert_eq!(manager.get_by_domain("other").len(), 1);
        assert!(manager.get_by_domain("missing").is_empty());
    }

    #[tokio::test]
    async fn test_update_entry() {
        let (_dir, manager) = create_test_manager();

        let entry = manager
            .add(ConfigEntry::new("fake", "Old Name"))
            .await
            .unwrap();

        let updated = manager
            .update(&entry.entry_id, ConfigEntryUpdate::new().title("New Name"))
            .await
            .unwrap();

        assert_eq!(updated.title, "New Name");
        assert_eq!(manager.get(&entry.entry_id).unwrap().title, "New Name");
    }

    #[tokio::test]
    async fn test_setup_success_attaches_runtime_data() {
        let (_dir, manager) = create_test_manager();
        manager.register_integration(FakeIntegration::new(Ok(())));

        let entry = manager.add(ConfigEntry::new("fake", "Test")).await.unwrap();
        let state = manager.setup(&entry.entry_id).await.unwrap();
        assert_eq!(state, ConfigEntryState::Loaded);

        let loaded = manager.get(&entry.entry_id).unwrap();
        assert!(loaded.is_loaded());
        assert_eq!(loaded.runtime_data::<String>().unwrap().as_str(), "Test");
        assert!(manager.context().states.is_state("sensor.fake_value", "1"));
    }

    #[tokio::test]
    async fn test_setup_not_ready_goes_to_retry() {
        let (_dir, manager) = create_test_manager();
        let integration = FakeIntegration::new(Err(SetupError::NotReady(
            "Connection refused".into(),
        )));
        manager.register_integration(integration.clone());

        let entry = manager.add(ConfigEntry::new("fake", "Test")).await.unwrap();
        assert_eq!(
            manager.setup(&entry.entry_id).await.unwrap(),
            ConfigEntryState::SetupRetry
        );
        assert_eq!(
            manager.setup(&entry.entry_id).await.unwrap(),
            ConfigEntryState::SetupRetry
        );

        let retrying = manager.get(&entry.entry_id).unwrap();
        assert_eq!(retrying.state, ConfigEntryState::SetupRetry);
        assert_eq!(retrying.reason.as_deref(), Some("Connection refused"));
        assert_eq!(retrying.tries, 2);
        let delay = retrying.next_retry_delay.unwrap().as_secs_f64();
        assert!((10.0..10.2).contains(&delay));
        assert!(!retrying.runtime_data.is_set());
        assert_eq!(integration.setups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_setup_failure_goes_to_error() {
        let (_dir, manager) = create_test_manager();
        manager.register_integration(FakeIntegration::new(Err(SetupError::AuthFailed(
            "bad password".into(),
        ))));

        let entry = manager.add(ConfigEntry::new("fake", "Test")).await.unwrap();
        let state = manager.setup(&entry.entry_id).await.unwrap();

        assert_eq!(state, ConfigEntryState::SetupError);
        let failed = manager.get(&entry.entry_id).unwrap();
        assert_eq!(
            failed.reason.as_deref(),
            Some("Authentication failed: bad password")
        );
    }

    #[tokio::test]
    async fn test_setup_without_integration() {
        let (_dir, manager) = create_test_manager();

        let entry = manager.add(ConfigEntry::new("nothing", "Test")).await.unwrap();
        let state = manager.setup(&entry.entry_id).await.unwrap();

        assert_eq!(state, ConfigEntryState::SetupError);
        assert_eq!(
            manager.get(&entry.entry_id).unwrap().reason.as_deref(),
            Some(INTEGRATION_NOT_FOUND)
        );
    }

    #[tokio::test]
    async fn test_setup_loaded_entry_is_rejected() {
        let (_dir, manager) = create_test_manager();
        manager.register_integration(FakeIntegration::new(Ok(())));

        let entry = manager.add(ConfigEntry::new("fake", "Test")).await.unwrap();
        manager.setup(&entry.entry_id).await.unwrap();

        assert!(matches!(
            manager.setup(&entry.entry_id).await,
            Err(ConfigEntriesError::CannotSetup(ConfigEntryState::Loaded))
        ));
    }

    #[tokio::test]
    async fn test_disabled_entry_is_skipped() {
        let (_dir, manager) = create_test_manager();
        let integration = FakeIntegration::new(Ok(()));
        manager.register_integration(integration.clone());

        let entry = manager.add(ConfigEntry::new("fake", "Test")).await.unwrap();
        manager
            .update(
                &entry.entry_id,
                ConfigEntryUpdate::new()
                    .disabled_by(Some(crate::entry::ConfigEntryDisabledBy::User)),
            )
            .await
            .unwrap();

        let state = manager.setup(&entry.entry_id).await.unwrap();
        assert_eq!(state, ConfigEntryState::NotLoaded);
        assert_eq!(integration.setups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unload_clears_runtime_data_and_states() {
        let (_dir, manager) = create_test_manager();
        manager.register_integration(FakeIntegration::new(Ok(())));

        let entry = manager.add(ConfigEntry::new("fake", "Test")).await.unwrap();
        manager.setup(&entry.entry_id).await.unwrap();

        let state = manager.unload(&entry.entry_id).await.unwrap();
        assert_eq!(state, ConfigEntryState::NotLoaded);

        let unloaded = manager.get(&entry.entry_id).unwrap();
        assert!(!unloaded.runtime_data.is_set());
        assert!(manager.context().states.get("sensor.fake_value").is_none());
        // Registry entries outlive an unload
        assert!(manager
            .context()
            .registries
            .entities
            .is_registered("sensor.fake_value"));
    }

    #[tokio::test]
    async fn test_failed_unload_is_terminal() {
        let (_dir, manager) = create_test_manager();
        manager.register_integration(Arc::new(FakeIntegration {
            outcome: Ok(()),
            unload_ok: false,
            setups: AtomicUsize::new(0),
        }));

        let entry = manager.add(ConfigEntry::new("fake", "Test")).await.unwrap();
        manager.setup(&entry.entry_id).await.unwrap();

        assert_eq!(
            manager.unload(&entry.entry_id).await.unwrap(),
            ConfigEntryState::FailedUnload
        );
        assert!(matches!(
            manager.unload(&entry.entry_id).await,
            Err(ConfigEntriesError::CannotUnload(ConfigEntryState::FailedUnload))
        ));
    }

    #[tokio::test]
    async fn test_reload() {
        let (_dir, manager) = create_test_manager();
        let integration = FakeIntegration::new(Ok(()));
        manager.register_integration(integration.clone());

        let entry = manager.add(ConfigEntry::new("fake", "Test")).await.unwrap();
        manager.setup(&entry.entry_id).await.unwrap();
        let state = manager.reload(&entry.entry_id).await.unwrap();

        assert_eq!(state, ConfigEntryState::Loaded);
        assert_eq!(integration.setups.load(Ordering::SeqCst), 2);
        // Same unique id, same entity id
        assert_eq!(manager.context().registries.entities.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_entry_clears_registries() {
        let (_dir, manager) = create_test_manager();
        manager.register_integration(FakeIntegration::new(Ok(())));

        let entry = manager.add(ConfigEntry::new("fake", "Test")).await.unwrap();
        manager.setup(&entry.entry_id).await.unwrap();

        manager.remove(&entry.entry_id).await.unwrap();
        assert!(manager.is_empty());
        assert!(manager.context().registries.entities.is_empty());
        assert!(manager.context().states.get("sensor.fake_value").is_none());
    }

    #[tokio::test]
    async fn test_schedule_setup_and_block_till_done() {
        let (_dir, manager) = create_test_manager();
        let integration = FakeIntegration::new(Ok(()));
        manager.register_integration(integration.clone());

        let first = manager.add(ConfigEntry::new("fake", "First")).await.unwrap();
        let second = manager
            .add(ConfigEntry::new("other", "Second"))
            .await
            .unwrap();

        manager.setup_all().await;

        assert!(manager.get(&first.entry_id).unwrap().is_loaded());
        assert_eq!(
            manager.get(&second.entry_id).unwrap().state,
            ConfigEntryState::SetupError
        );
        assert_eq!(integration.setups.load(Ordering::SeqCst), 1);

        // Nothing pending any more
        manager.block_till_done().await;
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));
        let ctx = SetupContext::new(
            Arc::new(Registries::new(storage.clone())),
            Arc::new(StateStore::new()),
        );

        {
            let manager = ConfigEntries::new(storage.clone(), ctx.clone());
            manager
                .add(
                    ConfigEntry::new("fake", "Test")
                        .with_unique_id("test-123")
                        .with_source(ConfigEntrySource::Import),
                )
                .await
                .unwrap();
        }

        let manager = ConfigEntries::new(storage, ctx);
        manager.load().await.unwrap();

        assert_eq!(manager.len(), 1);
        let entry = manager.get_by_unique_id("fake", "test-123").unwrap();
        assert_eq!(entry.title, "Test");
        assert_eq!(entry.source, ConfigEntrySource::Import);
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
    }
}
