//! The Home Assistant host
//!
//! Owns the config directory, the registries and state store, the
//! config-entry manager and the diagnostics registry. Entries listed in
//! `configuration.yaml` are imported on startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ha_components::IntegrationBundle;
use ha_config::{ConfigError, EntryConfig, ServerConfig};
use ha_config_entries::{
    ConfigEntries, ConfigEntriesError, ConfigEntry, ConfigEntrySource, ConfigEntryUpdate,
    SetupContext,
};
use ha_diagnostics::{
    get_config_entry_diagnostics, DiagnosticsPayload, DiagnosticsRegistry, DiagnosticsResult,
};
use ha_registries::{Registries, Storage, StorageError};
use ha_state_store::StateStore;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// The central Home Assistant instance
pub struct HomeAssistant {
    pub config_dir: PathBuf,
    pub config: ServerConfig,
    pub registries: Arc<Registries>,
    pub states: Arc<StateStore>,
    pub config_entries: Arc<ConfigEntries>,
    pub diagnostics: Arc<DiagnosticsRegistry>,
}

impl HomeAssistant {
    /// Build a host over `config_dir` without touching the disk
    pub fn new(config_dir: impl Into<PathBuf>, config: ServerConfig) -> Self {
        let config_dir = config_dir.into();
        let storage = Arc::new(Storage::new(&config_dir));
        let registries = Arc::new(Registries::new(Arc::clone(&storage)));
        let states = Arc::new(StateStore::new());
        let ctx = SetupContext::new(Arc::clone(&registries), Arc::clone(&states));

        Self {
            config_dir,
            config,
            registries,
            states,
            config_entries: Arc::new(ConfigEntries::new(storage, ctx)),
            diagnostics: Arc::new(DiagnosticsRegistry::new()),
        }
    }

    /// Read `configuration.yaml` and the `.storage/` files
    pub async fn load(config_dir: &Path) -> ServerResult<Self> {
        let config = ServerConfig::load(config_dir)?;
        let hass = Self::new(config_dir, config);
        hass.registries.load_all().await?;
        hass.config_entries.load().await?;
        info!(
            entries = hass.config_entries.len(),
            "Loaded storage from {:?}",
            hass.config_dir
        );
        Ok(hass)
    }

    pub fn register(&self, bundle: IntegrationBundle) {
        if let Some(provider) = bundle.diagnostics {
            self.diagnostics.register(bundle.integration.domain(), provider);
        }
        self.config_entries.register_integration(bundle.integration);
    }

    pub fn register_all(&self, bundles: impl IntoIterator<Item = IntegrationBundle>) {
        for bundle in bundles {
            self.register(bundle);
        }
    }

    /// Import the entries listed in the configuration.
    ///
    /// An entry whose `(domain, unique_id)` is already stored gets its data
    /// refreshed from the file; everything else is added. Returns the
    /// number of new entries.
    #[instrument(skip(self))]
    pub async fn import_config_entries(&self) -> ServerResult<usize> {
        let mut added = 0;
        for entry_config in &self.config.config_entries {
            let existing = entry_config.unique_id.as_deref().and_then(|unique_id| {
                self.config_entries
                    .get_by_unique_id(&entry_config.domain, unique_id)
            });

            match existing {
                Some(existing) if existing.data == entry_config.data => {
                    debug!(entry_id = %existing.entry_id, "Imported entry unchanged");
                }
                Some(existing) => {
                    self.config_entries
                        .update(
                            &existing.entry_id,
                            ConfigEntryUpdate::new().data(entry_config.data.clone()),
                        )
                        .await?;
                    info!(entry_id = %existing.entry_id, "Updated imported entry");
                }
                None => {
                    self.config_entries.add(imported_entry(entry_config)).await?;
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Set up every enabled entry and wait for all of them to settle
    pub async fn start(&self) {
        self.config_entries.setup_all().await;
        info!(
            loaded = self
                .config_entries
                .entries()
                .iter()
                .filter(|e| e.is_loaded())
                .count(),
            total = self.config_entries.len(),
            "Config entries set up"
        );
    }

    /// Unload everything and flush the registries
    pub async fn stop(&self) -> ServerResult<()> {
        self.config_entries.unload_all().await;
        self.registries.save_all().await?;
        self.config_entries.save().await?;
        info!("Home Assistant stopped");
        Ok(())
    }

    pub fn diagnostics(&self, entry_id: &str) -> DiagnosticsResult<DiagnosticsPayload> {
        get_config_entry_diagnostics(&self.config_entries, &self.diagnostics, entry_id)
    }
}

fn imported_entry(config: &EntryConfig) -> ConfigEntry {
    let mut entry = ConfigEntry::new(&config.domain, config.title())
        .with_data(config.data.clone())
        .with_source(ConfigEntrySource::Import);
    entry.unique_id = config.unique_id.clone();
    entry
}
