//! Config Entries
//!
//! Config entries represent individual integration instances. This crate
//! owns their lifecycle (setup, unload, reload) and the contract
//! integrations implement to take part in it.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`RuntimeData`] - Live objects an integration attaches to its entry
//! - [`Integration`] - Setup/unload hooks implemented per domain
//! - [`ConfigEntries`] - Manager for all config entries
//!
//! # Storage
//!
//! Config entries are persisted in `.storage/core.config_entries` with
//! version tracking for migrations.

pub mod entry;
pub mod integration;
pub mod manager;
pub mod state_machine;

pub use entry::{
    ConfigEntry, ConfigEntryDisabledBy, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate,
    RuntimeData,
};

pub use integration::{Integration, SetupContext, SetupError};

pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult,
    INTEGRATION_NOT_FOUND, STORAGE_KEY, STORAGE_MINOR_VERSION, STORAGE_VERSION,
};

pub use state_machine::{calculate_retry_delay, InvalidTransition};
