//! Integration diagnostics
//!
//! Each integration can register a [`DiagnosticsProvider`] that projects the
//! state of a loaded config entry into a JSON document. The endpoint
//! functions in [`endpoint`] wrap that document with host information and
//! refuse entries that are unknown, not loaded, or have no provider.
//! Credentials are stripped with [`async_redact_data`] before output.

pub mod endpoint;
pub mod provider;
pub mod redact;

use ha_config_entries::ConfigEntryState;
use thiserror::Error;

pub use endpoint::{
    get_config_entry_diagnostics, get_device_diagnostics, DiagnosticsPayload, HomeAssistantInfo,
    IntegrationManifest,
};
pub use provider::{to_diagnostics, DiagnosticsProvider, DiagnosticsRegistry};
pub use redact::{async_redact_data, REDACTED};

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("Config entry not found: {0}")]
    EntryNotFound(String),

    #[error("Config entry {entry_id} is not loaded (state: {state:?})")]
    NotLoaded {
        entry_id: String,
        state: ConfigEntryState,
    },

    #[error("No diagnostics provider for domain {0}")]
    NoProvider(String),

    #[error("Domain {0} does not provide device diagnostics")]
    DeviceDiagnosticsUnsupported(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The entry is loaded but its coordinator holds no data yet
    #[error("No data available for config entry {0}")]
    NoData(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DiagnosticsResult<T> = Result<T, DiagnosticsError>;
