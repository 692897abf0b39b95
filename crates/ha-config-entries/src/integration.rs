//! The contract between the host and an integration

use std::sync::Arc;

use async_trait::async_trait;
use ha_registries::Registries;
use ha_state_store::StateStore;
use thiserror::Error;

use crate::entry::{ConfigEntry, RuntimeData};

/// Why an integration could not finish setting up an entry
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetupError {
    /// The device or service is unreachable right now; the entry goes
    /// into retry
    #[error("{0}")]
    NotReady(String),

    /// Credentials were rejected
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Any other unrecoverable problem
    #[error("{0}")]
    Failed(String),
}

/// Host services handed to integrations during setup and unload
#[derive(Clone)]
pub struct SetupContext {
    pub registries: Arc<Registries>,
    pub states: Arc<StateStore>,
}

impl SetupContext {
    pub fn new(registries: Arc<Registries>, states: Arc<StateStore>) -> Self {
        Self { registries, states }
    }
}

/// An integration that can be attached to config entries of its domain
#[async_trait]
pub trait Integration: Send + Sync {
    /// Domain served by this integration (e.g. "serial_bridge")
    fn domain(&self) -> &str;

    /// Connect, fetch initial data and register entities.
    ///
    /// The returned [`RuntimeData`] is attached to the entry once the
    /// host has marked it loaded.
    async fn async_setup_entry(
        &self,
        ctx: &SetupContext,
        entry: &ConfigEntry,
    ) -> Result<RuntimeData, SetupError>;

    /// Release resources held by the entry. Returning false leaves the
    /// entry in `FailedUnload`.
    async fn async_unload_entry(&self, _ctx: &SetupContext, _entry: &ConfigEntry) -> bool {
        true
    }
}
