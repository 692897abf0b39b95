//! Board controller integration
//!
//! Network-attached controller boards with a small HTTP API. Capabilities
//! (relays, temperature sensor, Wi-Fi) depend on the board model.

pub mod api;
pub mod coordinator;
pub mod diagnostics;
pub mod sensor;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, Integration, RuntimeData, SetupContext, SetupError};
use ha_helpers::{DataUpdateCoordinator, EntityPlatform};
use tracing::info;

use crate::IntegrationBundle;
use api::{ApiError, BoardApi, HttpBoardApi};
use coordinator::{ControllerData, ControllerUpdater};
use diagnostics::BoardControllerDiagnostics;

pub const DOMAIN: &str = "board_controller";
pub const MANUFACTURER: &str = "Board Controller";

pub const CONF_HOST: &str = "host";
pub const CONF_PASSWORD: &str = "password";

const UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Builds the API client for an entry's host and password
pub type ApiFactory =
    Arc<dyn Fn(&str, Option<&str>) -> Result<Arc<dyn BoardApi>, ApiError> + Send + Sync>;

pub struct BoardControllerRuntime {
    pub api: Arc<dyn BoardApi>,
    pub coordinator: Arc<DataUpdateCoordinator<ControllerData>>,
    pub platform: Arc<EntityPlatform<ControllerData>>,
}

pub struct BoardControllerIntegration {
    factory: ApiFactory,
}

impl BoardControllerIntegration {
    pub fn new(factory: ApiFactory) -> Self {
        Self { factory }
    }
}

impl Default for BoardControllerIntegration {
    fn default() -> Self {
        Self::new(Arc::new(
            |host: &str, password: Option<&str>| -> Result<Arc<dyn BoardApi>, ApiError> {
                Ok(Arc::new(HttpBoardApi::new(host, password.map(String::from))?))
            },
        ))
    }
}

#[async_trait]
impl Integration for BoardControllerIntegration {
    fn domain(&self) -> &str {
        DOMAIN
    }

    async fn async_setup_entry(
        &self,
        ctx: &SetupContext,
        entry: &ConfigEntry,
    ) -> Result<RuntimeData, SetupError> {
        let host = entry
            .data_str(CONF_HOST)
            .ok_or_else(|| SetupError::Failed(format!("Missing {CONF_HOST}")))?;
        let api = (self.factory)(host, entry.data_str(CONF_PASSWORD))
            .map_err(|e| SetupError::Failed(e.to_string()))?;

        let coordinator = Arc::new(
            DataUpdateCoordinator::new(
                format!("{DOMAIN} {host}"),
                Arc::new(ControllerUpdater::new(Arc::clone(&api))),
            )
            .with_update_interval(UPDATE_INTERVAL),
        );
        coordinator.async_config_entry_first_refresh().await?;

        let sensors = coordinator
            .data()
            .map(|data| sensor::board_sensors(&data))
            .unwrap_or_default();
        let platform = EntityPlatform::add_sensors(ctx, entry, &coordinator, sensors);

        info!(host, "Board controller ready");
        Ok(RuntimeData::new(BoardControllerRuntime {
            api,
            coordinator,
            platform,
        }))
    }
}

pub fn bundle() -> IntegrationBundle {
    bundle_with(Arc::new(BoardControllerIntegration::default()))
}

pub fn bundle_with(integration: Arc<BoardControllerIntegration>) -> IntegrationBundle {
    IntegrationBundle {
        integration,
        diagnostics: Some(Arc::new(BoardControllerDiagnostics)),
    }
}
