//! Serial bridge integration
//!
//! A radio bridge attached over a serial link relays readings from the
//! devices paired with it. One config entry per bridge; one sensor per
//! reading a paired device reports.

pub mod api;
pub mod coordinator;
pub mod diagnostics;
pub mod sensor;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, Integration, RuntimeData, SetupContext, SetupError};
use ha_helpers::{DataUpdateCoordinator, EntityPlatform};
use tracing::{debug, info};

use crate::IntegrationBundle;
use api::{LineCommunicator, SerialCommunicator};
use coordinator::{BridgeData, BridgeUpdater};
use diagnostics::SerialBridgeDiagnostics;

pub const DOMAIN: &str = "serial_bridge";
pub const MANUFACTURER: &str = "Serial Bridge";

pub const CONF_PORT: &str = "port";
pub const CONF_BAUDRATE: &str = "baudrate";
pub const DEFAULT_BAUDRATE: u32 = 115_200;

const UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// Builds the communicator for an entry's port and baud rate
pub type CommunicatorFactory = Arc<dyn Fn(&str, u32) -> Arc<dyn SerialCommunicator> + Send + Sync>;

/// Live objects of a loaded bridge entry
pub struct SerialBridgeRuntime {
    pub communicator: Arc<dyn SerialCommunicator>,
    pub coordinator: Arc<DataUpdateCoordinator<BridgeData>>,
    pub platform: Arc<EntityPlatform<BridgeData>>,
}

pub struct SerialBridgeIntegration {
    factory: CommunicatorFactory,
}

impl SerialBridgeIntegration {
    pub fn new(factory: CommunicatorFactory) -> Self {
        Self { factory }
    }
}

impl Default for SerialBridgeIntegration {
    fn default() -> Self {
        Self::new(Arc::new(
            |port: &str, baudrate: u32| -> Arc<dyn SerialCommunicator> {
                Arc::new(LineCommunicator::new(port, baudrate))
            },
        ))
    }
}

#[async_trait]
impl Integration for SerialBridgeIntegration {
    fn domain(&self) -> &str {
        DOMAIN
    }

    async fn async_setup_entry(
        &self,
        ctx: &SetupContext,
        entry: &ConfigEntry,
    ) -> Result<RuntimeData, SetupError> {
        let port = entry
            .data_str(CONF_PORT)
            .ok_or_else(|| SetupError::Failed(format!("Missing {CONF_PORT}")))?;
        let baudrate = entry
            .data
            .get(CONF_BAUDRATE)
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(DEFAULT_BAUDRATE);

        let communicator = (self.factory)(port, baudrate);
        communicator
            .connect()
            .await
            .map_err(|e| SetupError::NotReady(e.to_string()))?;

        let coordinator = Arc::new(
            DataUpdateCoordinator::new(
                format!("{DOMAIN} {}", entry.title),
                Arc::new(BridgeUpdater::new(Arc::clone(&communicator))),
            )
            .with_update_interval(UPDATE_INTERVAL),
        );
        if let Err(err) = coordinator.async_config_entry_first_refresh().await {
            communicator.close().await;
            return Err(err);
        }

        let sensors = coordinator
            .data()
            .map(|data| sensor::device_sensors(&data))
            .unwrap_or_default();
        debug!(count = sensors.len(), "Adding bridge sensors");
        let platform = EntityPlatform::add_sensors(ctx, entry, &coordinator, sensors);

        info!(port, baudrate, "Serial bridge ready");
        Ok(RuntimeData::new(SerialBridgeRuntime {
            communicator,
            coordinator,
            platform,
        }))
    }

    async fn async_unload_entry(&self, _ctx: &SetupContext, entry: &ConfigEntry) -> bool {
        if let Some(runtime) = entry.runtime_data::<SerialBridgeRuntime>() {
            runtime.communicator.close().await;
        }
        true
    }
}

pub fn bundle() -> IntegrationBundle {
    bundle_with(Arc::new(SerialBridgeIntegration::default()))
}

/// Bundle around a specific integration instance, e.g. one built with a
/// test communicator
pub fn bundle_with(integration: Arc<SerialBridgeIntegration>) -> IntegrationBundle {
    IntegrationBundle {
        integration,
        diagnostics: Some(Arc::new(SerialBridgeDiagnostics)),
    }
}
