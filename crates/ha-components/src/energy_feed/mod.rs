//! Energy feed integration
//!
//! Subscribes to the realtime consumption of one home. Measurements are
//! pushed to the coordinator as they arrive; nothing is polled.

pub mod api;
pub mod coordinator;
pub mod diagnostics;
pub mod sensor;

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use ha_config_entries::{ConfigEntry, Integration, RuntimeData, SetupContext, SetupError};
use ha_helpers::{DataUpdateCoordinator, EntityPlatform, UpdateFailed};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::IntegrationBundle;
use api::{FeedClient, FeedError, Subscription, WsFeedClient};
use coordinator::FeedData;
use diagnostics::EnergyFeedDiagnostics;

pub const DOMAIN: &str = "energy_feed";
pub const MANUFACTURER: &str = "Energy Feed";

pub const CONF_TOKEN: &str = "token";
pub const CONF_HOME_ID: &str = "home_id";

pub const DEFAULT_API_URL: &str = "https://api.energy-feed.example";

/// Builds the client for an entry's access token
pub type ClientFactory = Arc<dyn Fn(&str) -> Arc<dyn FeedClient> + Send + Sync>;

pub struct EnergyFeedRuntime {
    pub client: Arc<dyn FeedClient>,
    pub coordinator: Arc<DataUpdateCoordinator<FeedData>>,
    pub platform: Arc<EntityPlatform<FeedData>>,
    listener: JoinHandle<()>,
}

impl Drop for EnergyFeedRuntime {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

pub struct EnergyFeedIntegration {
    factory: ClientFactory,
}

impl EnergyFeedIntegration {
    pub fn new(factory: ClientFactory) -> Self {
        Self { factory }
    }
}

impl Default for EnergyFeedIntegration {
    fn default() -> Self {
        Self::new(Arc::new(|token: &str| -> Arc<dyn FeedClient> {
            Arc::new(WsFeedClient::new(DEFAULT_API_URL, token))
        }))
    }
}

/// Forward subscription items into the coordinator until the stream ends
async fn forward_measurements(
    mut subscription: Subscription,
    coordinator: Arc<DataUpdateCoordinator<FeedData>>,
) {
    while let Some(item) = subscription.next().await {
        match item {
            Ok(measurement) => {
                let Some(current) = coordinator.data() else {
                    continue;
                };
                coordinator.set_updated_data(current.with_measurement(measurement));
            }
            Err(err) => coordinator.async_set_update_error(UpdateFailed::failed(err.to_string())),
        }
    }
    warn!(name = %coordinator.name(), "Subscription closed");
    coordinator.async_set_update_error(UpdateFailed::failed("Subscription closed"));
}

#[async_trait]
impl Integration for EnergyFeedIntegration {
    fn domain(&self) -> &str {
        DOMAIN
    }

    async fn async_setup_entry(
        &self,
        ctx: &SetupContext,
        entry: &ConfigEntry,
    ) -> Result<RuntimeData, SetupError> {
        let token = entry
            .data_str(CONF_TOKEN)
            .ok_or_else(|| SetupError::Failed(format!("Missing {CONF_TOKEN}")))?;
        let home_id = entry
            .data_str(CONF_HOME_ID)
            .ok_or_else(|| SetupError::Failed(format!("Missing {CONF_HOME_ID}")))?;

        let client = (self.factory)(token);
        let home = client.home(home_id).await.map_err(|err| match err {
            FeedError::Auth => SetupError::AuthFailed(err.to_string()),
            other => SetupError::NotReady(other.to_string()),
        })?;

        let coordinator = Arc::new(DataUpdateCoordinator::push_only(format!(
            "{DOMAIN} {}",
            entry.title
        )));
        coordinator.set_updated_data(FeedData::new(home));

        let subscription = client.subscribe(home_id).await.map_err(|err| match err {
            FeedError::Auth => SetupError::AuthFailed(err.to_string()),
            other => SetupError::NotReady(other.to_string()),
        })?;

        let sensors = coordinator
            .data()
            .map(|data| sensor::home_sensors(&data))
            .unwrap_or_default();
        debug!(count = sensors.len(), "Adding energy feed sensors");
        let platform = EntityPlatform::add_sensors(ctx, entry, &coordinator, sensors);

        let listener = tokio::spawn(forward_measurements(
            subscription,
            Arc::clone(&coordinator),
        ));

        info!(home_id, "Energy feed subscribed");
        Ok(RuntimeData::new(EnergyFeedRuntime {
            client,
            coordinator,
            platform,
            listener,
        }))
    }

    async fn async_unload_entry(&self, _ctx: &SetupContext, entry: &ConfigEntry) -> bool {
        if let Some(runtime) = entry.runtime_data::<EnergyFeedRuntime>() {
            runtime.listener.abort();
        }
        true
    }
}

pub fn bundle() -> IntegrationBundle {
    bundle_with(Arc::new(EnergyFeedIntegration::default()))
}

pub fn bundle_with(integration: Arc<EnergyFeedIntegration>) -> IntegrationBundle {
    IntegrationBundle {
        integration,
        diagnostics: Some(Arc::new(EnergyFeedDiagnostics)),
    }
}
