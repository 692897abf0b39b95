use std::sync::Arc;

use async_trait::async_trait;
use ha_helpers::{UpdateFailed, UpdateSource};
use serde::Serialize;
use tracing::debug;

use super::api::{BridgeDevice, BridgeInfo, CommunicatorError, SerialCommunicator};

/// Everything read from the bridge in one refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeData {
    pub info: BridgeInfo,
    pub devices: Vec<BridgeDevice>,
}

impl BridgeData {
    pub fn device(&self, id: &str) -> Option<&BridgeDevice> {
        self.devices.iter().find(|d| d.id == id)
    }
}

pub struct BridgeUpdater {
    communicator: Arc<dyn SerialCommunicator>,
}

impl BridgeUpdater {
    pub fn new(communicator: Arc<dyn SerialCommunicator>) -> Self {
        Self { communicator }
    }

    async fn fetch(&self) -> Result<BridgeData, CommunicatorError> {
        let info = self.communicator.read_info().await?;
        let devices = self.communicator.list_devices().await?;
        Ok(BridgeData { info, devices })
    }
}

#[async_trait]
impl UpdateSource<BridgeData> for BridgeUpdater {
    /// Reconnects once when the link was dropped after a failed command
    async fn async_update_data(&self) -> Result<BridgeData, UpdateFailed> {
        let result = match self.fetch().await {
            Err(CommunicatorError::NotConnected) => {
                debug!("Serial link down, reconnecting");
                self.communicator
                    .connect()
                    .await
                    .map_err(|e| UpdateFailed::failed(e.to_string()))?;
                self.fetch().await
            }
            result => result,
        };
        result.map_err(|e| UpdateFailed::failed(e.to_string()))
    }
}
