use std::sync::Arc;

use async_trait::async_trait;
use ha_helpers::{UpdateFailed, UpdateSource};
use serde::Serialize;
use serde_json::Value;

use super::api::{ApiError, BoardApi, BoardInfo, SystemInfo};

/// What a board model can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub relays: u8,
    pub inputs: u8,
    pub temperature_sensor: bool,
    pub wifi: bool,
}

impl Capabilities {
    /// Capabilities by model prefix; unknown models get none
    pub fn for_model(model: &str) -> Self {
        let (relays, inputs, temperature_sensor, wifi) = match model {
            m if m.starts_with("BC-4PRO") => (4, 4, true, true),
            m if m.starts_with("BC-2ETH") => (2, 2, true, false),
            m if m.starts_with("BC-1") => (1, 1, false, true),
            _ => (0, 0, false, false),
        };
        Self {
            relays,
            inputs,
            temperature_sensor,
            wifi,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Board {
    #[serde(flatten)]
    pub info: BoardInfo,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerData {
    pub board: Board,
    pub info: SystemInfo,
    pub config: Value,
}

pub struct ControllerUpdater {
    api: Arc<dyn BoardApi>,
}

impl ControllerUpdater {
    pub fn new(api: Arc<dyn BoardApi>) -> Self {
        Self { api }
    }
}

fn update_failed(err: ApiError) -> UpdateFailed {
    match err {
        ApiError::Auth => UpdateFailed::Auth(err.to_string()),
        other => UpdateFailed::failed(other.to_string()),
    }
}

#[async_trait]
impl UpdateSource<ControllerData> for ControllerUpdater {
    async fn async_update_data(&self) -> Result<ControllerData, UpdateFailed> {
        let board = self.api.board().await.map_err(update_failed)?;
        let info = self.api.info().await.map_err(update_failed)?;
        let config = self.api.config().await.map_err(update_failed)?;

        Ok(ControllerData {
            board: Board {
                capabilities: Capabilities::for_model(&board.model),
                info: board,
            },
            info,
            config,
        })
    }
}
