//! HTTP API of the board controller

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USERNAME: &str = "admin";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Cannot connect to {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error("Invalid credentials")]
    Auth,

    #[error("Invalid response from {path}: {reason}")]
    InvalidResponse { path: &'static str, reason: String },
}

/// Hardware identity, from `/api/board`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardInfo {
    pub model: String,
    pub hostname: String,
    pub mac: String,
    pub firmware_version: String,
    pub serial_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiStatus {
    pub wifi_ssid: String,
    pub rssi: i32,
}

/// Runtime status, from `/api/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub uptime: u64,
    #[serde(default)]
    pub cpu_temperature: Option<f64>,
    pub free_memory: u64,
    #[serde(default)]
    pub wifi: Option<WifiStatus>,
}

#[async_trait]
pub trait BoardApi: Send + Sync {
    async fn board(&self) -> Result<BoardInfo, ApiError>;
    async fn info(&self) -> Result<SystemInfo, ApiError>;
    /// Raw device configuration, passed through untyped
    async fn config(&self) -> Result<Value, ApiError>;
}

pub struct HttpBoardApi {
    client: reqwest::Client,
    host: String,
    password: Option<String>,
}

impl HttpBoardApi {
    pub fn new(host: impl Into<String>, password: Option<String>) -> Result<Self, ApiError> {
        let host = host.into();
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| ApiError::Connection {
                host: host.clone(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            host,
            password,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &'static str) -> Result<T, ApiError> {
        let url = format!("http://{}{}", self.host, path);
        let mut request = self.client.get(&url);
        if let Some(ref password) = self.password {
            request = request.basic_auth(USERNAME, Some(password));
        }

        let response = request.send().await.map_err(|e| ApiError::Connection {
            host: self.host.clone(),
            reason: e.to_string(),
        })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(ApiError::Auth),
            status if !status.is_success() => {
                return Err(ApiError::InvalidResponse {
                    path,
                    reason: format!("HTTP {status}"),
                })
            }
            _ => {}
        }

        debug!(%url, "Board API request succeeded");
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse {
                path,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl BoardApi for HttpBoardApi {
    async fn board(&self) -> Result<BoardInfo, ApiError> {
        self.get("/api/board").await
    }

    async fn info(&self) -> Result<SystemInfo, ApiError> {
        self.get("/api/info").await
    }

    async fn config(&self) -> Result<Value, ApiError> {
        self.get("/api/config").await
    }
}
