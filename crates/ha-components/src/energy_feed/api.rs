//! Energy feed client
//!
//! Home metadata comes from a REST endpoint, live measurements from a
//! websocket subscription.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use futures_util::SinkExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("Cannot reach energy feed: {0}")]
    Connection(String),

    #[error("Invalid access token")]
    Auth,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Home {
    pub id: String,
    pub name: String,
    pub address: String,
    pub time_zone: String,
    pub currency: String,
    #[serde(default)]
    pub has_realtime_meter: bool,
}

/// One realtime reading pushed by the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: String,
    /// Watts
    pub power: f64,
    /// kWh since midnight
    pub accumulated_consumption: f64,
    #[serde(default)]
    pub voltage: Option<f64>,
}

/// Stream of measurements for one home
pub type Subscription = BoxStream<'static, Result<Measurement, FeedError>>;

#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn home(&self, home_id: &str) -> Result<Home, FeedError>;
    async fn subscribe(&self, home_id: &str) -> Result<Subscription, FeedError>;
}

pub struct WsFeedClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl WsFeedClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, token)
    }

    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn ws_url(&self) -> String {
        let url = self
            .base_url
            .replace("http://", "ws://")
            .replace("https://", "wss://");
        format!("{}/v1/subscriptions", url)
    }
}

#[async_trait]
impl FeedClient for WsFeedClient {
    async fn home(&self, home_id: &str) -> Result<Home, FeedError> {
        let url = format!("{}/v1/homes/{}", self.base_url, home_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .timeout(CONNECT_TIMEOUT)
            .send()
            .await
            .map_err(|e| FeedError::Connection(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(FeedError::Auth),
            status if !status.is_success() => {
                return Err(FeedError::Connection(format!("HTTP {status}")))
            }
            _ => {}
        }

        response
            .json()
            .await
            .map_err(|e| FeedError::InvalidMessage(e.to_string()))
    }

    async fn subscribe(&self, home_id: &str) -> Result<Subscription, FeedError> {
        let ws_url = self.ws_url();
        let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(&ws_url))
            .await
            .map_err(|_| FeedError::Connection("connect timeout".to_string()))?
            .map_err(|e| FeedError::Connection(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();
        let subscribe = json!({
            "type": "subscribe",
            "token": self.token,
            "home_id": home_id,
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| FeedError::Connection(e.to_string()))?;
        debug!(home_id, "Subscribed to energy feed");

        // Both halves live in the stream; dropping it closes the socket
        let measurements = stream::unfold((write, read), |(write, mut read)| async move {
            loop {
                let item = match read.next().await? {
                    Ok(Message::Text(text)) => parse_measurement(&text),
                    Ok(Message::Close(_)) => {
                        debug!("Energy feed closed the subscription");
                        return None;
                    }
                    Ok(_) => continue,
                    Err(e) => Err(FeedError::Connection(e.to_string())),
                };
                return Some((item, (write, read)));
            }
        });

        Ok(measurements.boxed())
    }
}

fn parse_measurement(text: &str) -> Result<Measurement, FeedError> {
    serde_json::from_str(text).map_err(|e| FeedError::InvalidMessage(e.to_string()))
}
