//! Serial communicator for the bridge
//!
//! The bridge answers newline-terminated commands with one JSON document
//! per line:
//!
//! ```text
//! > INFO
//! < {"name":"Bridge","firmware_version":"2.1.0",...}
//! > DEVICES
//! < [{"id":"a1","name":"Kitchen",...}]
//! ```

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, warn};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum CommunicatorError {
    #[error("Cannot connect to {port}: {reason}")]
    Connection { port: String, reason: String },

    #[error("Not connected")]
    NotConnected,

    #[error("Timed out waiting for reply to {0}")]
    Timeout(&'static str),

    #[error("Invalid reply to {command}: {reason}")]
    Protocol {
        command: &'static str,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Identity of the bridge itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeInfo {
    pub name: String,
    pub firmware_version: String,
    pub hardware_version: String,
    pub serial_number: String,
    #[serde(default)]
    pub radio_channel: Option<u8>,
}

/// A device paired with the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeDevice {
    pub id: String,
    pub name: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
}

/// Talks to the bridge over its serial link
#[async_trait]
pub trait SerialCommunicator: Send + Sync {
    async fn connect(&self) -> Result<(), CommunicatorError>;
    async fn read_info(&self) -> Result<BridgeInfo, CommunicatorError>;
    async fn list_devices(&self) -> Result<Vec<BridgeDevice>, CommunicatorError>;
    async fn close(&self);
}

trait Link: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Link for T {}

/// Line protocol over a TCP serial server (`host:port`) or a device node
pub struct LineCommunicator {
    port: String,
    baudrate: u32,
    command_timeout: Duration,
    link: Mutex<Option<BufReader<Box<dyn Link>>>>,
}

impl LineCommunicator {
    pub fn new(port: impl Into<String>, baudrate: u32) -> Self {
        Self {
            port: port.into(),
            baudrate,
            command_timeout: COMMAND_TIMEOUT,
            link: Mutex::new(None),
        }
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    fn is_device_node(&self) -> bool {
        self.port.starts_with('/') || (self.port.starts_with("COM") && !self.port.contains(':'))
    }

    async fn open(&self) -> io::Result<Box<dyn Link>> {
        if self.is_device_node() {
            let serial = tokio_serial::new(&self.port, self.baudrate)
                .timeout(self.command_timeout)
                .open_native_async()
                .map_err(io::Error::from)?;
            Ok(Box::new(serial))
        } else {
            let stream = TcpStream::connect(&self.port).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
    }

    async fn command<T: DeserializeOwned>(
        &self,
        command: &'static str,
    ) -> Result<T, CommunicatorError> {
        let mut guard = self.link.lock().await;
        let link = guard.as_mut().ok_or(CommunicatorError::NotConnected)?;

        link.get_mut()
            .write_all(format!("{command}\n").as_bytes())
            .await?;
        link.get_mut().flush().await?;

        let mut line = String::new();
        let read = match timeout(self.command_timeout, link.read_line(&mut line)).await {
            Ok(read) => read,
            Err(_) => {
                // A late reply would be read as the answer to the next command
                warn!(port = %self.port, command, "No reply, dropping serial link");
                *guard = None;
                return Err(CommunicatorError::Timeout(command));
            }
        };
        let read = match read {
            Ok(read) => read,
            Err(err) => {
                *guard = None;
                return Err(err.into());
            }
        };
        if read == 0 {
            *guard = None;
            return Err(CommunicatorError::NotConnected);
        }

        serde_json::from_str(line.trim()).map_err(|e| {
            *guard = None;
            CommunicatorError::Protocol {
                command,
                reason: e.to_string(),
            }
        })
    }
}

#[async_trait]
impl SerialCommunicator for LineCommunicator {
    async fn connect(&self) -> Result<(), CommunicatorError> {
        let link = timeout(self.command_timeout, self.open())
            .await
            .map_err(|_| CommunicatorError::Connection {
                port: self.port.clone(),
                reason: "timed out".to_string(),
            })?
            .map_err(|e| CommunicatorError::Connection {
                port: self.port.clone(),
                reason: e.to_string(),
            })?;

        debug!(port = %self.port, baudrate = self.baudrate, "Connected to serial bridge");
        *self.link.lock().await = Some(BufReader::new(link));
        Ok(())
    }

    async fn read_info(&self) -> Result<BridgeInfo, CommunicatorError> {
        self.command("INFO").await
    }

    async fn list_devices(&self) -> Result<Vec<BridgeDevice>, CommunicatorError> {
        self.command("DEVICES").await
    }

    async fn close(&self) {
        if let Some(mut link) = self.link.lock().await.take() {
            let _ = link.get_mut().shutdown().await;
            debug!(port = %self.port, "Closed serial bridge link");
        }
    }
}
