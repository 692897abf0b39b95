//! Transport doubles shared by the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use ha_components::board_controller::api::{ApiError, BoardApi, BoardInfo, SystemInfo};
use ha_components::board_controller::BoardControllerIntegration;
use ha_components::energy_feed::api::{FeedClient, FeedError, Home, Measurement, Subscription};
use ha_components::energy_feed::EnergyFeedIntegration;
use ha_components::serial_bridge::api::{
    BridgeDevice, BridgeInfo, CommunicatorError, SerialCommunicator,
};
use ha_components::serial_bridge::SerialBridgeIntegration;
use ha_test_harness::load_json_fixture;

pub fn fixture<T: DeserializeOwned>(name: &str) -> T {
    serde_json::from_value(load_json_fixture(env!("CARGO_MANIFEST_DIR"), name))
        .unwrap_or_else(|e| panic!("Fixture {} does not match its type: {}", name, e))
}

// Serial bridge

pub struct FakeCommunicator {
    pub info: BridgeInfo,
    pub devices: Vec<BridgeDevice>,
    pub fail_connect: bool,
    pub closed: AtomicBool,
    pub reads: AtomicUsize,
}

impl FakeCommunicator {
    pub fn new() -> Self {
        Self {
            info: fixture("serial_bridge/info.json"),
            devices: fixture("serial_bridge/devices.json"),
            fail_connect: false,
            closed: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_connect: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl SerialCommunicator for FakeCommunicator {
    async fn connect(&self) -> Result<(), CommunicatorError> {
        if self.fail_connect {
            return Err(CommunicatorError::Connection {
                port: "/dev/ttyUSB0".to_string(),
                reason: "No such device".to_string(),
            });
        }
        Ok(())
    }

    async fn read_info(&self) -> Result<BridgeInfo, CommunicatorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.info.clone())
    }

    async fn list_devices(&self) -> Result<Vec<BridgeDevice>, CommunicatorError> {
        Ok(self.devices.clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn serial_bridge_with(communicator: Arc<FakeCommunicator>) -> SerialBridgeIntegration {
    SerialBridgeIntegration::new(Arc::new(
        move |_port: &str, _baudrate: u32| -> Arc<dyn SerialCommunicator> {
            Arc::clone(&communicator) as Arc<dyn SerialCommunicator>
        },
    ))
}

// Board controller

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum BoardFailure {
    None,
    Unreachable,
    BadPassword,
}

pub struct FakeBoardApi {
    pub board: BoardInfo,
    pub info: Mutex<SystemInfo>,
    pub config: Value,
    pub failure: BoardFailure,
}

impl FakeBoardApi {
    pub fn new() -> Self {
        Self::failing(BoardFailure::None)
    }

    pub fn failing(failure: BoardFailure) -> Self {
        Self {
            board: fixture("board_controller/board.json"),
            info: Mutex::new(fixture("board_controller/info.json")),
            config: fixture("board_controller/config.json"),
            failure,
        }
    }

    fn check(&self) -> Result<(), ApiError> {
        match self.failure {
            BoardFailure::None => Ok(()),
            BoardFailure::Unreachable => Err(ApiError::Connection {
                host: "192.168.1.50".to_string(),
                reason: "connection refused".to_string(),
            }),
            BoardFailure::BadPassword => Err(ApiError::Auth),
        }
    }
}

#[async_trait]
impl BoardApi for FakeBoardApi {
    async fn board(&self) -> Result<BoardInfo, ApiError> {
        self.check()?;
        Ok(self.board.clone())
    }

    async fn info(&self) -> Result<SystemInfo, ApiError> {
        self.check()?;
        Ok(self.info.lock().unwrap().clone())
    }

    async fn config(&self) -> Result<Value, ApiError> {
        self.check()?;
        Ok(self.config.clone())
    }
}

pub fn board_controller_with(api: Arc<FakeBoardApi>) -> BoardControllerIntegration {
    BoardControllerIntegration::new(Arc::new(
        move |_host: &str, _password: Option<&str>| -> Result<Arc<dyn BoardApi>, ApiError> {
            Ok(Arc::clone(&api) as Arc<dyn BoardApi>)
        },
    ))
}

// Energy feed

pub type MeasurementSender = mpsc::UnboundedSender<Result<Measurement, FeedError>>;

pub struct FakeFeedClient {
    pub home: Home,
    pub home_error: Option<FeedError>,
    subscription: Mutex<Option<mpsc::UnboundedReceiver<Result<Measurement, FeedError>>>>,
}

impl FakeFeedClient {
    /// A client and the sender that feeds its subscription
    pub fn new() -> (Self, MeasurementSender) {
        let (tx, rx) = mpsc::unbounded();
        let client = Self {
            home: fixture("energy_feed/home.json"),
            home_error: None,
            subscription: Mutex::new(Some(rx)),
        };
        (client, tx)
    }

    pub fn failing(err: FeedError) -> Self {
        let (client, _) = Self::new();
        Self {
            home_error: Some(err),
            ..client
        }
    }
}

#[async_trait]
impl FeedClient for FakeFeedClient {
    async fn home(&self, _home_id: &str) -> Result<Home, FeedError> {
        match &self.home_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.home.clone()),
        }
    }

    async fn subscribe(&self, _home_id: &str) -> Result<Subscription, FeedError> {
        self.subscription
            .lock()
            .unwrap()
            .take()
            .map(|rx| rx.boxed())
            .ok_or_else(|| FeedError::Connection("already subscribed".to_string()))
    }
}

pub fn energy_feed_with(client: Arc<FakeFeedClient>) -> EnergyFeedIntegration {
    EnergyFeedIntegration::new(Arc::new(move |_token: &str| -> Arc<dyn FeedClient> {
        Arc::clone(&client) as Arc<dyn FeedClient>
    }))
}
