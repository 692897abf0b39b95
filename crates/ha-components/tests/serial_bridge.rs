//! Serial bridge setup, entities and diagnostics

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{serial_bridge_with, FakeCommunicator};
use ha_components::serial_bridge::{self, SerialBridgeRuntime};
use ha_config_entries::ConfigEntryState;
use ha_diagnostics::{DiagnosticsError, REDACTED};
use ha_test_harness::{
    assert_json_eq, assert_json_snapshot, CompareOptions, MockConfigEntry, TestHomeAssistant,
};
use serde_json::json;

const ENTRY_ID: &str = "01J0SERIALBRIDGE0000000000";

fn mock_entry() -> MockConfigEntry {
    MockConfigEntry::new(serial_bridge::DOMAIN)
        .with_entry_id(ENTRY_ID)
        .with_title("Serial Bridge")
        .with_unique_id("SB-00012345")
        .with_data(json!({"port": "/dev/ttyUSB0", "baudrate": 115200}))
}

async fn setup(communicator: Arc<FakeCommunicator>) -> TestHomeAssistant {
    let hass = TestHomeAssistant::new();
    let bundle = serial_bridge::bundle_with(Arc::new(serial_bridge_with(communicator)));
    hass.register(bundle.integration, bundle.diagnostics);
    mock_entry().add_to_hass(&hass).await;
    hass.setup(ENTRY_ID).await;
    hass
}

#[tokio::test]
async fn test_connection_error_retries_setup() {
    let hass = setup(Arc::new(FakeCommunicator::unreachable())).await;

    let entry = hass.entry(ENTRY_ID);
    assert_eq!(entry.state, ConfigEntryState::SetupRetry);
    assert_eq!(entry.tries, 1);
    assert!(entry.reason.unwrap().contains("No such device"));
    assert!(!entry.runtime_data.is_set());
    assert!(hass.registries.entities.entries_for_config_entry(ENTRY_ID).is_empty());
}

#[tokio::test]
async fn test_setup_creates_entities() {
    let hass = setup(Arc::new(FakeCommunicator::new())).await;

    assert_eq!(hass.entry(ENTRY_ID).state, ConfigEntryState::Loaded);
    hass.assert_state("sensor.kitchen_temperature", "21.5");
    hass.assert_state("sensor.kitchen_humidity", "48.5");
    hass.assert_state("sensor.garage_door_signal_strength", "-71");

    assert_json_snapshot!("serial_bridge_entities", hass.entity_snapshot(ENTRY_ID));
}

#[tokio::test]
async fn test_devices_registered() {
    let hass = setup(Arc::new(FakeCommunicator::new())).await;

    let mut names: Vec<String> = hass
        .registries
        .devices
        .devices_for_config_entry(ENTRY_ID)
        .iter()
        .filter_map(|d| d.name.clone())
        .collect();
    names.sort();
    assert_eq!(names, ["Garage door", "Kitchen"]);
}

#[tokio::test]
async fn test_diagnostics() {
    let hass = setup(Arc::new(FakeCommunicator::new())).await;

    let data = hass.diagnostics(ENTRY_ID).unwrap();
    let keys: Vec<&String> = data.as_object().unwrap().keys().collect();
    assert_eq!(keys, ["info", "devices"]);
    assert_eq!(data["info"]["serial_number"], REDACTED);

    assert_json_snapshot!("serial_bridge_diagnostics", data);
}

#[tokio::test]
async fn test_diagnostics_idempotent() {
    let hass = setup(Arc::new(FakeCommunicator::new())).await;

    let first = serde_json::to_string(&hass.diagnostics(ENTRY_ID).unwrap()).unwrap();
    let second = serde_json::to_string(&hass.diagnostics(ENTRY_ID).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_diagnostics_leave_entity_states_untouched() {
    let hass = setup(Arc::new(FakeCommunicator::new())).await;
    let before = hass.entity_snapshot(ENTRY_ID);

    hass.diagnostics(ENTRY_ID).unwrap();
    hass.block_till_done().await;
    assert_json_eq(&before, &hass.entity_snapshot(ENTRY_ID), &CompareOptions::new());
}

#[tokio::test]
async fn test_diagnostics_do_not_refresh() {
    let communicator = Arc::new(FakeCommunicator::new());
    let hass = setup(Arc::clone(&communicator)).await;
    let reads = communicator.reads.load(Ordering::SeqCst);

    hass.diagnostics(ENTRY_ID).unwrap();
    assert_eq!(communicator.reads.load(Ordering::SeqCst), reads);
}

#[tokio::test]
async fn test_diagnostics_rejected_when_not_loaded() {
    let hass = setup(Arc::new(FakeCommunicator::unreachable())).await;

    let err = hass.diagnostics(ENTRY_ID).unwrap_err();
    assert!(matches!(
        err,
        DiagnosticsError::NotLoaded {
            state: ConfigEntryState::SetupRetry,
            ..
        }
    ));
}

#[tokio::test]
async fn test_device_diagnostics() {
    let hass = setup(Arc::new(FakeCommunicator::new())).await;
    let device = hass
        .registries
        .devices
        .get_by_identifier(serial_bridge::DOMAIN, "c3d4")
        .unwrap();

    let payload = ha_diagnostics::get_device_diagnostics(
        &hass.config_entries,
        &hass.diagnostics,
        ENTRY_ID,
        &device.id,
    )
    .unwrap();
    assert_eq!(payload.data["name"], "Garage door");
    assert_eq!(payload.data["rssi"], -71);
}

#[tokio::test]
async fn test_unload_closes_communicator() {
    let communicator = Arc::new(FakeCommunicator::new());
    let hass = setup(Arc::clone(&communicator)).await;
    assert!(hass
        .entry(ENTRY_ID)
        .runtime_data::<SerialBridgeRuntime>()
        .is_some());

    assert_eq!(hass.unload(ENTRY_ID).await, ConfigEntryState::NotLoaded);
    assert!(communicator.closed.load(Ordering::SeqCst));
    assert!(hass.get_state("sensor.kitchen_temperature").is_none());
    assert!(!hass.entry(ENTRY_ID).runtime_data.is_set());
}
