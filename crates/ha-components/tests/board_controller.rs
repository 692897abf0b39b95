//! Board controller setup, entities and diagnostics

mod common;

use std::sync::Arc;

use common::{board_controller_with, BoardFailure, FakeBoardApi};
use ha_components::board_controller::{self, BoardControllerRuntime};
use ha_config_entries::ConfigEntryState;
use ha_core::STATE_UNAVAILABLE;
use ha_diagnostics::REDACTED;
use ha_test_harness::{assert_json_snapshot, MockConfigEntry, TestHomeAssistant};
use serde_json::json;

const ENTRY_ID: &str = "01J0BOARDCONTROLLER0000000";

fn mock_entry() -> MockConfigEntry {
    MockConfigEntry::new(board_controller::DOMAIN)
        .with_entry_id(ENTRY_ID)
        .with_title("Workshop board")
        .with_unique_id("aa:bb:cc:dd:ee:ff")
        .with_data(json!({"host": "192.168.1.50", "password": "hunter2"}))
}

async fn setup(api: Arc<FakeBoardApi>) -> TestHomeAssistant {
    let hass = TestHomeAssistant::new();
    let bundle = board_controller::bundle_with(Arc::new(board_controller_with(api)));
    hass.register(bundle.integration, bundle.diagnostics);
    mock_entry().add_to_hass(&hass).await;
    hass.setup(ENTRY_ID).await;
    hass
}

#[tokio::test]
async fn test_connection_error_retries_setup() {
    let hass = setup(Arc::new(FakeBoardApi::failing(BoardFailure::Unreachable))).await;

    let entry = hass.entry(ENTRY_ID);
    assert_eq!(entry.state, ConfigEntryState::SetupRetry);
    assert!(entry.next_retry_delay.is_some());
    assert!(entry.reason.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_bad_password_fails_setup() {
    let hass = setup(Arc::new(FakeBoardApi::failing(BoardFailure::BadPassword))).await;

    let entry = hass.entry(ENTRY_ID);
    assert_eq!(entry.state, ConfigEntryState::SetupError);
    assert!(entry.reason.unwrap().starts_with("Authentication failed"));
}

#[tokio::test]
async fn test_setup_creates_entities() {
    let hass = setup(Arc::new(FakeBoardApi::new())).await;

    assert_eq!(hass.entry(ENTRY_ID).state, ConfigEntryState::Loaded);
    hass.assert_state("sensor.workshop_board_uptime", "86400");
    hass.assert_state("sensor.workshop_board_cpu_temperature", "47.5");

    assert_json_snapshot!("board_controller_entities", hass.entity_snapshot(ENTRY_ID));
}

#[tokio::test]
async fn test_refresh_updates_states() {
    let api = Arc::new(FakeBoardApi::new());
    let hass = setup(Arc::clone(&api)).await;
    api.info.lock().unwrap().uptime = 90000;

    let runtime = hass
        .entry(ENTRY_ID)
        .runtime_data::<BoardControllerRuntime>()
        .unwrap();
    runtime.coordinator.async_refresh().await.unwrap();

    hass.assert_state("sensor.workshop_board_uptime", "90000");
}

#[tokio::test]
async fn test_failed_refresh_marks_unavailable_and_keeps_diagnostics() {
    let hass = setup(Arc::new(FakeBoardApi::new())).await;
    let runtime = hass
        .entry(ENTRY_ID)
        .runtime_data::<BoardControllerRuntime>()
        .unwrap();

    runtime
        .coordinator
        .async_set_update_error(ha_helpers::UpdateFailed::failed("timeout"));

    hass.assert_state("sensor.workshop_board_uptime", STATE_UNAVAILABLE);
    let data = hass.diagnostics(ENTRY_ID).unwrap();
    assert_eq!(data["info"]["uptime"], 86400);
}

#[tokio::test]
async fn test_diagnostics() {
    let hass = setup(Arc::new(FakeBoardApi::new())).await;

    let data = hass.diagnostics(ENTRY_ID).unwrap();
    let keys: Vec<&String> = data.as_object().unwrap().keys().collect();
    assert_eq!(keys, ["board", "info", "config"]);

    assert_eq!(data["board"]["mac"], REDACTED);
    assert_eq!(data["board"]["serial_number"], REDACTED);
    assert_eq!(data["info"]["wifi"]["wifi_ssid"], REDACTED);
    assert_eq!(data["config"]["mqtt"]["password"], REDACTED);
    assert_eq!(data["config"]["cloud"]["api_key"], REDACTED);
    assert_eq!(data["board"]["capabilities"]["relays"], 4);

    let text = data.to_string();
    for secret in ["aa:bb:cc:dd:ee:ff", "BC4-000777", "HomeNet", "mqtt-secret", "abc123"] {
        assert!(!text.contains(secret), "{secret} leaked into diagnostics");
    }

    assert_json_snapshot!("board_controller_diagnostics", data);
}

#[tokio::test]
async fn test_diagnostics_idempotent() {
    let hass = setup(Arc::new(FakeBoardApi::new())).await;

    let first = serde_json::to_string(&hass.diagnostics(ENTRY_ID).unwrap()).unwrap();
    let second = serde_json::to_string(&hass.diagnostics(ENTRY_ID).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_payload_carries_manifest() {
    let hass = setup(Arc::new(FakeBoardApi::new())).await;

    let payload = hass.diagnostics_payload(ENTRY_ID).unwrap();
    assert_eq!(payload.integration_manifest.domain, board_controller::DOMAIN);
}

#[tokio::test]
async fn test_reload() {
    let hass = setup(Arc::new(FakeBoardApi::new())).await;

    let state = hass.config_entries.reload(ENTRY_ID).await.unwrap();
    assert_eq!(state, ConfigEntryState::Loaded);
    hass.assert_state("sensor.workshop_board_uptime", "86400");
    assert_eq!(
        hass.registries
            .entities
            .entries_for_config_entry(ENTRY_ID)
            .len(),
        4
    );
}
