use ha_config_entries::ConfigEntry;
use ha_diagnostics::{
    async_redact_data, to_diagnostics, DiagnosticsError, DiagnosticsProvider, DiagnosticsResult,
};
use serde_json::{json, Value};

use super::BoardControllerRuntime;

/// Keys never shown in diagnostics output
pub const TO_REDACT: &[&str] = &["mac", "serial_number", "wifi_ssid", "password", "api_key"];

pub struct BoardControllerDiagnostics;

impl DiagnosticsProvider for BoardControllerDiagnostics {
    fn config_entry_diagnostics(&self, entry: &ConfigEntry) -> DiagnosticsResult<Value> {
        let data = entry
            .runtime_data::<BoardControllerRuntime>()
            .and_then(|runtime| runtime.coordinator.data())
            .ok_or_else(|| DiagnosticsError::NoData(entry.entry_id.clone()))?;

        let projection = json!({
            "board": to_diagnostics(&data.board)?,
            "info": to_diagnostics(&data.info)?,
            "config": data.config,
        });
        Ok(async_redact_data(&projection, TO_REDACT))
    }
}
