use ha_config_entries::ConfigEntry;
use ha_diagnostics::{
    async_redact_data, to_diagnostics, DiagnosticsError, DiagnosticsProvider, DiagnosticsResult,
};
use ha_registries::DeviceEntry;
use serde_json::{json, Value};

use super::SerialBridgeRuntime;

const TO_REDACT: &[&str] = &["serial_number"];

pub struct SerialBridgeDiagnostics;

impl DiagnosticsProvider for SerialBridgeDiagnostics {
    fn config_entry_diagnostics(&self, entry: &ConfigEntry) -> DiagnosticsResult<Value> {
        let data = entry
            .runtime_data::<SerialBridgeRuntime>()
            .and_then(|runtime| runtime.coordinator.data())
            .ok_or_else(|| DiagnosticsError::NoData(entry.entry_id.clone()))?;

        let projection = json!({
            "info": to_diagnostics(&data.info)?,
            "devices": to_diagnostics(&data.devices)?,
        });
        Ok(async_redact_data(&projection, TO_REDACT))
    }

    fn device_diagnostics(
        &self,
        entry: &ConfigEntry,
        device: &DeviceEntry,
    ) -> DiagnosticsResult<Value> {
        let data = entry
            .runtime_data::<SerialBridgeRuntime>()
            .and_then(|runtime| runtime.coordinator.data())
            .ok_or_else(|| DiagnosticsError::NoData(entry.entry_id.clone()))?;

        let paired = device
            .identifiers
            .iter()
            .find_map(|ident| data.device(ident.id()))
            .ok_or_else(|| DiagnosticsError::DeviceNotFound(device.id.clone()))?;

        Ok(async_redact_data(&to_diagnostics(paired)?, TO_REDACT))
    }
}
