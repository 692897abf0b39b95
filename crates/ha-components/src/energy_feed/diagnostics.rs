use ha_config_entries::ConfigEntry;
use ha_diagnostics::{
    async_redact_data, to_diagnostics, DiagnosticsError, DiagnosticsProvider, DiagnosticsResult,
};
use serde_json::{json, Value};

use super::EnergyFeedRuntime;

pub const TO_REDACT: &[&str] = &["address", "token"];

pub struct EnergyFeedDiagnostics;

impl DiagnosticsProvider for EnergyFeedDiagnostics {
    fn config_entry_diagnostics(&self, entry: &ConfigEntry) -> DiagnosticsResult<Value> {
        let data = entry
            .runtime_data::<EnergyFeedRuntime>()
            .and_then(|runtime| runtime.coordinator.data())
            .ok_or_else(|| DiagnosticsError::NoData(entry.entry_id.clone()))?;

        let projection = json!({
            "home": to_diagnostics(&data.home)?,
            "measurement": to_diagnostics(&data.measurement)?,
        });
        Ok(async_redact_data(&projection, TO_REDACT))
    }
}
