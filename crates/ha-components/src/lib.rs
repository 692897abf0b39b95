//! Built-in integrations
//!
//! Each integration comes as an [`IntegrationBundle`]: the
//! [`Integration`] the config-entry manager drives, plus the diagnostics
//! provider that projects its loaded state.

pub mod board_controller;
pub mod energy_feed;
pub mod serial_bridge;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use ha_config_entries::Integration;
use ha_diagnostics::DiagnosticsProvider;

/// An integration together with its optional diagnostics provider
#[derive(Clone)]
pub struct IntegrationBundle {
    pub integration: Arc<dyn Integration>,
    pub diagnostics: Option<Arc<dyn DiagnosticsProvider>>,
}

impl IntegrationBundle {
    pub fn domain(&self) -> &str {
        self.integration.domain()
    }
}

/// Every integration shipped with the server, using production transports
pub fn builtin_integrations() -> Vec<IntegrationBundle> {
    vec![
        serial_bridge::bundle(),
        board_controller::bundle(),
        energy_feed::bundle(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_domains() {
        let domains: Vec<String> = builtin_integrations()
            .iter()
            .map(|b| b.domain().to_string())
            .collect();
        assert_eq!(domains, ["serial_bridge", "board_controller", "energy_feed"]);
    }

    #[test]
    fn test_every_builtin_has_diagnostics() {
        assert!(builtin_integrations().iter().all(|b| b.diagnostics.is_some()));
    }
}
