//! Typed view of `configuration.yaml`

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::YamlLoader;

pub const CONFIG_FILE: &str = "configuration.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Level for everything not listed in `logs`
    #[serde(default = "default_level")]
    pub default: String,

    /// Per-target levels, e.g. `ha_components::energy_feed: debug`
    #[serde(default)]
    pub logs: BTreeMap<String, String>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            default: default_level(),
            logs: BTreeMap::new(),
        }
    }
}

impl LoggerConfig {
    /// `tracing_subscriber::EnvFilter` directive for this config
    pub fn filter_directive(&self) -> String {
        std::iter::once(self.default.clone())
            .chain(
                self.logs
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A config entry seeded from YAML at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    pub domain: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub data: Map<String, JsonValue>,
}

impl EntryConfig {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.domain)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub logger: LoggerConfig,

    #[serde(default)]
    pub config_entries: Vec<EntryConfig>,
}

impl ServerConfig {
    /// Load `configuration.yaml` from `config_dir`.
    ///
    /// A missing file gives the default configuration; an empty file is
    /// treated the same way.
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            info!("No {} in {:?}, using defaults", CONFIG_FILE, config_dir);
            return Ok(Self::default());
        }

        let value = YamlLoader::new(config_dir)?.load_file(CONFIG_FILE)?;
        let config = Self::from_yaml(value, &path)?;
        debug!(
            entries = config.config_entries.len(),
            "Loaded server configuration"
        );
        Ok(config)
    }

    fn from_yaml(value: serde_yaml::Value, path: &Path) -> ConfigResult<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_value(value).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = std::collections::HashSet::new();
        for (index, entry) in self.config_entries.iter().enumerate() {
            if entry.domain.trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    message: format!("config_entries[{index}] has an empty domain"),
                });
            }
            if let Some(unique_id) = &entry.unique_id {
                if !seen.insert((entry.domain.as_str(), unique_id.as_str())) {
                    return Err(ConfigError::ValidationFailed {
                        message: format!(
                            "duplicate unique_id '{}' for domain {}",
                            unique_id, entry.domain
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
