//! Server configuration
//!
//! `configuration.yaml` in the config directory is read with two custom
//! tags resolved while loading:
//!
//! - `!secret key` - substitute from `secrets.yaml` next to it
//! - `!env_var VAR` - substitute from the environment
//!
//! ```yaml
//! logger:
//!   default: info
//!   logs:
//!     ha_components::serial_bridge: debug
//! config_entries:
//!   - domain: board_controller
//!     title: Workshop board
//!     unique_id: aa:bb:cc:dd:ee:ff
//!     data:
//!       host: 192.168.1.50
//!       password: !secret board_password
//! ```

mod error;
mod loader;
mod secrets;
mod server_config;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;
pub use server_config::{EntryConfig, LoggerConfig, ServerConfig, CONFIG_FILE};

pub use serde_yaml::Value;
