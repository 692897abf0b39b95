//! Test support for integrations
//!
//! - [`MockConfigEntry`]: a config entry with fixed identifying data
//! - [`TestHomeAssistant`]: an isolated host with its own storage dir
//! - [`assert_json_snapshot!`]: `insta` snapshots stored in
//!   `tests/snapshots/<name>.snap` of the calling crate, with volatile
//!   fields redacted
//! - [`assert_json_eq`]: structural diff of two live documents
//! - fixtures loaded from `tests/fixtures/`

pub mod fixtures;
mod mock_config_entry;
pub mod snapshot;
mod test_hass;

pub use fixtures::{load_fixture, load_json_fixture};
pub use mock_config_entry::MockConfigEntry;
pub use snapshot::{assert_json_eq, compare_json, CompareOptions, DiffCategory, Difference};
pub use test_hass::TestHomeAssistant;

#[doc(hidden)]
pub use insta;
