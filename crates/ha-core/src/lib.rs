//! Core types for Home Assistant
//!
//! The fundamental value types shared by every other crate: entity ids and
//! entity states, plus the well-known state strings.

mod entity_id;
mod state;

pub use entity_id::{slugify, EntityId, EntityIdError};
pub use state::{Attributes, State};

/// Maximum length for a state value
pub const MAX_STATE_LENGTH: usize = 255;

/// State written when an entity has no value yet
pub const STATE_UNKNOWN: &str = "unknown";

/// State written when the data source behind an entity is unreachable
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Well-known state attribute names
pub mod attributes {
    pub const FRIENDLY_NAME: &str = "friendly_name";
    pub const DEVICE_CLASS: &str = "device_class";
    pub const STATE_CLASS: &str = "state_class";
    pub const UNIT_OF_MEASUREMENT: &str = "unit_of_measurement";
    pub const ICON: &str = "icon";
}
