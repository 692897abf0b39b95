//! Building blocks shared by integrations
//!
//! - [`coordinator`]: one data fetch shared by every entity of an entry
//! - [`entity`]: sensor descriptions and the platform that turns them into
//!   registry entries and states

pub mod coordinator;
pub mod entity;

pub use coordinator::{DataUpdateCoordinator, UpdateFailed, UpdateSource};
pub use entity::{
    EntityPlatform, SensorEntity, SensorEntityDescription, SensorValue, SENSOR_DOMAIN,
};
