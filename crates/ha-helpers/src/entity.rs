//! Coordinator-backed sensor entities
//!
//! Integrations describe their sensors with [`SensorEntityDescription`] and
//! a value function over the coordinator data. [`EntityPlatform`] registers
//! the devices and entities, writes the initial states and rewrites them
//! whenever the coordinator updates.

use std::fmt;
use std::sync::Arc;

use ha_config_entries::{ConfigEntry, SetupContext};
use ha_core::{attributes, Attributes, EntityId, STATE_UNAVAILABLE, STATE_UNKNOWN};
use ha_registries::{DeviceInfo, EntityCategory};
use ha_state_store::StateStore;
use serde_json::Value;
use tracing::{debug, warn};

use crate::coordinator::DataUpdateCoordinator;

/// Entity domain sensors are registered under
pub const SENSOR_DOMAIN: &str = "sensor";

/// Static description of one sensor
#[derive(Debug, Clone, PartialEq)]
pub struct SensorEntityDescription {
    /// Stable key, appended to the entry's unique id
    pub key: String,
    pub name: String,
    pub device_class: Option<String>,
    pub state_class: Option<String>,
    pub native_unit_of_measurement: Option<String>,
    pub entity_category: Option<EntityCategory>,
    pub icon: Option<String>,
}

impl SensorEntityDescription {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            device_class: None,
            state_class: None,
            native_unit_of_measurement: None,
            entity_category: None,
            icon: None,
        }
    }

    pub fn device_class(mut self, device_class: impl Into<String>) -> Self {
        self.device_class = Some(device_class.into());
        self
    }

    pub fn state_class(mut self, state_class: impl Into<String>) -> Self {
        self.state_class = Some(state_class.into());
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.native_unit_of_measurement = Some(unit.into());
        self
    }

    pub fn entity_category(mut self, category: EntityCategory) -> Self {
        self.entity_category = Some(category);
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Native value of a sensor
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Int(v) => write!(f, "{v}"),
            SensorValue::Float(v) => write!(f, "{v}"),
            SensorValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for SensorValue {
    fn from(v: i64) -> Self {
        SensorValue::Int(v)
    }
}

impl From<f64> for SensorValue {
    fn from(v: f64) -> Self {
        SensorValue::Float(v)
    }
}

impl From<String> for SensorValue {
    fn from(v: String) -> Self {
        SensorValue::Text(v)
    }
}

type ValueFn<T> = Arc<dyn Fn(&T) -> Option<SensorValue> + Send + Sync>;

/// A sensor description bound to the data it reads
pub struct SensorEntity<T> {
    pub description: SensorEntityDescription,
    device: Option<DeviceInfo>,
    value_fn: ValueFn<T>,
}

impl<T> SensorEntity<T> {
    pub fn new(
        description: SensorEntityDescription,
        value_fn: impl Fn(&T) -> Option<SensorValue> + Send + Sync + 'static,
    ) -> Self {
        Self {
            description,
            device: None,
            value_fn: Arc::new(value_fn),
        }
    }

    /// Attach the sensor to a device; its name prefixes the friendly name
    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }
}

struct RegisteredSensor<T> {
    entity_id: EntityId,
    attributes: Attributes,
    value_fn: ValueFn<T>,
}

/// The sensors one config entry has added
pub struct EntityPlatform<T> {
    platform: String,
    states: Arc<StateStore>,
    sensors: Vec<RegisteredSensor<T>>,
}

impl<T: Send + Sync + 'static> EntityPlatform<T> {
    /// Register devices and entities, write initial states and keep them
    /// in sync with `coordinator`.
    ///
    /// Unique ids are `<entry unique id>_<key>`, falling back to the entry
    /// id when the entry has no unique id.
    pub fn add_sensors(
        ctx: &SetupContext,
        entry: &ConfigEntry,
        coordinator: &DataUpdateCoordinator<T>,
        sensors: Vec<SensorEntity<T>>,
    ) -> Arc<Self> {
        let platform = entry.domain.clone();
        let unique_prefix = entry.unique_id.as_deref().unwrap_or(&entry.entry_id);
        let mut registered = Vec::with_capacity(sensors.len());

        for sensor in sensors {
            let description = &sensor.description;

            let device = sensor
                .device
                .as_ref()
                .map(|info| ctx.registries.devices.get_or_create(&entry.entry_id, info));
            let friendly_name = match device.as_ref().and_then(|d| d.name.as_deref()) {
                Some(device_name) => format!("{} {}", device_name, description.name),
                None => description.name.clone(),
            };

            let unique_id = format!("{}_{}", unique_prefix, description.key);
            let registry_entry = ctx.registries.entities.get_or_create(
                SENSOR_DOMAIN,
                &platform,
                &unique_id,
                &friendly_name,
                Some(&entry.entry_id),
                device.as_ref().map(|d| d.id.as_str()),
            );

            let updated = ctx.registries.entities.update(&registry_entry.entity_id, |e| {
                e.original_name = Some(description.name.clone());
                e.has_entity_name = device.is_some();
                e.original_device_class = description.device_class.clone();
                e.unit_of_measurement = description.native_unit_of_measurement.clone();
                e.entity_category = description.entity_category;
                e.original_icon = description.icon.clone();
            });
            if let Err(err) = updated {
                warn!("Could not update registry entry {}: {}", registry_entry.entity_id, err);
            }

            let entity_id = match registry_entry.entity_id.parse::<EntityId>() {
                Ok(id) => id,
                Err(err) => {
                    warn!("Skipping sensor {}: {}", registry_entry.entity_id, err);
                    continue;
                }
            };

            debug!(entity_id = %entity_id, unique_id = %unique_id, "Added sensor");
            registered.push(RegisteredSensor {
                entity_id,
                attributes: sensor_attributes(description, &friendly_name),
                value_fn: sensor.value_fn,
            });
        }

        let platform = Arc::new(Self {
            platform,
            states: Arc::clone(&ctx.states),
            sensors: registered,
        });

        platform.refresh_states(coordinator);
        let listener = Arc::clone(&platform);
        coordinator.add_listener(move |c| listener.refresh_states(c));
        platform
    }

    /// Rewrite every sensor state from the coordinator's current data
    pub fn refresh_states(&self, coordinator: &DataUpdateCoordinator<T>) {
        let data = coordinator.data();
        let available = coordinator.last_update_success();

        for sensor in &self.sensors {
            let state = match (&data, available) {
                (_, false) => STATE_UNAVAILABLE.to_string(),
                (None, true) => STATE_UNKNOWN.to_string(),
                (Some(data), true) => (sensor.value_fn)(data)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| STATE_UNKNOWN.to_string()),
            };
            self.states
                .set(&sensor.entity_id, state, sensor.attributes.clone());
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.sensors.iter().map(|s| s.entity_id.clone()).collect()
    }
}

fn sensor_attributes(description: &SensorEntityDescription, friendly_name: &str) -> Attributes {
    let mut attrs = Attributes::new();
    let optional = [
        (attributes::DEVICE_CLASS, &description.device_class),
        (attributes::STATE_CLASS, &description.state_class),
        (
            attributes::UNIT_OF_MEASUREMENT,
            &description.native_unit_of_measurement,
        ),
        (attributes::ICON, &description.icon),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            attrs.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    attrs.insert(
        attributes::FRIENDLY_NAME.to_string(),
        Value::String(friendly_name.to_string()),
    );
    attrs
}
