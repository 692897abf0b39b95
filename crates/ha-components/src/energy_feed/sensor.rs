use ha_helpers::{SensorEntity, SensorEntityDescription, SensorValue};
use ha_registries::DeviceInfo;

use super::coordinator::FeedData;
use super::{DOMAIN, MANUFACTURER};

pub fn home_sensors(data: &FeedData) -> Vec<SensorEntity<FeedData>> {
    let device = DeviceInfo::new(DOMAIN, &data.home.id)
        .name(&data.home.name)
        .manufacturer(MANUFACTURER)
        .model("Realtime meter");

    vec![
        SensorEntity::new(
            SensorEntityDescription::new("power", "Power")
                .device_class("power")
                .state_class("measurement")
                .unit("W"),
            |data: &FeedData| data.measurement.as_ref().map(|m| m.power.into()),
        )
        .with_device(device.clone()),
        SensorEntity::new(
            SensorEntityDescription::new("accumulated_consumption", "Accumulated consumption")
                .device_class("energy")
                .state_class("total_increasing")
                .unit("kWh"),
            |data: &FeedData| {
                data.measurement
                    .as_ref()
                    .map(|m| m.accumulated_consumption.into())
            },
        )
        .with_device(device.clone()),
        SensorEntity::new(
            SensorEntityDescription::new("voltage", "Voltage")
                .device_class("voltage")
                .state_class("measurement")
                .unit("V"),
            |data: &FeedData| {
                data.measurement
                    .as_ref()
                    .and_then(|m| m.voltage)
                    .map(SensorValue::from)
            },
        )
        .with_device(device),
    ]
}
