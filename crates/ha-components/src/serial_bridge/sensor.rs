use ha_helpers::{SensorEntity, SensorEntityDescription, SensorValue};
use ha_registries::{DeviceInfo, EntityCategory};

use super::api::BridgeDevice;
use super::coordinator::BridgeData;
use super::{DOMAIN, MANUFACTURER};

/// One sensor per reading each paired device reports
pub fn device_sensors(data: &BridgeData) -> Vec<SensorEntity<BridgeData>> {
    let mut sensors = Vec::new();

    for device in &data.devices {
        let info = DeviceInfo::new(DOMAIN, &device.id)
            .name(&device.name)
            .manufacturer(MANUFACTURER)
            .model(&device.model);

        let readings: [(&str, bool, fn(&BridgeDevice) -> Option<SensorValue>); 4] = [
            ("temperature", device.temperature.is_some(), |d| {
                d.temperature.map(SensorValue::from)
            }),
            ("humidity", device.humidity.is_some(), |d| {
                d.humidity.map(SensorValue::from)
            }),
            ("battery", device.battery.is_some(), |d| {
                d.battery.map(|b| SensorValue::Int(b.into()))
            }),
            ("rssi", device.rssi.is_some(), |d| {
                d.rssi.map(|r| SensorValue::Int(r.into()))
            }),
        ];

        for (kind, present, read) in readings {
            if !present {
                continue;
            }
            let device_id = device.id.clone();
            sensors.push(
                SensorEntity::new(description(&device.id, kind), move |data: &BridgeData| {
                    data.device(&device_id).and_then(read)
                })
                .with_device(info.clone()),
            );
        }
    }

    sensors
}

fn description(device_id: &str, kind: &str) -> SensorEntityDescription {
    let key = format!("{device_id}_{kind}");
    match kind {
        "temperature" => SensorEntityDescription::new(key, "Temperature")
            .device_class("temperature")
            .state_class("measurement")
            .unit("°C"),
        "humidity" => SensorEntityDescription::new(key, "Humidity")
            .device_class("humidity")
            .state_class("measurement")
            .unit("%"),
        "battery" => SensorEntityDescription::new(key, "Battery")
            .device_class("battery")
            .state_class("measurement")
            .unit("%")
            .entity_category(EntityCategory::Diagnostic),
        _ => SensorEntityDescription::new(key, "Signal strength")
            .device_class("signal_strength")
            .state_class("measurement")
            .unit("dBm")
            .entity_category(EntityCategory::Diagnostic),
    }
}
