use ha_helpers::{SensorEntity, SensorEntityDescription, SensorValue};
use ha_registries::{DeviceInfo, EntityCategory};

use super::coordinator::ControllerData;
use super::{DOMAIN, MANUFACTURER};

pub fn board_sensors(data: &ControllerData) -> Vec<SensorEntity<ControllerData>> {
    let board = &data.board;
    let device = DeviceInfo::new(DOMAIN, &board.info.mac)
        .name(&board.info.hostname)
        .manufacturer(MANUFACTURER)
        .model(&board.info.model)
        .sw_version(&board.info.firmware_version)
        .serial_number(&board.info.serial_number);

    let mut sensors = vec![
        SensorEntity::new(
            SensorEntityDescription::new("uptime", "Uptime")
                .device_class("duration")
                .state_class("total_increasing")
                .unit("s")
                .entity_category(EntityCategory::Diagnostic),
            |d: &ControllerData| i64::try_from(d.info.uptime).ok().map(SensorValue::Int),
        ),
        SensorEntity::new(
            SensorEntityDescription::new("free_memory", "Free memory")
                .device_class("data_size")
                .state_class("measurement")
                .unit("B")
                .entity_category(EntityCategory::Diagnostic),
            |d: &ControllerData| i64::try_from(d.info.free_memory).ok().map(SensorValue::Int),
        ),
    ];

    if board.capabilities.temperature_sensor {
        sensors.push(SensorEntity::new(
            SensorEntityDescription::new("cpu_temperature", "CPU temperature")
                .device_class("temperature")
                .state_class("measurement")
                .unit("°C")
                .entity_category(EntityCategory::Diagnostic),
            |d: &ControllerData| d.info.cpu_temperature.map(SensorValue::Float),
        ));
    }

    if board.capabilities.wifi {
        sensors.push(SensorEntity::new(
            SensorEntityDescription::new("wifi_signal", "Wi-Fi signal")
                .device_class("signal_strength")
                .state_class("measurement")
                .unit("dBm")
                .entity_category(EntityCategory::Diagnostic),
            |d: &ControllerData| {
                d.info
                    .wifi
                    .as_ref()
                    .map(|w| SensorValue::Int(w.rssi.into()))
            },
        ));
    }

    sensors
        .into_iter()
        .map(|sensor| sensor.with_device(device.clone()))
        .collect()
}
