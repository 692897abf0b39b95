//! Credential redaction for diagnostics output

use serde_json::{Map, Value};

/// Placeholder written in place of a redacted value
pub const REDACTED: &str = "**REDACTED**";

/// Replace the value of every key named in `to_redact`, at any depth.
///
/// Maps and lists are walked recursively; scalars at the top level pass
/// through unchanged. Null values and empty strings are left alone so the
/// output still shows that a field was unset.
pub fn async_redact_data(data: &Value, to_redact: &[&str]) -> Value {
    match data {
        Value::Object(map) => Value::Object(redact_map(map, to_redact)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| async_redact_data(item, to_redact))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn redact_map(map: &Map<String, Value>, to_redact: &[&str]) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let redacted = match value {
                Value::Null => Value::Null,
                Value::String(s) if s.is_empty() => value.clone(),
                _ if to_redact.contains(&key.as_str()) => Value::String(REDACTED.to_string()),
                _ => async_redact_data(value, to_redact),
            };
            (key.clone(), redacted)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_nested_keys() {
        let data = json!({
            "host": "192.168.1.20",
            "password": "hunter2",
            "wifi": {"ssid": "home", "wifi_ssid": "home", "rssi": -60},
            "interfaces": [{"mac": "AA:BB"}, {"mac": "CC:DD", "up": true}],
        });

        let redacted = async_redact_data(&data, &["password", "wifi_ssid", "mac"]);

        assert_eq!(
            redacted,
            json!({
                "host": "192.168.1.20",
                "password": REDACTED,
                "wifi": {"ssid": "home", "wifi_ssid": REDACTED, "rssi": -60},
                "interfaces": [{"mac": REDACTED}, {"mac": REDACTED, "up": true}],
            })
        );
    }

    #[test]
    fn test_whole_subtree_is_redacted_by_key() {
        let data = json!({"config": {"api_key": {"primary": "a", "secondary": "b"}}});
        let redacted = async_redact_data(&data, &["api_key"]);
        assert_eq!(redacted, json!({"config": {"api_key": REDACTED}}));
    }

    #[test]
    fn test_unset_values_are_kept() {
        let data = json!({"token": null, "password": "", "serial_number": 0});
        let redacted = async_redact_data(&data, &["token", "password", "serial_number"]);
        assert_eq!(
            redacted,
            json!({"token": null, "password": "", "serial_number": REDACTED})
        );
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(async_redact_data(&json!("secret"), &["secret"]), json!("secret"));
        assert_eq!(async_redact_data(&json!(42), &["x"]), json!(42));
    }

    #[test]
    fn test_key_order_is_preserved() {
        let data = json!({"z": 1, "a": "x", "m": 2});
        let redacted = async_redact_data(&data, &["a"]);
        let keys: Vec<_> = redacted.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }
}
