//! Operations the CLI runs against a device's parameter registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use daq_core::capabilities::Parameterized;
use daq_core::observable::ParameterSet;
use daq_driver_oxford::observer::NullObserver;
use daq_driver_oxford::transport::OfflineTransport;
use daq_driver_oxford::{MercuryItcConfig, MercuryItcDriver};
use serde::Serialize;
use serde_json::Value;

/// One row of `list` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSummary {
    /// Parameter name
    pub name: String,
    /// Physical units, if any
    pub units: Option<String>,
    /// Whether writes are refused
    pub read_only: bool,
    /// Inclusive bounds, when range-checked
    pub range: Option<(f64, f64)>,
    /// Last cached value (no device traffic)
    pub cached: Value,
}

/// Describe every parameter without touching the device.
pub fn list(params: &ParameterSet) -> Vec<ParameterSummary> {
    params
        .iter()
        .map(|(name, param)| {
            let meta = param.metadata();
            ParameterSummary {
                name: name.to_string(),
                units: meta.units,
                read_only: meta.read_only,
                range: meta.min_value.zip(meta.max_value),
                cached: param.get_json().unwrap_or(Value::Null),
            }
        })
        .collect()
}

/// Describe the parameters a configured controller exposes, without
/// opening its port.
pub fn describe(instrument_config: &toml::Value) -> Result<Vec<ParameterSummary>> {
    let cfg: MercuryItcConfig = instrument_config
        .clone()
        .try_into()
        .context("Invalid Mercury iTC config")?;
    let driver =
        MercuryItcDriver::from_config(&cfg, Arc::new(OfflineTransport), Arc::new(NullObserver))?;
    Ok(list(driver.parameters()))
}

/// Read one parameter from the device.
pub async fn get(params: &ParameterSet, name: &str) -> Result<Value> {
    let param = params.require(name)?;
    param
        .refresh_json()
        .await
        .with_context(|| format!("Failed to read '{}'", name))
}

/// Write one parameter. `raw` is parsed with [`parse_value`].
pub async fn set(params: &ParameterSet, name: &str, raw: &str) -> Result<()> {
    let param = params.require(name)?;
    param
        .set_json(parse_value(raw))
        .await
        .with_context(|| format!("Failed to set '{}' to {}", name, raw))
}

/// Read every parameter from the device.
///
/// Parameters that fail are logged and left out so one bad channel does not
/// hide the rest.
pub async fn snapshot(params: &ParameterSet) -> BTreeMap<String, Value> {
    let mut values = BTreeMap::new();
    for (name, param) in params.iter() {
        match param.refresh_json().await {
            Ok(value) => {
                values.insert(name.to_string(), value);
            }
            Err(e) => tracing::warn!(parameter = name, error = %format!("{:#}", e), "Read failed"),
        }
    }
    values
}

/// Interpret a command-line value: JSON first, then `ON`/`OFF`, then a
/// plain string.
pub fn parse_value(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }
    match raw.to_ascii_uppercase().as_str() {
        "ON" => Value::Bool(true),
        "OFF" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_core::parameter::Parameter;
    use futures::FutureExt;
    use serde_json::json;

    fn registry() -> ParameterSet {
        let mut params = ParameterSet::new();

        let mut setpoint = Parameter::new("VTI_setpoint", 4.2)
            .with_unit("K")
            .with_range(0.0, 300.0);
        setpoint.connect_to_hardware(
            |_| async { Ok(()) }.boxed(),
            || async { Ok(10.0) }.boxed(),
        );
        params.register(setpoint);

        let mut temp = Parameter::new("VTI_temp", 0.0).with_unit("K").read_only();
        temp.connect_to_hardware_read(|| async { Ok(4.213) }.boxed());
        params.register(temp);

        let mut broken = Parameter::new("probe_temp", 0.0).read_only();
        broken.connect_to_hardware_read(|| {
            async { Err(daq_core::DaqError::Instrument("no reply".into())) }.boxed()
        });
        params.register(broken);

        params
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("4.2"), json!(4.2));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("on"), json!(true));
        assert_eq!(parse_value("OFF"), json!(false));
        assert_eq!(parse_value("MB1.T1"), json!("MB1.T1"));
    }

    #[test]
    fn test_list_reports_metadata() {
        let params = registry();
        let rows = list(&params);

        assert_eq!(rows.len(), 3);
        let setpoint = rows.iter().find(|r| r.name == "VTI_setpoint").unwrap();
        assert_eq!(setpoint.units.as_deref(), Some("K"));
        assert_eq!(setpoint.range, Some((0.0, 300.0)));
        assert_eq!(setpoint.cached, json!(4.2));
        assert!(rows.iter().find(|r| r.name == "VTI_temp").unwrap().read_only);
    }

    #[test]
    fn test_describe_without_controller() {
        // Documentation address; nothing listens there
        let config: toml::Value = toml::from_str(r#"host = "192.0.2.1""#).unwrap();
        let rows = describe(&config).unwrap();

        assert_eq!(rows.len(), 16);
        let flow = rows.iter().find(|r| r.name == "pressure_flow").unwrap();
        assert_eq!(flow.units.as_deref(), Some("%"));
        assert_eq!(flow.range, Some((0.0, 100.0)));
        assert!(rows.iter().find(|r| r.name == "VTI_temp").unwrap().read_only);
    }

    #[test]
    fn test_describe_rejects_bad_config() {
        let config: toml::Value =
            toml::from_str("host = \"192.0.2.1\"\nprimary_channel = \"gasflow\"").unwrap();
        assert!(describe(&config).is_err());
    }

    #[tokio::test]
    async fn test_get_and_set() {
        let params = registry();

        assert_eq!(get(&params, "VTI_temp").await.unwrap(), json!(4.213));
        set(&params, "VTI_setpoint", "12.5").await.unwrap();
        assert_eq!(params.require("VTI_setpoint").unwrap().get_json().unwrap(), json!(12.5));

        assert!(set(&params, "VTI_setpoint", "400").await.is_err());
        assert!(set(&params, "VTI_temp", "1").await.is_err());
        assert!(get(&params, "nonexistent").await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_skips_failures() {
        let params = registry();
        let values = snapshot(&params).await;

        assert_eq!(values.get("VTI_setpoint"), Some(&json!(10.0)));
        assert_eq!(values.get("VTI_temp"), Some(&json!(4.213)));
        assert!(!values.contains_key("probe_temp"));
    }
}
