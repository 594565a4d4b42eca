//! Integration tests against a simulated Mercury iTC.
//!
//! The mock keeps a table of payloads per `uid:path`, answers READ with the
//! stored payload (unit suffix included, as the hardware does) and applies SET
//! after checking the value the same way the controller does. It runs over
//! `tokio::io::duplex` or a real loopback TCP socket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use daq_core::capabilities::{Parameterized, Readable};
use daq_core::driver::{Capability, DriverFactory};
use daq_driver_oxford::mapping::ChannelMap;
use daq_driver_oxford::observer::{NullObserver, TracingObserver};
use daq_driver_oxford::protocol::{AttributePath, AttributeValue, SuffixTable, WriteValue};
use daq_driver_oxford::transport::PortTransport;
use daq_driver_oxford::{MercuryItcDriver, MercuryItcFactory, ProtocolError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing_test::traced_test;

// =============================================================================
// Mock Mercury iTC
// =============================================================================

type State = Arc<Mutex<HashMap<String, String>>>;

fn teslatron_state() -> State {
    let entries = [
        ("MB1.T1:TEMP:SIG:TEMP", "4.2130K"),
        ("MB1.T1:TEMP:LOOP:TSET", "4.2000K"),
        ("MB1.T1:TEMP:LOOP:RSET", "1.0000K/m"),
        ("MB1.T1:TEMP:LOOP:RENA", "OFF"),
        ("MB1.T1:TEMP:LOOP:ENAB", "ON"),
        ("MB1.T1:TEMP:LOOP:HSET", "12.50"),
        ("DB8.T1:TEMP:SIG:TEMP", "4.3050K"),
        ("DB8.T1:TEMP:LOOP:TSET", "4.3000K"),
        ("DB8.T1:TEMP:LOOP:RSET", "0.5000K/m"),
        ("DB8.T1:TEMP:LOOP:RENA", "ON"),
        ("DB8.T1:TEMP:LOOP:ENAB", "ON"),
        ("DB8.T1:TEMP:LOOP:HSET", "3.20"),
        ("DB5.P1:PRES:SIG:PRES", "5.02mB"),
        ("DB5.P1:PRES:LOOP:PRST", "5.00mB"),
        ("DB5.P1:PRES:LOOP:FSET", "25.00"),
        ("DB5.P1:PRES:LOOP:ENAB", "ON"),
    ];
    Arc::new(Mutex::new(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    ))
}

fn unit_for(path: &str) -> &'static str {
    match path {
        "TEMP:LOOP:TSET" => "K",
        "TEMP:LOOP:RSET" => "K/m",
        "PRES:LOOP:PRST" => "mB",
        _ => "",
    }
}

/// Validate and store a SET value, returning false where the controller
/// would answer INVALID.
fn apply_set(state: &State, key: &str, path: &str, value: &str) -> bool {
    let accepted = match path {
        "TEMP:LOOP:RENA" | "TEMP:LOOP:ENAB" | "PRES:LOOP:ENAB" => value == "ON" || value == "OFF",
        // Heater limit configured on the controller, tighter than the 0-100 % range
        "TEMP:LOOP:HSET" => value.parse::<f64>().map_or(false, |v| v <= 80.0),
        _ => value.parse::<f64>().is_ok(),
    };
    if accepted {
        let stored = format!("{}{}", value, unit_for(path));
        state.lock().unwrap().insert(key.to_string(), stored);
    }
    accepted
}

fn respond(state: &State, line: &str) -> String {
    let fields: Vec<&str> = line.split(':').collect();
    match fields.as_slice() {
        ["READ", "DEV", uid, a, b, c] => {
            let path = format!("{}:{}:{}", a, b, c);
            let key = format!("{}:{}", uid, path);
            let payload = state
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .unwrap_or_else(|| "NOT_FOUND".to_string());
            format!("STAT:DEV:{}:{}:{}", uid, path, payload)
        }
        ["SET", "DEV", uid, a, b, c, value] => {
            let path = format!("{}:{}:{}", a, b, c);
            let key = format!("{}:{}", uid, path);
            let ack = if apply_set(state, &key, &path, value) {
                "VALID"
            } else {
                "INVALID"
            };
            format!("STAT:SET:DEV:{}:{}:{}:{}", uid, path, value, ack)
        }
        _ => format!("STAT:{}:INVALID", line),
    }
}

/// Serve one connection until the client hangs up.
async fn serve<S>(stream: S, state: State, log: Arc<Mutex<Vec<String>>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    loop {
        let mut line = String::new();
        match stream.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let command = line.trim_end().to_string();
        let reply = respond(&state, &command);
        log.lock().unwrap().push(command);
        if stream
            .get_mut()
            .write_all(format!("{}\n", reply).as_bytes())
            .await
            .is_err()
        {
            break;
        }
    }
}

struct Harness {
    driver: Arc<MercuryItcDriver>,
    state: State,
    log: Arc<Mutex<Vec<String>>>,
}

fn duplex_harness(tracing: bool) -> Harness {
    let (host, device) = tokio::io::duplex(4096);
    let state = teslatron_state();
    let log = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn(serve(host, state.clone(), log.clone()));

    let observer: Arc<dyn daq_driver_oxford::observer::ExchangeObserver> = if tracing {
        Arc::new(TracingObserver)
    } else {
        Arc::new(NullObserver)
    };
    let driver = MercuryItcDriver::new(
        Arc::new(PortTransport::new(Box::new(device))),
        ChannelMap::teslatron().unwrap(),
        SuffixTable::default(),
        observer,
    );

    Harness {
        driver: Arc::new(driver),
        state,
        log,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_typed_reads_decode_every_unit_format() {
    let h = duplex_harness(false);
    let d = &h.driver;

    assert_eq!(d.temperature("VTI").await.unwrap(), 4.213);
    assert_eq!(d.temperature_setpoint("probe").await.unwrap(), 4.3);
    assert_eq!(d.ramp_rate("VTI").await.unwrap(), 1.0);
    assert!(!d.ramp_enabled("VTI").await.unwrap());
    assert!(d.pid_enabled("probe").await.unwrap());
    assert_eq!(d.heater_output("probe").await.unwrap(), 3.2);
    assert_eq!(d.pressure("pressure").await.unwrap(), 5.02);
    assert_eq!(d.pressure_setpoint("pressure").await.unwrap(), 5.0);
    assert_eq!(d.flow("pressure").await.unwrap(), 25.0);
    assert!(d.pressure_control_enabled("pressure").await.unwrap());
}

#[tokio::test]
async fn test_typed_writes_use_fixed_precision() {
    let h = duplex_harness(false);
    let d = &h.driver;

    d.set_temperature_setpoint("VTI", 10.0).await.unwrap();
    d.set_ramp_rate("probe", 0.25).await.unwrap();
    d.set_ramp_enabled("VTI", true).await.unwrap();
    d.set_pid_enabled("probe", false).await.unwrap();
    d.set_heater_output("VTI", 33.333).await.unwrap();
    d.set_flow("pressure", 7.5).await.unwrap();
    d.set_pressure_setpoint("pressure", 12.0).await.unwrap();
    d.set_pressure_control_enabled("pressure", false).await.unwrap();

    let log = h.log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            "SET:DEV:MB1.T1:TEMP:LOOP:TSET:10.000",
            "SET:DEV:DB8.T1:TEMP:LOOP:RSET:0.250",
            "SET:DEV:MB1.T1:TEMP:LOOP:RENA:ON",
            "SET:DEV:DB8.T1:TEMP:LOOP:ENAB:OFF",
            "SET:DEV:MB1.T1:TEMP:LOOP:HSET:33.33",
            "SET:DEV:DB5.P1:PRES:LOOP:FSET:7.50",
            "SET:DEV:DB5.P1:PRES:LOOP:PRST:12.00",
            "SET:DEV:DB5.P1:PRES:LOOP:ENAB:OFF",
        ]
    );

    // Written values read back through the suffix table
    assert_eq!(d.temperature_setpoint("VTI").await.unwrap(), 10.0);
    assert_eq!(d.ramp_rate("probe").await.unwrap(), 0.25);
    assert_eq!(d.pressure_setpoint("pressure").await.unwrap(), 12.0);
    assert_eq!(
        h.state.lock().unwrap().get("DB5.P1:PRES:LOOP:PRST").cloned(),
        Some("12.00mB".to_string())
    );
}

#[tokio::test]
async fn test_generic_attribute_access() {
    let h = duplex_harness(false);
    let d = &h.driver;

    let value = d
        .read_attribute("probe", AttributePath::RampEnable)
        .await
        .unwrap();
    assert_eq!(value, AttributeValue::Flag(true));

    d.write_attribute("probe", AttributePath::RampEnable, WriteValue::Flag(false))
        .await
        .unwrap();
    let cached = d.parameters().get("probe_ramp_mode").unwrap().get_json().unwrap();
    assert_eq!(cached, serde_json::json!(false));

    let err = d
        .write_attribute("VTI", AttributePath::Temperature, WriteValue::Number(4.0))
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<ProtocolError>(),
        Some(&ProtocolError::ReadOnlyPath("TEMP:SIG:TEMP"))
    );
}

#[tokio::test]
async fn test_device_rejection_surfaces() {
    let h = duplex_harness(false);

    let err = h.driver.set_heater_output("VTI", 90.0).await.unwrap_err();
    assert!(format!("{:#}", err).contains("INVALID"));
    assert!(matches!(
        err.downcast_ref::<ProtocolError>(),
        Some(ProtocolError::DeviceRejected { .. })
    ));
    assert_eq!(
        h.state.lock().unwrap().get("MB1.T1:TEMP:LOOP:HSET").cloned(),
        Some("12.50".to_string())
    );
}

#[tokio::test]
async fn test_precondition_errors_send_nothing() {
    let h = duplex_harness(false);

    let err = h
        .driver
        .write_attribute("VTI", AttributePath::RampEnable, WriteValue::Number(1.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProtocolError>(),
        Some(ProtocolError::ValueKindMismatch { .. })
    ));

    let err = h.driver.flow("gasflow").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProtocolError>(),
        Some(ProtocolError::ChannelKindMismatch { .. })
    ));
    assert!(h.log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_uid_reply_is_unparseable() {
    let h = duplex_harness(false);
    h.state.lock().unwrap().remove("DB5.P1:PRES:SIG:PRES");

    let err = h.driver.pressure("pressure").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProtocolError>(),
        Some(ProtocolError::UnparseableNumber { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_reads_do_not_interleave() {
    let h = duplex_harness(false);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let d = h.driver.clone();
        tasks.push(tokio::spawn(async move {
            let vti = d.temperature("VTI").await.unwrap();
            let p = d.pressure("pressure").await.unwrap();
            let probe = d.temperature("probe").await.unwrap();
            (vti, p, probe)
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), (4.213, 5.02, 4.305));
    }
    assert_eq!(h.log.lock().unwrap().len(), 24);
}

#[tokio::test]
#[traced_test]
async fn test_tracing_observer_reports_channel_names() {
    let h = duplex_harness(true);
    h.driver.heater_output("VTI").await.unwrap();
    h.driver.set_flow("pressure", 30.0).await.unwrap();

    assert!(logs_contain("READ:DEV:MB1.T1:TEMP:LOOP:HSET"));
    assert!(logs_contain("channel=\"VTI\""));
    assert!(logs_contain("attribute=PRES:LOOP:FSET"));
    assert!(logs_contain("value=30"));
}

#[tokio::test]
async fn test_factory_builds_over_tcp() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = teslatron_state();
    let log = Arc::new(Mutex::new(Vec::new()));
    {
        let (state, log) = (state.clone(), log.clone());
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            serve(socket, state, log).await;
        });
    }

    let mut config = toml::Table::new();
    config.insert("host".into(), "127.0.0.1".into());
    config.insert("tcp_port".into(), i64::from(port).into());
    config.insert("primary_channel".into(), "probe".into());
    config.insert("timeout_ms".into(), 2000_i64.into());
    let config = toml::Value::Table(config);

    let factory = MercuryItcFactory;
    factory.validate(&config).unwrap();
    let components = tokio::time::timeout(Duration::from_secs(5), factory.build(config))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        components.capabilities(),
        vec![Capability::Readable, Capability::Parameterized]
    );
    assert_eq!(components.metadata.measurement_units.as_deref(), Some("K"));

    let readable = components.readable.unwrap();
    assert_eq!(readable.read().await.unwrap(), 4.305);
    assert_eq!(readable.units(), Some("K"));

    let params = components.parameterized.unwrap();
    let params = params.parameters();
    assert_eq!(params.len(), 16);

    params
        .get("VTI_setpoint")
        .unwrap()
        .set_json(serde_json::json!(77.0))
        .await
        .unwrap();
    assert_eq!(
        params
            .get("VTI_setpoint")
            .unwrap()
            .refresh_json()
            .await
            .unwrap(),
        serde_json::json!(77.0)
    );
    assert!(params
        .get("VTI_setpoint")
        .unwrap()
        .set_json(serde_json::json!(500.0))
        .await
        .is_err());

    assert_eq!(
        log.lock().unwrap().first().map(String::as_str),
        Some("READ:DEV:DB8.T1:TEMP:SIG:TEMP")
    );
}
