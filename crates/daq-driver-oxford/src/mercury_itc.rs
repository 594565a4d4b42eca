//! Oxford Instruments Mercury iTC Temperature/Pressure Controller Driver
//!
//! Reference: Mercury iTC Cryogenic Environment Controller Manual, SCPI-style
//! command section.
//!
//! Protocol Overview:
//! - Format: colon-delimited ASCII, one command line / one reply line
//! - Transport: Ethernet (raw TCP, port 7020) or RS-232/USB serial
//! - Terminator: `\n` by default
//! - Read:  `READ:DEV:<uid>:<path>`          → payload is reply field 6
//! - Write: `SET:DEV:<uid>:<path>:<value>`   → `...:VALID` or `...:INVALID`
//!
//! Response Formats (observed on a Teslatron VTI):
//! - `TEMP:SIG:TEMP`  → `4.213K`
//! - `TEMP:LOOP:RSET` → `1.0000K/m`
//! - `PRES:SIG:PRES`  → `5.02mB`
//! - `TEMP:LOOP:HSET` → `12.50`
//! - `*:ENAB`, `RENA` → `ON` / `OFF`
//!
//! Channels are logical names bound to board UIDs (`VTI` → `MB1.T1`); each
//! temperature or pressure channel gets its own set of parameters.
//!
//! # Usage
//!
//! ```rust,ignore
//! use daq_driver_oxford::MercuryItcFactory;
//! use daq_core::driver::DriverFactory;
//!
//! let config = toml::toml! {
//!     host = "192.168.1.20"
//!     primary_channel = "probe"
//! };
//! let factory = MercuryItcFactory;
//! factory.validate(&toml::Value::Table(config.clone()))?;
//! let components = factory.build(toml::Value::Table(config)).await?;
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use daq_core::capabilities::{Parameterized, Readable};
use daq_core::driver::{Capability, DeviceComponents, DeviceMetadata, DriverFactory};
use daq_core::error::DaqError;
use daq_core::observable::ParameterSet;
use daq_core::parameter::Parameter;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::instrument;

use crate::error::ProtocolError;
use crate::mapping::{ChannelKind, ChannelMap, DEFAULT_CHANNELS};
use crate::observer::{ExchangeObserver, TracingObserver};
use crate::protocol::{
    check_echo, check_write_ack, decode, echoed_uid, encode_read, encode_write, payload,
    AttributePath, AttributeValue, SuffixTable, ValueKind, WriteValue,
};
use crate::transport::{
    LineTransport, PortTransport, DEFAULT_TCP_PORT, DEFAULT_TERMINATOR, DEFAULT_TIMEOUT,
};

/// Upper bound of the pressure set-point, mbar.
pub const PRESSURE_SETPOINT_MAX: f64 = 50.0;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Mercury iTC driver
#[derive(Debug, Clone, Deserialize)]
pub struct MercuryItcConfig {
    /// TCP (`host`, `tcp_port`) or serial (`port`, `baud_rate`)
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    /// Line terminator appended to every command (default: "\n")
    #[serde(default = "default_terminator")]
    pub terminator: String,
    /// Reply timeout in milliseconds (default: 5000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Channel name → board UID and kind (default: Teslatron VTI layout)
    #[serde(default = "default_channels")]
    pub channels: BTreeMap<String, ChannelConfig>,
    /// Temperature channel returned by `Readable::read`
    #[serde(default)]
    pub primary_channel: Option<String>,
    /// Unit-suffix lengths keyed by attribute path, e.g. `"TEMP:LOOP:RSET" = 3`
    #[serde(default)]
    pub suffix_overrides: BTreeMap<String, usize>,
    /// Lower bound of pressure set-points in mbar (default: 1)
    #[serde(default = "default_pressure_setpoint_min")]
    pub pressure_setpoint_min: f64,
}

/// How to reach the controller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConnectionConfig {
    /// Ethernet interface.
    Tcp {
        /// IP address or host name
        host: String,
        /// TCP port (default: 7020)
        #[serde(default = "default_tcp_port")]
        tcp_port: u16,
    },
    /// RS-232 or USB serial.
    Serial {
        /// Serial port path (e.g., "/dev/ttyUSB0")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
}

/// One row of the channel table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelConfig {
    /// Board address, e.g. "MB1.T1"
    pub uid: String,
    /// Loop carried by the board
    pub kind: ChannelKind,
}

fn default_terminator() -> String {
    DEFAULT_TERMINATOR.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_pressure_setpoint_min() -> f64 {
    1.0
}

fn default_channels() -> BTreeMap<String, ChannelConfig> {
    DEFAULT_CHANNELS
        .iter()
        .map(|(name, uid, kind)| {
            (
                name.to_string(),
                ChannelConfig {
                    uid: uid.to_string(),
                    kind: *kind,
                },
            )
        })
        .collect()
}

impl MercuryItcConfig {
    /// Build the channel table, rejecting duplicate UIDs.
    pub fn channel_map(&self) -> Result<ChannelMap> {
        ChannelMap::new(
            self.channels
                .iter()
                .map(|(name, c)| (name.clone(), c.uid.clone(), c.kind)),
        )
        .context("Invalid Mercury iTC channel table")
    }

    /// Default suffix table with `suffix_overrides` applied.
    pub fn suffix_table(&self) -> Result<SuffixTable> {
        SuffixTable::with_overrides(&self.suffix_overrides).context("Invalid suffix_overrides")
    }

    /// Reply timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve the primary temperature channel: the configured one, or the
    /// first temperature channel by name. `None` if there is none.
    pub fn primary(&self, channels: &ChannelMap) -> Result<Option<String>> {
        match &self.primary_channel {
            Some(name) => {
                let kind = channels.kind(name)?;
                if kind != ChannelKind::Temperature {
                    return Err(DaqError::Configuration(format!(
                        "primary_channel '{}' is a {} channel, expected temperature",
                        name, kind
                    ))
                    .into());
                }
                Ok(Some(name.clone()))
            }
            None => Ok(channels
                .channels_of(ChannelKind::Temperature)
                .next()
                .map(str::to_string)),
        }
    }

    /// Check everything that can be checked without hardware.
    pub fn validate(&self) -> Result<()> {
        if self.terminator.is_empty() {
            return Err(DaqError::Configuration("terminator must not be empty".into()).into());
        }
        if self.timeout_ms == 0 {
            return Err(DaqError::Configuration("timeout_ms must be positive".into()).into());
        }

        let channels = self.channel_map()?;
        let loops = channels
            .iter()
            .filter(|(_, _, kind)| *kind != ChannelKind::Auxiliary)
            .count();
        if loops == 0 {
            return Err(DaqError::Configuration(
                "channel table needs at least one temperature or pressure channel".into(),
            )
            .into());
        }

        self.primary(&channels)?;
        self.suffix_table()?;

        let min = self.pressure_setpoint_min;
        if !(0.0..=PRESSURE_SETPOINT_MAX).contains(&min) {
            return Err(DaqError::Configuration(format!(
                "pressure_setpoint_min {} outside 0-{} mbar",
                min, PRESSURE_SETPOINT_MAX
            ))
            .into());
        }

        let mut seen = BTreeSet::new();
        for (name, _) in parameter_layout(&channels) {
            if !seen.insert(name.clone()) {
                return Err(DaqError::Configuration(format!(
                    "channel names produce duplicate parameter '{}'",
                    name
                ))
                .into());
            }
        }

        Ok(())
    }
}

// =============================================================================
// MercuryItcFactory - DriverFactory implementation
// =============================================================================

/// Factory for creating Mercury iTC driver instances.
pub struct MercuryItcFactory;

static MERCURY_ITC_CAPABILITIES: &[Capability] = &[Capability::Readable, Capability::Parameterized];

impl DriverFactory for MercuryItcFactory {
    fn driver_type(&self) -> &'static str {
        "mercury_itc"
    }

    fn name(&self) -> &'static str {
        "Oxford Instruments Mercury iTC"
    }

    fn capabilities(&self) -> &'static [Capability] {
        MERCURY_ITC_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: MercuryItcConfig = config
            .clone()
            .try_into()
            .context("Invalid Mercury iTC config")?;
        cfg.validate()
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let cfg: MercuryItcConfig = config.try_into().context("Invalid Mercury iTC config")?;
            cfg.validate()?;

            let transport = match &cfg.connection {
                ConnectionConfig::Tcp { host, tcp_port } => {
                    PortTransport::connect_tcp(host, *tcp_port, cfg.timeout()).await?
                }
                ConnectionConfig::Serial { port, baud_rate } => {
                    PortTransport::open_serial(port, *baud_rate)
                        .await?
                        .with_timeout(cfg.timeout())
                }
            }
            .with_terminator(cfg.terminator.clone());

            let driver = Arc::new(MercuryItcDriver::from_config(
                &cfg,
                Arc::new(transport),
                Arc::new(TracingObserver),
            )?);

            let mut components = DeviceComponents::new()
                .with_parameterized(driver.clone())
                .with_metadata(DeviceMetadata {
                    model: Some("Oxford Instruments Mercury iTC".to_string()),
                    measurement_units: driver.primary_channel().map(|_| "K".to_string()),
                });
            if driver.primary_channel().is_some() {
                components = components.with_readable(driver);
            }
            Ok(components)
        })
    }
}

// =============================================================================
// Parameter layout
// =============================================================================

/// How one attribute of a channel is exposed as a parameter.
#[derive(Debug, Clone, Copy)]
struct ParameterTemplate {
    /// Appended to the channel name.
    suffix: &'static str,
    path: AttributePath,
    unit: &'static str,
    range: Option<(f64, f64)>,
    description: &'static str,
}

const TEMPERATURE_PARAMETERS: &[ParameterTemplate] = &[
    ParameterTemplate {
        suffix: "_temp",
        path: AttributePath::Temperature,
        unit: "K",
        range: None,
        description: "Sensor temperature",
    },
    ParameterTemplate {
        suffix: "_setpoint",
        path: AttributePath::TemperatureSetpoint,
        unit: "K",
        range: Some((0.0, 300.0)),
        description: "Loop temperature set-point",
    },
    ParameterTemplate {
        suffix: "_ramp_rate",
        path: AttributePath::RampRate,
        unit: "K/min",
        range: Some((0.0, 10.0)),
        description: "Set-point ramp rate",
    },
    ParameterTemplate {
        suffix: "_ramp_mode",
        path: AttributePath::RampEnable,
        unit: "",
        range: None,
        description: "Set-point ramping enabled",
    },
    ParameterTemplate {
        suffix: "_pid_mode",
        path: AttributePath::LoopEnable,
        unit: "",
        range: None,
        description: "PID control enabled (off: manual heater output)",
    },
    ParameterTemplate {
        suffix: "_heater",
        path: AttributePath::HeaterOutput,
        unit: "%",
        range: Some((0.0, 100.0)),
        description: "Heater output",
    },
];

// The set-point lower bound comes from configuration
const PRESSURE_PARAMETERS: &[ParameterTemplate] = &[
    ParameterTemplate {
        suffix: "_control_mode",
        path: AttributePath::PressureControlEnable,
        unit: "",
        range: None,
        description: "Automatic pressure control enabled",
    },
    ParameterTemplate {
        suffix: "_flow",
        path: AttributePath::FlowSetpoint,
        unit: "%",
        range: Some((0.0, 100.0)),
        description: "Needle-valve flow",
    },
    ParameterTemplate {
        suffix: "",
        path: AttributePath::Pressure,
        unit: "mbar",
        range: None,
        description: "Sensor pressure",
    },
    ParameterTemplate {
        suffix: "_setpoint",
        path: AttributePath::PressureSetpoint,
        unit: "mbar",
        range: Some((1.0, PRESSURE_SETPOINT_MAX)),
        description: "Pressure set-point",
    },
];

/// `(parameter name, (channel, template))` for every loop channel.
fn parameter_layout(channels: &ChannelMap) -> Vec<(String, (String, ParameterTemplate))> {
    let mut layout = Vec::new();
    for (kind, templates) in [
        (ChannelKind::Temperature, TEMPERATURE_PARAMETERS),
        (ChannelKind::Pressure, PRESSURE_PARAMETERS),
    ] {
        for channel in channels.channels_of(kind) {
            for template in templates {
                layout.push((
                    format!("{}{}", channel, template.suffix),
                    (channel.to_string(), *template),
                ));
            }
        }
    }
    layout
}

/// Values that travel between a `Parameter<T>` and the wire.
trait WireValue: Clone + Send + Sync + PartialEq + Debug + 'static {
    fn to_write(&self) -> WriteValue;
    fn from_reply(value: AttributeValue) -> Option<Self>;
}

impl WireValue for f64 {
    fn to_write(&self) -> WriteValue {
        WriteValue::Number(*self)
    }

    fn from_reply(value: AttributeValue) -> Option<Self> {
        value.as_number()
    }
}

impl WireValue for bool {
    fn to_write(&self) -> WriteValue {
        WriteValue::Flag(*self)
    }

    fn from_reply(value: AttributeValue) -> Option<Self> {
        value.as_flag()
    }
}

/// A registered parameter, kept typed for cache updates and validation.
#[derive(Clone)]
enum Handle {
    Number(Parameter<f64>),
    Flag(Parameter<bool>),
}

impl Handle {
    fn cache(&self, value: AttributeValue) {
        match (self, value) {
            (Self::Number(p), AttributeValue::Number(v)) => p.inner().set_unchecked(v),
            (Self::Flag(p), AttributeValue::Flag(b)) => p.inner().set_unchecked(b),
            _ => {}
        }
    }

    fn cache_written(&self, value: WriteValue) {
        match (self, value) {
            (Self::Number(p), WriteValue::Number(v)) => p.inner().set_unchecked(v),
            (Self::Flag(p), WriteValue::Flag(b)) => p.inner().set_unchecked(b),
            _ => {}
        }
    }

    fn validate(&self, value: &WriteValue) -> Result<(), DaqError> {
        match (self, value) {
            (Self::Number(p), WriteValue::Number(v)) => p.inner().validate(v),
            (Self::Flag(p), WriteValue::Flag(b)) => p.inner().validate(b),
            // Variant mismatch is reported by the encoder
            _ => Ok(()),
        }
    }
}

// =============================================================================
// ItcClient - codec + transport + observer
// =============================================================================

/// One exchange per call; shared by the driver and parameter callbacks.
struct ItcClient {
    transport: Arc<dyn LineTransport>,
    channels: ChannelMap,
    suffixes: SuffixTable,
    observer: Arc<dyn ExchangeObserver>,
}

impl ItcClient {
    fn resolve(&self, channel: &str, path: AttributePath) -> Result<&str, ProtocolError> {
        let kind = self.channels.kind(channel)?;
        if kind != path.loop_kind() {
            return Err(ProtocolError::ChannelKindMismatch {
                channel: channel.to_string(),
                kind: kind.as_str(),
                path: path.as_str(),
            });
        }
        self.channels.uid(channel)
    }

    /// Channel name of the UID a reply echoes, so a stray answer is logged
    /// against the channel that actually sent it. Unmapped UIDs are shown
    /// as is.
    fn responder<'a>(&'a self, reply: &'a str, addressed: &'a str) -> &'a str {
        match echoed_uid(reply) {
            Some(uid) => self.channels.name(uid).unwrap_or(uid),
            None => addressed,
        }
    }

    async fn read(&self, channel: &str, path: AttributePath) -> Result<AttributeValue> {
        let uid = self.resolve(channel, path)?;
        let name = self.channels.name(uid)?;
        let command = encode_read(uid, path);

        self.observer.on_command(name, &command);
        let reply = self
            .transport
            .query(&command)
            .await
            .with_context(|| format!("Mercury iTC exchange failed: {}", command))?;
        self.observer.on_reply(self.responder(&reply, name), &reply);

        payload(&reply)
            .and_then(|_| check_echo(&command, uid, path, &reply))
            .with_context(|| format!("Mercury iTC reply to {}", command))?;
        let value = decode(&reply, self.suffixes.reply_kind(path))
            .with_context(|| format!("Mercury iTC reply to {}", command))?;
        self.observer.on_value(name, path, &value);
        Ok(value)
    }

    async fn write(&self, channel: &str, path: AttributePath, value: WriteValue) -> Result<()> {
        let uid = self.resolve(channel, path)?;
        let name = self.channels.name(uid)?;
        let command = encode_write(uid, path, &value)?;

        self.observer.on_command(name, &command);
        let reply = self
            .transport
            .query(&command)
            .await
            .with_context(|| format!("Mercury iTC exchange failed: {}", command))?;
        self.observer.on_reply(self.responder(&reply, name), &reply);

        check_echo(&command, uid, path, &reply)?;
        check_write_ack(&command, &reply)?;
        self.observer.on_written(name, path, &value);
        Ok(())
    }
}

fn instrument_error(e: anyhow::Error) -> DaqError {
    DaqError::Instrument(format!("{:#}", e))
}

fn hardware_parameter<T: WireValue>(
    mut param: Parameter<T>,
    client: &Arc<ItcClient>,
    channel: &str,
    path: AttributePath,
) -> Parameter<T> {
    let reader_client = client.clone();
    let reader_channel = channel.to_string();
    param.connect_to_hardware_read(move || {
        let client = reader_client.clone();
        let channel = reader_channel.clone();
        Box::pin(async move {
            let value = client.read(&channel, path).await.map_err(instrument_error)?;
            T::from_reply(value).ok_or_else(|| {
                DaqError::Instrument(format!("{} on '{}' decoded to {}", path, channel, value))
            })
        })
    });

    if path.writable() {
        let writer_client = client.clone();
        let writer_channel = channel.to_string();
        param.connect_to_hardware_write(move |value: T| {
            let client = writer_client.clone();
            let channel = writer_channel.clone();
            Box::pin(async move {
                client
                    .write(&channel, path, value.to_write())
                    .await
                    .map_err(instrument_error)
            })
        });
    }

    param
}

// =============================================================================
// MercuryItcDriver
// =============================================================================

/// Driver for the Oxford Instruments Mercury iTC.
///
/// Every operation is exactly one command/reply exchange. Reads refresh the
/// matching parameter's cached value; writes are range-checked against the
/// parameter before anything is encoded.
pub struct MercuryItcDriver {
    client: Arc<ItcClient>,
    primary: Option<String>,
    handles: BTreeMap<(String, AttributePath), Handle>,
    params: Arc<ParameterSet>,
}

impl MercuryItcDriver {
    /// Driver with the first temperature channel as primary and the default
    /// pressure set-point floor.
    pub fn new(
        transport: Arc<dyn LineTransport>,
        channels: ChannelMap,
        suffixes: SuffixTable,
        observer: Arc<dyn ExchangeObserver>,
    ) -> Self {
        let primary = channels
            .channels_of(ChannelKind::Temperature)
            .next()
            .map(str::to_string);
        let client = ItcClient {
            transport,
            channels,
            suffixes,
            observer,
        };
        Self::build(client, primary, default_pressure_setpoint_min())
    }

    /// Driver from a validated configuration.
    pub fn from_config(
        cfg: &MercuryItcConfig,
        transport: Arc<dyn LineTransport>,
        observer: Arc<dyn ExchangeObserver>,
    ) -> Result<Self> {
        cfg.validate()?;
        let channels = cfg.channel_map()?;
        let primary = cfg.primary(&channels)?;
        let client = ItcClient {
            transport,
            channels,
            suffixes: cfg.suffix_table()?,
            observer,
        };
        Ok(Self::build(client, primary, cfg.pressure_setpoint_min))
    }

    fn build(client: ItcClient, primary: Option<String>, pressure_setpoint_min: f64) -> Self {
        for (path, len) in client.suffixes.unconfirmed() {
            tracing::warn!(
                attribute = %path,
                strip = len,
                "Unit suffix length not confirmed against hardware; set suffix_overrides once verified"
            );
        }

        let client = Arc::new(client);
        let mut params = ParameterSet::new();
        let mut handles = BTreeMap::new();

        for (name, (channel, template)) in parameter_layout(&client.channels) {
            let range = match template.path {
                AttributePath::PressureSetpoint => {
                    Some((pressure_setpoint_min, PRESSURE_SETPOINT_MAX))
                }
                _ => template.range,
            };

            let handle = match template.path.value_kind() {
                ValueKind::Numeric => {
                    let mut param = Parameter::new(name, 0.0)
                        .with_description(template.description)
                        .with_unit(template.unit)
                        .with_dtype("float");
                    if let Some((min, max)) = range {
                        param = param.with_range(min, max);
                    }
                    if !template.path.writable() {
                        param = param.read_only();
                    }
                    let param = hardware_parameter(param, &client, &channel, template.path);
                    params.register(param.clone());
                    Handle::Number(param)
                }
                ValueKind::Flag => {
                    let param = Parameter::new(name, false)
                        .with_description(template.description)
                        .with_dtype("bool");
                    let param = hardware_parameter(param, &client, &channel, template.path);
                    params.register(param.clone());
                    Handle::Flag(param)
                }
            };
            handles.insert((channel, template.path), handle);
        }

        Self {
            client,
            primary,
            handles,
            params: Arc::new(params),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_test_port(port: daq_core::port::DynPort) -> Self {
        use crate::observer::NullObserver;

        Self::new(
            Arc::new(PortTransport::new(port)),
            ChannelMap::teslatron().unwrap(),
            SuffixTable::default(),
            Arc::new(NullObserver),
        )
    }

    /// Channel table in use.
    pub fn channels(&self) -> &ChannelMap {
        &self.client.channels
    }

    /// Channel read by [`Readable::read`].
    pub fn primary_channel(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    /// Read any attribute of a channel and refresh its parameter cache.
    #[instrument(skip(self), err)]
    pub async fn read_attribute(&self, channel: &str, path: AttributePath) -> Result<AttributeValue> {
        let value = self.client.read(channel, path).await?;
        if let Some(handle) = self.handles.get(&(channel.to_string(), path)) {
            handle.cache(value);
        }
        Ok(value)
    }

    /// Write any writable attribute of a channel.
    ///
    /// The value is validated against the parameter's range first; nothing
    /// is sent if it is out of bounds.
    #[instrument(skip(self), err)]
    pub async fn write_attribute(&self, channel: &str, path: AttributePath, value: WriteValue) -> Result<()> {
        let handle = self.handles.get(&(channel.to_string(), path));
        if let Some(handle) = handle {
            handle.validate(&value)?;
        }
        self.client.write(channel, path, value).await?;
        if let Some(handle) = handle {
            handle.cache_written(value);
        }
        Ok(())
    }

    async fn read_number(&self, channel: &str, path: AttributePath) -> Result<f64> {
        let value = self.read_attribute(channel, path).await?;
        value
            .as_number()
            .ok_or_else(|| anyhow!("{} on '{}' is not numeric: {}", path, channel, value))
    }

    async fn read_flag(&self, channel: &str, path: AttributePath) -> Result<bool> {
        let value = self.read_attribute(channel, path).await?;
        value
            .as_flag()
            .ok_or_else(|| anyhow!("{} on '{}' is not a flag: {}", path, channel, value))
    }

    /// Sensor temperature in K.
    pub async fn temperature(&self, channel: &str) -> Result<f64> {
        self.read_number(channel, AttributePath::Temperature).await
    }

    /// Loop set-point in K.
    pub async fn temperature_setpoint(&self, channel: &str) -> Result<f64> {
        self.read_number(channel, AttributePath::TemperatureSetpoint).await
    }

    /// Set the loop set-point, 0-300 K.
    pub async fn set_temperature_setpoint(&self, channel: &str, kelvin: f64) -> Result<()> {
        self.write_attribute(channel, AttributePath::TemperatureSetpoint, kelvin.into())
            .await
    }

    /// Ramp rate in K/min.
    pub async fn ramp_rate(&self, channel: &str) -> Result<f64> {
        self.read_number(channel, AttributePath::RampRate).await
    }

    /// Set the ramp rate, 0-10 K/min.
    pub async fn set_ramp_rate(&self, channel: &str, kelvin_per_min: f64) -> Result<()> {
        self.write_attribute(channel, AttributePath::RampRate, kelvin_per_min.into())
            .await
    }

    /// Whether the set-point ramps.
    pub async fn ramp_enabled(&self, channel: &str) -> Result<bool> {
        self.read_flag(channel, AttributePath::RampEnable).await
    }

    /// Enable or disable ramping.
    pub async fn set_ramp_enabled(&self, channel: &str, enabled: bool) -> Result<()> {
        self.write_attribute(channel, AttributePath::RampEnable, enabled.into())
            .await
    }

    /// Whether PID control is on (off means manual heater output).
    pub async fn pid_enabled(&self, channel: &str) -> Result<bool> {
        self.read_flag(channel, AttributePath::LoopEnable).await
    }

    /// Switch between PID and manual heater control.
    pub async fn set_pid_enabled(&self, channel: &str, enabled: bool) -> Result<()> {
        self.write_attribute(channel, AttributePath::LoopEnable, enabled.into())
            .await
    }

    /// Heater output in percent.
    pub async fn heater_output(&self, channel: &str) -> Result<f64> {
        self.read_number(channel, AttributePath::HeaterOutput).await
    }

    /// Set the heater output, 0-100 %.
    pub async fn set_heater_output(&self, channel: &str, percent: f64) -> Result<()> {
        self.write_attribute(channel, AttributePath::HeaterOutput, percent.into())
            .await
    }

    /// Whether automatic pressure control is on.
    pub async fn pressure_control_enabled(&self, channel: &str) -> Result<bool> {
        self.read_flag(channel, AttributePath::PressureControlEnable)
            .await
    }

    /// Enable or disable automatic pressure control.
    pub async fn set_pressure_control_enabled(&self, channel: &str, enabled: bool) -> Result<()> {
        self.write_attribute(channel, AttributePath::PressureControlEnable, enabled.into())
            .await
    }

    /// Needle-valve flow in percent.
    pub async fn flow(&self, channel: &str) -> Result<f64> {
        self.read_number(channel, AttributePath::FlowSetpoint).await
    }

    /// Set the needle-valve flow, 0-100 %.
    pub async fn set_flow(&self, channel: &str, percent: f64) -> Result<()> {
        self.write_attribute(channel, AttributePath::FlowSetpoint, percent.into())
            .await
    }

    /// Sensor pressure in mbar.
    pub async fn pressure(&self, channel: &str) -> Result<f64> {
        self.read_number(channel, AttributePath::Pressure).await
    }

    /// Pressure set-point in mbar.
    pub async fn pressure_setpoint(&self, channel: &str) -> Result<f64> {
        self.read_number(channel, AttributePath::PressureSetpoint)
            .await
    }

    /// Set the pressure set-point, `pressure_setpoint_min`-50 mbar.
    pub async fn set_pressure_setpoint(&self, channel: &str, mbar: f64) -> Result<()> {
        self.write_attribute(channel, AttributePath::PressureSetpoint, mbar.into())
            .await
    }
}

impl Parameterized for MercuryItcDriver {
    fn parameters(&self) -> &ParameterSet {
        &self.params
    }
}

#[async_trait]
impl Readable for MercuryItcDriver {
    #[instrument(skip(self), err)]
    async fn read(&self) -> Result<f64> {
        let channel = self
            .primary
            .as_deref()
            .ok_or_else(|| anyhow!("Mercury iTC has no temperature channel configured"))?;
        self.temperature(channel).await
    }

    fn units(&self) -> Option<&str> {
        Some("K")
    }
}
