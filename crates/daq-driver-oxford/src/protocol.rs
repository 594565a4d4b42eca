//! Mercury iTC command encoder and reply decoder.
//!
//! The controller speaks colon-delimited ASCII:
//!
//! ```text
//! READ:DEV:MB1.T1:TEMP:SIG:TEMP             ->  STAT:DEV:MB1.T1:TEMP:SIG:TEMP:4.213K
//! SET:DEV:MB1.T1:TEMP:LOOP:TSET:4.200       ->  STAT:SET:DEV:MB1.T1:TEMP:LOOP:TSET:4.200:VALID
//! ```
//!
//! The payload of a READ reply is field 6. Some payloads carry a unit suffix
//! (`K`, `K/m`, `mB`) and some do not; the number of characters to strip is
//! looked up per attribute in a [`SuffixTable`], never guessed from the text.
//!
//! Everything in this module is pure: no I/O, no shared mutable state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::Serialize;

use crate::error::ProtocolError;
use crate::mapping::{ChannelKind, StatusMap};

/// Index of the payload field in a reply.
pub const PAYLOAD_FIELD: usize = 6;

/// Final reply field of a SET the controller refused.
pub const REJECTED_ACK: &str = "INVALID";

/// The attribute paths this driver reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributePath {
    /// `TEMP:SIG:TEMP`, sensor temperature
    Temperature,
    /// `TEMP:LOOP:TSET`
    TemperatureSetpoint,
    /// `TEMP:LOOP:RSET`
    RampRate,
    /// `TEMP:LOOP:RENA`
    RampEnable,
    /// `TEMP:LOOP:ENAB`, PID on (true) or manual heater (false)
    LoopEnable,
    /// `TEMP:LOOP:HSET`
    HeaterOutput,
    /// `PRES:LOOP:ENAB`
    PressureControlEnable,
    /// `PRES:LOOP:FSET`
    FlowSetpoint,
    /// `PRES:SIG:PRES`, sensor pressure
    Pressure,
    /// `PRES:LOOP:PRST`
    PressureSetpoint,
}

/// Whether an attribute carries a number or an ON/OFF flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Floating-point payload.
    Numeric,
    /// `ON` / `OFF` payload.
    Flag,
}

impl ValueKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Flag => "flag",
        }
    }
}

impl AttributePath {
    /// Every path, in declaration order.
    pub const ALL: [AttributePath; 10] = [
        Self::Temperature,
        Self::TemperatureSetpoint,
        Self::RampRate,
        Self::RampEnable,
        Self::LoopEnable,
        Self::HeaterOutput,
        Self::PressureControlEnable,
        Self::FlowSetpoint,
        Self::Pressure,
        Self::PressureSetpoint,
    ];

    /// Protocol spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "TEMP:SIG:TEMP",
            Self::TemperatureSetpoint => "TEMP:LOOP:TSET",
            Self::RampRate => "TEMP:LOOP:RSET",
            Self::RampEnable => "TEMP:LOOP:RENA",
            Self::LoopEnable => "TEMP:LOOP:ENAB",
            Self::HeaterOutput => "TEMP:LOOP:HSET",
            Self::PressureControlEnable => "PRES:LOOP:ENAB",
            Self::FlowSetpoint => "PRES:LOOP:FSET",
            Self::Pressure => "PRES:SIG:PRES",
            Self::PressureSetpoint => "PRES:LOOP:PRST",
        }
    }

    /// Loop the attribute belongs to.
    pub fn loop_kind(&self) -> ChannelKind {
        match self {
            Self::Temperature
            | Self::TemperatureSetpoint
            | Self::RampRate
            | Self::RampEnable
            | Self::LoopEnable
            | Self::HeaterOutput => ChannelKind::Temperature,
            Self::PressureControlEnable
            | Self::FlowSetpoint
            | Self::Pressure
            | Self::PressureSetpoint => ChannelKind::Pressure,
        }
    }

    /// Number or flag.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::RampEnable | Self::LoopEnable | Self::PressureControlEnable => ValueKind::Flag,
            _ => ValueKind::Numeric,
        }
    }

    /// Fixed-point precision of written values; `None` for flags and
    /// read-only signals.
    pub fn precision(&self) -> Option<Precision> {
        match self {
            Self::TemperatureSetpoint | Self::RampRate => Some(Precision::Milli),
            Self::HeaterOutput | Self::FlowSetpoint | Self::PressureSetpoint => {
                Some(Precision::Centi)
            }
            _ => None,
        }
    }

    /// `SIG` paths are measurements and cannot be set.
    pub fn writable(&self) -> bool {
        !matches!(self, Self::Temperature | Self::Pressure)
    }
}

impl Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributePath {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|path| path.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownPath(s.to_string()))
    }
}

/// Decimal places the controller expects in a SET value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Three decimals: temperature set-points and ramp rates.
    Milli,
    /// Two decimals: heater and flow percentages, pressure set-points.
    Centi,
}

impl Precision {
    /// Number of fractional digits.
    pub fn decimals(&self) -> usize {
        match self {
            Self::Milli => 3,
            Self::Centi => 2,
        }
    }

    /// Fixed-point text, e.g. `4.0` → `"4.000"` at [`Precision::Milli`].
    pub fn format(&self, value: f64) -> String {
        format!("{:.*}", self.decimals(), value)
    }
}

/// How to turn a reply payload into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Parse the payload as is.
    NumericPlain,
    /// Drop this many trailing characters, then parse.
    NumericSuffixed(usize),
    /// Map `ON`/`OFF` through the status table.
    Flag,
}

/// Unit-suffix length per numeric attribute.
///
/// The defaults match what the controller has been seen to send. Entries not
/// checked against a real reply are reported by
/// [`unconfirmed`](SuffixTable::unconfirmed) until an operator overrides them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixTable {
    lengths: BTreeMap<AttributePath, usize>,
    confirmed: BTreeSet<AttributePath>,
}

impl Default for SuffixTable {
    fn default() -> Self {
        use AttributePath::*;

        let lengths = BTreeMap::from([
            (Temperature, 1),         // "4.213K"
            (TemperatureSetpoint, 1), // "4.200K"
            (RampRate, 3),            // "1.000K/m"
            (Pressure, 2),            // "5.02mB"
            (PressureSetpoint, 2),    // "5.00mB"
            (HeaterOutput, 0),
            (FlowSetpoint, 0),
        ]);
        let confirmed = BTreeSet::from([Temperature, TemperatureSetpoint, Pressure, PressureSetpoint]);

        Self { lengths, confirmed }
    }
}

impl SuffixTable {
    /// Defaults with operator overrides applied. Keys are protocol paths
    /// (`"TEMP:LOOP:RSET"`); flag paths have no suffix and are rejected.
    pub fn with_overrides(overrides: &BTreeMap<String, usize>) -> Result<Self, ProtocolError> {
        let mut table = Self::default();
        for (key, len) in overrides {
            let path: AttributePath = key.parse()?;
            if path.value_kind() != ValueKind::Numeric {
                return Err(ProtocolError::SuffixOnFlagPath(path.as_str()));
            }
            table.set(path, *len);
        }
        Ok(table)
    }

    /// Set one entry; it counts as confirmed from then on.
    pub fn set(&mut self, path: AttributePath, len: usize) {
        self.lengths.insert(path, len);
        self.confirmed.insert(path);
    }

    /// Suffix length of a numeric attribute; `None` for flags.
    pub fn suffix_len(&self, path: AttributePath) -> Option<usize> {
        self.lengths.get(&path).copied()
    }

    /// Decoder mode for an attribute.
    pub fn reply_kind(&self, path: AttributePath) -> ReplyKind {
        match (path.value_kind(), self.suffix_len(path)) {
            (ValueKind::Flag, _) => ReplyKind::Flag,
            (ValueKind::Numeric, Some(n)) if n > 0 => ReplyKind::NumericSuffixed(n),
            (ValueKind::Numeric, _) => ReplyKind::NumericPlain,
        }
    }

    /// Entries still at an unverified default.
    pub fn unconfirmed(&self) -> impl Iterator<Item = (AttributePath, usize)> + '_ {
        self.lengths
            .iter()
            .filter(|(path, _)| !self.confirmed.contains(path))
            .map(|(path, len)| (*path, *len))
    }
}

/// Value to write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteValue {
    /// Formatted at the attribute's [`Precision`].
    Number(f64),
    /// Sent as `ON` / `OFF`.
    Flag(bool),
}

impl From<f64> for WriteValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for WriteValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl Display for WriteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{}", v),
            Self::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// Decoded reply value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Numeric payload, unit stripped.
    Number(f64),
    /// Flag payload.
    Flag(bool),
}

impl AttributeValue {
    /// The number, if numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Flag(_) => None,
        }
    }

    /// The flag, if a flag.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            Self::Number(_) => None,
        }
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{}", v),
            Self::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// `READ:DEV:{uid}:{path}`
pub fn encode_read(uid: &str, path: AttributePath) -> String {
    format!("READ:DEV:{}:{}", uid, path)
}

/// `SET:DEV:{uid}:{path}:{value}`
///
/// Numbers use the attribute's fixed precision; flags go through the status
/// table. Writing a signal path, a flag to a numeric attribute (or the
/// reverse), or a non-finite number fails before anything is formatted.
pub fn encode_write(uid: &str, path: AttributePath, value: &WriteValue) -> Result<String, ProtocolError> {
    if !path.writable() {
        return Err(ProtocolError::ReadOnlyPath(path.as_str()));
    }

    let formatted = match (path.value_kind(), value) {
        (ValueKind::Numeric, WriteValue::Number(v)) => {
            if !v.is_finite() {
                return Err(ProtocolError::NonFiniteValue {
                    path: path.as_str(),
                    value: *v,
                });
            }
            let precision = path
                .precision()
                .ok_or(ProtocolError::ReadOnlyPath(path.as_str()))?;
            precision.format(*v)
        }
        (ValueKind::Flag, WriteValue::Flag(b)) => StatusMap::get().encode(*b)?.to_string(),
        (kind, _) => {
            return Err(ProtocolError::ValueKindMismatch {
                path: path.as_str(),
                expected: kind.as_str(),
            })
        }
    };

    Ok(format!("SET:DEV:{}:{}:{}", uid, path, formatted))
}

/// Field 6 of a reply, after trimming the line terminator.
pub fn payload(raw: &str) -> Result<&str, ProtocolError> {
    let reply = raw.trim_end();
    reply
        .split(':')
        .nth(PAYLOAD_FIELD)
        .ok_or_else(|| ProtocolError::MalformedReply {
            reply: reply.to_string(),
            fields: reply.split(':').count(),
        })
}

/// Decode a READ reply.
pub fn decode(raw: &str, kind: ReplyKind) -> Result<AttributeValue, ProtocolError> {
    let field = payload(raw)?;

    match kind {
        ReplyKind::NumericPlain => parse_number(field, raw).map(AttributeValue::Number),
        ReplyKind::NumericSuffixed(n) => {
            parse_number(strip_chars(field, n), raw).map(AttributeValue::Number)
        }
        ReplyKind::Flag => StatusMap::get().decode(field).map(AttributeValue::Flag),
    }
}

/// Hardware UID a reply names: the field after `DEV`.
pub fn echoed_uid(raw: &str) -> Option<&str> {
    let mut fields = raw.trim_end().split(':');
    fields.find(|field| *field == "DEV")?;
    fields.next()
}

/// Fail unless the reply echoes `DEV:{uid}:{path}:`, as both READ and SET
/// answers do.
pub fn check_echo(
    command: &str,
    uid: &str,
    path: AttributePath,
    raw: &str,
) -> Result<(), ProtocolError> {
    let reply = raw.trim_end();
    if reply.contains(&format!("DEV:{}:{}:", uid, path)) {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedReply {
            command: command.to_string(),
            reply: reply.to_string(),
        })
    }
}

/// Check the reply to a SET. Only an explicit `INVALID` is an error; the
/// controller's other answers are accepted as is.
pub fn check_write_ack(command: &str, raw: &str) -> Result<(), ProtocolError> {
    let reply = raw.trim_end();
    match reply.rsplit(':').next() {
        Some(REJECTED_ACK) => Err(ProtocolError::DeviceRejected {
            command: command.to_string(),
            reply: reply.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Drop the last `n` characters (not bytes). Shorter input leaves "".
fn strip_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return s;
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[..idx],
        None => "",
    }
}

fn parse_number(text: &str, raw: &str) -> Result<f64, ProtocolError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| ProtocolError::UnparseableNumber {
            payload: text.to_string(),
            reply: raw.trim_end().to_string(),
        })
}
