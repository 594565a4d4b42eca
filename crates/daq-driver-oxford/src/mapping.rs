//! One-to-one lookup tables: channel name ↔ hardware UID and flag ↔ token.
//!
//! Both tables are built once at start-up and only read afterwards, so they
//! are shared through `Arc` (or a `static`) without locking.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Token the controller uses for an enabled flag.
pub const STATUS_ON: &str = "ON";
/// Token the controller uses for a disabled flag.
pub const STATUS_OFF: &str = "OFF";

/// A bijective map with forward and inverse lookup.
#[derive(Debug, Clone)]
pub struct BiMap<L, R> {
    table: &'static str,
    forward: BTreeMap<L, R>,
    inverse: BTreeMap<R, L>,
}

impl<L, R> BiMap<L, R>
where
    L: Ord + Clone + Display,
    R: Ord + Clone + Display,
{
    /// Build from pairs. Fails on the first repeated name or value.
    pub fn new(
        table: &'static str,
        pairs: impl IntoIterator<Item = (L, R)>,
    ) -> Result<Self, ProtocolError> {
        let mut forward = BTreeMap::new();
        let mut inverse = BTreeMap::new();

        for (left, right) in pairs {
            if forward.contains_key(&left) {
                return Err(ProtocolError::DuplicateMapping {
                    table,
                    side: "name",
                    value: left.to_string(),
                });
            }
            if inverse.contains_key(&right) {
                return Err(ProtocolError::DuplicateMapping {
                    table,
                    side: "value",
                    value: right.to_string(),
                });
            }
            forward.insert(left.clone(), right.clone());
            inverse.insert(right, left);
        }

        Ok(Self {
            table,
            forward,
            inverse,
        })
    }

    /// Name of the table, used in error messages.
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Left → right.
    pub fn forward<Q>(&self, left: &Q) -> Option<&R>
    where
        L: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.forward.get(left)
    }

    /// Right → left.
    pub fn inverse<Q>(&self, right: &Q) -> Option<&L>
    where
        R: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.inverse.get(right)
    }

    /// True if `left` is a key.
    pub fn contains_left<Q>(&self, left: &Q) -> bool
    where
        L: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.forward.contains_key(left)
    }

    /// True if `right` is a value.
    pub fn contains_right<Q>(&self, right: &Q) -> bool
    where
        R: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.inverse.contains_key(right)
    }

    /// Pairs in left-key order.
    pub fn iter(&self) -> impl Iterator<Item = (&L, &R)> {
        self.forward.iter()
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Which control loop a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Temperature sensor with its heater loop (`TEMP:*`).
    Temperature,
    /// Pressure sensor with its needle-valve loop (`PRES:*`).
    Pressure,
    /// Heater, gas-flow or other board kept only for reverse lookup.
    Auxiliary,
}

impl ChannelKind {
    /// Lower-case label, as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Pressure => "pressure",
            Self::Auxiliary => "auxiliary",
        }
    }
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Board layout of a Teslatron VTI: `(name, uid, kind)`.
pub const DEFAULT_CHANNELS: &[(&str, &str, ChannelKind)] = &[
    ("VTI", "MB1.T1", ChannelKind::Temperature),
    ("VTI_heater", "MB0", ChannelKind::Auxiliary),
    ("probe", "DB8.T1", ChannelKind::Temperature),
    ("probe_heater", "DB3", ChannelKind::Auxiliary),
    ("gasflow", "DB4", ChannelKind::Auxiliary),
    ("pressure", "DB5.P1", ChannelKind::Pressure),
];

/// Channel name ↔ hardware UID, plus the loop kind of each channel.
#[derive(Debug, Clone)]
pub struct ChannelMap {
    uids: BiMap<String, String>,
    kinds: BTreeMap<String, ChannelKind>,
}

impl ChannelMap {
    /// Build from `(name, uid, kind)` entries. Duplicate names or UIDs are a
    /// configuration error.
    pub fn new<N, U>(entries: impl IntoIterator<Item = (N, U, ChannelKind)>) -> Result<Self, ProtocolError>
    where
        N: Into<String>,
        U: Into<String>,
    {
        let mut pairs = Vec::new();
        let mut kinds = BTreeMap::new();
        for (name, uid, kind) in entries {
            let name = name.into();
            kinds.insert(name.clone(), kind);
            pairs.push((name, uid.into()));
        }
        let uids = BiMap::new("channel", pairs)?;
        Ok(Self { uids, kinds })
    }

    /// The Teslatron VTI board layout.
    pub fn teslatron() -> Result<Self, ProtocolError> {
        Self::new(DEFAULT_CHANNELS.iter().copied())
    }

    /// Hardware UID of a channel.
    pub fn uid(&self, name: &str) -> Result<&str, ProtocolError> {
        self.uids
            .forward(name)
            .map(String::as_str)
            .ok_or_else(|| ProtocolError::UnmappedChannel(name.to_string()))
    }

    /// Channel name of a hardware UID.
    pub fn name(&self, uid: &str) -> Result<&str, ProtocolError> {
        self.uids
            .inverse(uid)
            .map(String::as_str)
            .ok_or_else(|| ProtocolError::UnmappedUid(uid.to_string()))
    }

    /// Loop kind of a channel.
    pub fn kind(&self, name: &str) -> Result<ChannelKind, ProtocolError> {
        self.kinds
            .get(name)
            .copied()
            .ok_or_else(|| ProtocolError::UnmappedChannel(name.to_string()))
    }

    /// Names of all channels of `kind`, sorted.
    pub fn channels_of(&self, kind: ChannelKind) -> impl Iterator<Item = &str> {
        self.kinds
            .iter()
            .filter(move |(_, k)| **k == kind)
            .map(|(name, _)| name.as_str())
    }

    /// `(name, uid, kind)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, ChannelKind)> {
        self.uids.iter().map(|(name, uid)| {
            let kind = self.kinds.get(name).copied().unwrap_or(ChannelKind::Auxiliary);
            (name.as_str(), uid.as_str(), kind)
        })
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.uids.len()
    }

    /// True when no channel is configured.
    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }
}

/// The fixed `true ↔ "ON"`, `false ↔ "OFF"` table.
#[derive(Debug, Clone)]
pub struct StatusMap(BiMap<bool, &'static str>);

impl StatusMap {
    /// Shared instance.
    pub fn get() -> &'static StatusMap {
        static STATUS: OnceLock<StatusMap> = OnceLock::new();
        STATUS.get_or_init(|| {
            StatusMap(BiMap {
                table: "status",
                forward: BTreeMap::from([(true, STATUS_ON), (false, STATUS_OFF)]),
                inverse: BTreeMap::from([(STATUS_ON, true), (STATUS_OFF, false)]),
            })
        })
    }

    /// Token for a flag.
    pub fn encode(&self, flag: bool) -> Result<&'static str, ProtocolError> {
        self.0
            .forward(&flag)
            .copied()
            .ok_or(ProtocolError::UnmappedFlag(flag))
    }

    /// Flag for a token. Exact match: `on` or `ON ` are rejected.
    pub fn decode(&self, token: &str) -> Result<bool, ProtocolError> {
        self.0
            .inverse(token)
            .copied()
            .ok_or_else(|| ProtocolError::UnrecognizedToken(token.to_string()))
    }
}
