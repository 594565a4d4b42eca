//! Driver Factory and Component Types
//!
//! Drivers implement [`DriverFactory`]; the application looks a factory up by
//! its `driver_type`, validates the device's TOML table, then builds it and
//! receives a [`DeviceComponents`] bag of capability trait objects.
//!
//! ```text
//! config.toml [instrument] ──► factory.validate(&table)
//!                          ──► factory.build(table).await ──► DeviceComponents
//! ```

use crate::capabilities::{Parameterized, Readable};
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Runtime capability flags for device introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Corresponds to [`crate::capabilities::Readable`]
    Readable,

    /// Corresponds to [`crate::capabilities::Parameterized`]
    Parameterized,
}

impl Capability {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Readable => "Readable",
            Self::Parameterized => "Parameterized",
        }
    }
}

/// Container for capability trait objects returned by drivers.
#[derive(Default)]
pub struct DeviceComponents {
    /// Readable implementation (primary scalar measurement)
    pub readable: Option<Arc<dyn Readable>>,

    /// Parameterized implementation (parameter registry)
    pub parameterized: Option<Arc<dyn Parameterized>>,

    /// Capability-specific metadata
    pub metadata: DeviceMetadata,
}

impl std::fmt::Debug for DeviceComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceComponents")
            .field("capabilities", &self.capabilities())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl DeviceComponents {
    /// Create a new empty DeviceComponents
    pub fn new() -> Self {
        Self::default()
    }

    /// Get list of capabilities this device supports
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.readable.is_some() {
            caps.push(Capability::Readable);
        }
        if self.parameterized.is_some() {
            caps.push(Capability::Parameterized);
        }
        caps
    }

    /// Set Readable implementation
    pub fn with_readable(mut self, r: Arc<dyn Readable>) -> Self {
        self.readable = Some(r);
        self
    }

    /// Set Parameterized implementation
    pub fn with_parameterized(mut self, p: Arc<dyn Parameterized>) -> Self {
        self.parameterized = Some(p);
        self
    }

    /// Set device metadata
    pub fn with_metadata(mut self, metadata: DeviceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Capability-specific metadata for a device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceMetadata {
    /// Human-readable device model
    pub model: Option<String>,

    /// For Readable devices: measurement units (e.g., "K")
    pub measurement_units: Option<String>,
}

/// Trait for driver factories that create device instances.
///
/// Factories are registered once and live for the program's lifetime; they
/// must not hold mutable state across builds.
pub trait DriverFactory: Send + Sync + 'static {
    /// Driver type name used in the config `type` field.
    fn driver_type(&self) -> &'static str;

    /// Human-readable name for documentation and error messages.
    fn name(&self) -> &'static str;

    /// List of capabilities this driver type provides.
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    /// Validate configuration without touching hardware.
    fn validate(&self, config: &toml::Value) -> Result<()>;

    /// Open the connection and build the driver.
    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>>;
}
