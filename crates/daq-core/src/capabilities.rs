//! Atomic Hardware Capabilities
//!
//! Devices implement the small capability traits they actually support
//! instead of one monolithic instrument trait. A temperature controller is
//! `Readable` (its primary sensor) and `Parameterized` (its set-points and
//! loop flags).
//!
//! Each capability trait:
//! - Is async (uses `#[async_trait]`) where it touches hardware
//! - Is thread-safe (requires `Send + Sync`)
//! - Uses `anyhow::Result` for errors

use anyhow::Result;
use async_trait::async_trait;

use crate::observable::ParameterSet;

/// Capability: Scalar Readout
///
/// Devices that return a single primary measurement (a temperature sensor,
/// a power meter).
#[async_trait]
pub trait Readable: Send + Sync {
    /// Read the current value.
    ///
    /// One hardware exchange per call; no caching.
    async fn read(&self) -> Result<f64>;

    /// Units of [`read`](Readable::read), when known.
    fn units(&self) -> Option<&str> {
        None
    }
}

/// Capability: Parameter Registry
///
/// Devices that expose named, typed parameters for generic front ends.
///
/// ```rust,ignore
/// fn list_all_parameters<D: Parameterized>(device: &D) {
///     for (name, param) in device.parameters().iter() {
///         println!("{} [{:?}]", name, param.metadata().units);
///     }
/// }
/// ```
pub trait Parameterized: Send + Sync {
    /// The device's parameter registry
    fn parameters(&self) -> &ParameterSet;
}
