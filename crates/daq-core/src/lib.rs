//! `daq-core`
//!
//! Shared building blocks for instrument drivers in this workspace.
//!
//! - [`error`]: the [`DaqError`](error::DaqError) type used at parameter and
//!   hardware-callback boundaries
//! - [`observable`] / [`parameter`]: typed, unit-tagged, range-validated
//!   parameters with hardware read/write callbacks
//! - [`capabilities`]: small async capability traits implemented by drivers
//! - [`driver`]: the [`DriverFactory`](driver::DriverFactory) plugin API
//! - [`port`]: async serial/TCP port helpers for line-oriented protocols

pub mod capabilities;
pub mod driver;
pub mod error;
pub mod observable;
pub mod parameter;
pub mod port;

// Re-export commonly used types
pub use anyhow::{anyhow, Result};
pub use error::{AppResult, DaqError};
