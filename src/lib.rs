//! # Mercury iTC operator tool
//!
//! Library half of the `mercury-itc` binary. The protocol and driver live in
//! `daq-driver-oxford`; this crate adds what an operator-facing program
//! needs around them:
//!
//! - **`config`**: figment-based loading of the application and instrument
//!   settings from TOML plus `MERCURY_ITC_*` environment variables
//! - **`logging`**: tracing subscriber setup (console format, optional log file)
//! - **`commands`**: the list/get/set/snapshot operations the CLI runs
//!   against a device's parameter registry

pub mod commands;
pub mod config;
pub mod logging;
