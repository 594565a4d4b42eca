//! Custom error types for drivers and the application.
//!
//! `DaqError` is the error returned across the parameter layer: validation,
//! read-only enforcement and hardware callbacks all report through it. Driver
//! internals are free to use `anyhow` with context and convert at the
//! callback boundary with `DaqError::Instrument(e.to_string())`.
//!
//! ## Error Categories
//!
//! - **`Configuration`**: semantic errors in a configuration that parsed fine
//!   (duplicate channel addresses, unknown primary channel, ...). Permanent.
//! - **`Io`**: wraps `std::io::Error` from ports and files.
//! - **`Instrument`**: anything the instrument or its protocol reported.
//! - **`Parameter*`**: misuse of a [`Parameter`](crate::parameter::Parameter).

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for drivers built on `daq-core`.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration parsed but failed semantic validation.
    ///
    /// **Recovery Strategy**: abort start-up and report; the operator has to
    /// fix the configuration table.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by an instrument driver or its wire protocol.
    ///
    /// Covers malformed replies, unparseable payloads and rejected commands.
    /// None of these are retried by the driver.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// A value failed the parameter's validator (range, finiteness, ...).
    #[error("Parameter '{name}' rejected value: {reason}")]
    ParameterValidation {
        /// Parameter name.
        name: String,
        /// Validator message.
        reason: String,
    },

    /// Attempted to write a read-only parameter.
    #[error("Parameter '{0}' is read-only")]
    ParameterReadOnly(String),

    /// `read_from_hardware` was called on a parameter without a reader.
    #[error("Parameter '{0}' has no hardware reader connected")]
    ParameterNoHardwareReader(String),

    /// Named parameter does not exist in a [`ParameterSet`](crate::observable::ParameterSet).
    #[error("Unknown parameter '{0}'")]
    ParameterNotFound(String),
}
