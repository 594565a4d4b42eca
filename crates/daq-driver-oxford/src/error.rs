//! Typed failures of the Mercury iTC codec and its lookup tables.
//!
//! Every variant is raised synchronously to the caller of the read or write
//! that hit it; nothing here is retried. The driver layer wraps these in
//! `anyhow::Error` with the command as context, so callers that care about
//! the exact failure use `err.downcast_ref::<ProtocolError>()`.

use thiserror::Error;

/// Errors produced while encoding commands, decoding replies or resolving
/// names through the bijective tables.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// A value appears twice on one side of a one-to-one table.
    #[error("duplicate {side} '{value}' in {table} table")]
    DuplicateMapping {
        /// Table being built ("channel", "status").
        table: &'static str,
        /// "name" or "value".
        side: &'static str,
        /// The repeated entry.
        value: String,
    },

    /// Reply has fewer than seven colon-delimited fields.
    #[error("malformed reply '{reply}': expected at least 7 fields, got {fields}")]
    MalformedReply {
        /// Reply as received, terminator trimmed.
        reply: String,
        /// Number of fields found.
        fields: usize,
    },

    /// Payload (after suffix strip) is not a floating-point number.
    #[error("cannot parse '{payload}' as a number (reply '{reply}')")]
    UnparseableNumber {
        /// The text handed to the float parser.
        payload: String,
        /// Full reply for context.
        reply: String,
    },

    /// Flag payload is neither `ON` nor `OFF`.
    #[error("unrecognized status token '{0}' (expected ON or OFF)")]
    UnrecognizedToken(String),

    /// Boolean missing from the status table. Unreachable with the fixed
    /// table, kept so the lookup stays total.
    #[error("no status token for {0}")]
    UnmappedFlag(bool),

    /// Channel name absent from the channel table.
    #[error("unmapped channel '{0}'")]
    UnmappedChannel(String),

    /// Hardware UID absent from the channel table.
    #[error("unmapped hardware UID '{0}'")]
    UnmappedUid(String),

    /// Text does not name one of the supported attribute paths.
    #[error("unknown attribute path '{0}'")]
    UnknownPath(String),

    /// Attribute belongs to a different loop than the channel.
    #[error("attribute {path} does not apply to {kind} channel '{channel}'")]
    ChannelKindMismatch {
        /// Channel name.
        channel: String,
        /// Channel kind as configured.
        kind: &'static str,
        /// Attribute requested.
        path: &'static str,
    },

    /// Attempted to write a signal (read-only) attribute.
    #[error("attribute {0} is read-only")]
    ReadOnlyPath(&'static str),

    /// Write value variant disagrees with the attribute's value kind.
    #[error("attribute {path} expects a {expected} value")]
    ValueKindMismatch {
        /// Attribute written.
        path: &'static str,
        /// "numeric" or "flag".
        expected: &'static str,
    },

    /// NaN or infinite numbers have no fixed-point wire form.
    #[error("cannot encode non-finite value {value} for {path}")]
    NonFiniteValue {
        /// Attribute written.
        path: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A unit-suffix override names a flag attribute, which has no unit.
    #[error("attribute {0} is a flag; suffix overrides apply to numeric attributes only")]
    SuffixOnFlagPath(&'static str),

    /// Reply does not echo the channel and attribute of the command sent,
    /// typically a late answer to an earlier exchange.
    #[error("reply '{reply}' does not answer '{command}'")]
    UnexpectedReply {
        /// Command sent.
        command: String,
        /// Reply received.
        reply: String,
    },

    /// The controller answered a SET with `INVALID`.
    #[error("device rejected '{command}': {reply}")]
    DeviceRejected {
        /// Command sent.
        command: String,
        /// Reply received.
        reply: String,
    },
}
