//! Hooks for watching controller traffic.
//!
//! The driver reports every exchange to an [`ExchangeObserver`] instead of
//! writing to a global logger. [`TracingObserver`] is the default.

use crate::protocol::{AttributePath, AttributeValue, WriteValue};

/// Receives raw traffic and decoded results. All methods default to no-ops.
pub trait ExchangeObserver: Send + Sync {
    /// A command is about to be sent to `channel`.
    fn on_command(&self, _channel: &str, _command: &str) {}

    /// The raw reply to the last command on `channel`.
    fn on_reply(&self, _channel: &str, _reply: &str) {}

    /// A READ decoded successfully.
    fn on_value(&self, _channel: &str, _path: AttributePath, _value: &AttributeValue) {}

    /// A SET completed and was not rejected.
    fn on_written(&self, _channel: &str, _path: AttributePath, _value: &WriteValue) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ExchangeObserver for NullObserver {}

/// Emits `tracing` events: raw traffic at DEBUG, values and writes at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ExchangeObserver for TracingObserver {
    fn on_command(&self, channel: &str, command: &str) {
        tracing::debug!(channel, command, "Sending");
    }

    fn on_reply(&self, channel: &str, reply: &str) {
        tracing::debug!(channel, reply, "Received");
    }

    fn on_value(&self, channel: &str, path: AttributePath, value: &AttributeValue) {
        tracing::info!(channel, attribute = %path, %value, "Read");
    }

    fn on_written(&self, channel: &str, path: AttributePath, value: &WriteValue) {
        tracing::info!(channel, attribute = %path, %value, "Set");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_tracing_observer_fields() {
        let observer = TracingObserver;
        observer.on_command("VTI", "READ:DEV:MB1.T1:TEMP:SIG:TEMP");
        observer.on_reply("VTI", "STAT:DEV:MB1.T1:TEMP:SIG:TEMP:4.213K");
        observer.on_value("VTI", AttributePath::Temperature, &AttributeValue::Number(4.213));
        observer.on_written("probe", AttributePath::RampEnable, &WriteValue::Flag(true));

        assert!(logs_contain("READ:DEV:MB1.T1:TEMP:SIG:TEMP"));
        assert!(logs_contain("attribute=TEMP:SIG:TEMP"));
        assert!(logs_contain("value=4.213"));
        assert!(logs_contain("channel=\"probe\""));
    }

    #[test]
    fn test_null_observer_is_silent() {
        let observer: &dyn ExchangeObserver = &NullObserver;
        observer.on_command("VTI", "READ:DEV:MB1.T1:TEMP:SIG:TEMP");
        observer.on_value("VTI", AttributePath::Temperature, &AttributeValue::Number(4.2));
    }
}
