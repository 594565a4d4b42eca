//! Line-oriented transport: one command out, one reply line back.
//!
//! [`PortTransport`] holds the port lock for the whole write+read, so
//! concurrent parameter accesses on one connection never interleave. Before
//! each write it throws away anything the controller sent unasked, including
//! a reply that arrived after its own exchange timed out.
//!
//! [`OfflineTransport`] refuses every exchange; it lets the driver describe
//! its parameters without a controller attached.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use daq_core::port::{
    connect_tcp_async, discard_buffered, drain_stream, wrap_shared, DynPort, SharedPort,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

/// Default Mercury iTC Ethernet port.
pub const DEFAULT_TCP_PORT: u16 = 7020;

/// Default line terminator.
pub const DEFAULT_TERMINATOR: &str = "\n";

/// Default reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Silence that ends the pre-command drain.
pub const DRAIN_IDLE: Duration = Duration::from_millis(10);

/// Upper bound on the pre-command drain.
pub const DRAIN_MAX: Duration = Duration::from_millis(100);

const DEVICE_NAME: &str = "Mercury iTC";

/// Request/reply exchange with the controller.
#[async_trait]
pub trait LineTransport: Send + Sync {
    /// Send `command` followed by the terminator and return the next reply
    /// line with trailing whitespace removed.
    async fn query(&self, command: &str) -> Result<String>;
}

/// [`LineTransport`] over a serial port, TCP socket or in-memory duplex.
pub struct PortTransport {
    port: SharedPort,
    terminator: String,
    timeout: Duration,
}

impl PortTransport {
    /// Wrap an already-open port.
    pub fn new(port: DynPort) -> Self {
        Self::from_shared(wrap_shared(port))
    }

    /// Use a port shared with other code.
    pub fn from_shared(port: SharedPort) -> Self {
        Self {
            port,
            terminator: DEFAULT_TERMINATOR.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the line terminator. An empty terminator keeps the default.
    pub fn with_terminator(mut self, terminator: impl Into<String>) -> Self {
        let terminator = terminator.into();
        if !terminator.is_empty() {
            self.terminator = terminator;
        }
        self
    }

    /// Replace the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect over Ethernet. `timeout` bounds both the connect and each reply.
    pub async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream = connect_tcp_async(host, port, timeout, DEVICE_NAME).await?;
        Ok(Self::new(Box::new(stream)).with_timeout(timeout))
    }

    /// Open an RS-232 / USB serial port, 8N1.
    pub async fn open_serial(path: &str, baud_rate: u32) -> Result<Self> {
        let stream = daq_core::port::open_serial_async(path, baud_rate, DEVICE_NAME).await?;
        tracing::info!(port = path, baud_rate, "Serial port opened");
        Ok(Self::new(Box::new(stream)))
    }

    /// Current line terminator.
    pub fn terminator(&self) -> &str {
        &self.terminator
    }

    /// Current reply timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl LineTransport for PortTransport {
    async fn query(&self, command: &str) -> Result<String> {
        let mut port = self.port.lock().await;

        let stale = discard_buffered(&mut *port)
            + drain_stream(port.get_mut(), DRAIN_IDLE, DRAIN_MAX).await;
        if stale > 0 {
            log::debug!("Mercury iTC discarded {} stale bytes before '{}'", stale, command);
        }

        let line = format!("{}{}", command, self.terminator);
        port.get_mut()
            .write_all(line.as_bytes())
            .await
            .context("Mercury iTC write failed")?;
        port.get_mut()
            .flush()
            .await
            .context("Mercury iTC flush failed")?;

        let delimiter = self.terminator.as_bytes().last().copied().unwrap_or(b'\n');
        let mut buf = Vec::new();
        let n = tokio::time::timeout(self.timeout, port.read_until(delimiter, &mut buf))
            .await
            .with_context(|| format!("Mercury iTC read timeout after '{}'", command))??;
        if n == 0 {
            bail!("Mercury iTC closed the connection after '{}'", command);
        }

        let reply = String::from_utf8_lossy(&buf).into_owned();
        let reply = reply
            .strip_suffix(self.terminator.as_str())
            .unwrap_or(reply.as_str())
            .trim_end();
        Ok(reply.to_string())
    }
}

/// [`LineTransport`] with no controller behind it. Every query fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTransport;

#[async_trait]
impl LineTransport for OfflineTransport {
    async fn query(&self, command: &str) -> Result<String> {
        bail!("Mercury iTC not connected; cannot send '{}'", command)
    }
}
