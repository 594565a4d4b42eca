//! Async port abstractions for line-oriented instruments.
//!
//! Instruments in this workspace speak ASCII command/response protocols over
//! either RS-232 or a raw TCP socket. Both end up as a boxed
//! `AsyncRead + AsyncWrite` stream behind a mutex, so drivers do not care
//! which one they were given and tests can substitute `tokio::io::duplex`.
//!
//! - [`PortIO`] / [`DynPort`] / [`SharedPort`]: the type-erased port types
//! - [`connect_tcp_async`]: open a TCP socket with a connect timeout
//! - [`open_serial_async`] (feature `serial`): open a serial port, 8N1
//! - [`discard_buffered`]: drop stale bytes already held by the `BufReader`
//! - [`drain_stream`]: read and drop bytes still pending on the stream itself

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Any async byte stream usable as an instrument port.
///
/// Covers `tokio_serial::SerialStream`, `tokio::net::TcpStream` and
/// `tokio::io::DuplexStream` in tests.
pub trait PortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> PortIO for T {}

/// Type-erased boxed port.
pub type DynPort = Box<dyn PortIO>;

/// Port shared between tasks, buffered for `read_line`/`read_until`.
///
/// Holding the lock for a whole write+read keeps exchanges from interleaving.
pub type SharedPort = Arc<Mutex<BufReader<DynPort>>>;

/// Wrap a boxed port into a [`SharedPort`].
pub fn wrap_shared(port: DynPort) -> SharedPort {
    Arc::new(Mutex::new(BufReader::new(port)))
}

/// Connect to `host:port` over TCP.
///
/// Nagle is disabled; instrument commands are short and latency-bound.
pub async fn connect_tcp_async(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    device_name: &str,
) -> Result<TcpStream> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
        .await
        .with_context(|| format!("{} connection timeout to {}:{}", device_name, host, port))?
        .with_context(|| format!("Failed to connect to {} at {}:{}", device_name, host, port))?;

    stream.set_nodelay(true)?;
    tracing::info!(device = device_name, %host, port, "TCP connection established");

    Ok(stream)
}

/// Open a serial port asynchronously using `spawn_blocking`.
///
/// Standard settings: 8N1, no flow control.
#[cfg(feature = "serial")]
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
    device_name: &str,
) -> Result<tokio_serial::SerialStream> {
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .with_context(|| {
                format!(
                    "Failed to open {} serial port: {}",
                    device_name_owned, port_path_owned
                )
            })
    })
    .await
    .context("spawn_blocking for serial port opening failed")?
}

/// Drop whatever the `BufReader` already holds and return the byte count.
///
/// Leftovers from an earlier timed-out exchange would otherwise be read as
/// the reply to the next command.
pub fn discard_buffered<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> usize {
    let len = reader.buffer().len();
    if len > 0 {
        reader.consume(len);
    }
    len
}

/// Read and drop whatever the stream delivers until it stays quiet for
/// `idle`, the peer hangs up, or `max_wait` has passed. Returns the byte
/// count.
///
/// Pass the stream under the `BufReader` (`guard.get_mut()`); bytes already
/// buffered are [`discard_buffered`]'s job. A reply that arrives after its
/// exchange timed out sits here until the next command is sent.
pub async fn drain_stream<R: AsyncRead + Unpin>(
    port: &mut R,
    idle: Duration,
    max_wait: Duration,
) -> usize {
    let mut discard = [0u8; 256];
    let deadline = tokio::time::Instant::now() + max_wait;
    let mut total_discarded = 0usize;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(idle.min(remaining), port.read(&mut discard)).await {
            Ok(Ok(0)) => break, // EOF
            Ok(Ok(n)) => total_discarded += n,
            Ok(Err(_)) => break, // I/O errors surface on the next write or read
            Err(_) => break,     // quiet for `idle`
        }
    }

    total_discarded
}
