//! Line-oriented command channel over an async serial port.
//!
//! The monochromator firmware speaks newline-terminated ASCII. [`CommandChannel`]
//! is the only type in the crate that touches the physical connection: it writes
//! command lines and reads response lines under a caller-supplied deadline,
//! polling at a short fixed interval. Everything above it is framing-agnostic.
//!
//! # Types
//!
//! - [`SerialPortIO`]: trait alias combining AsyncRead + AsyncWrite for serial ports
//! - [`DynSerial`]: type-erased boxed serial port
//! - [`SharedChannel`]: one controller's channel, shared by its axis, slit bank and shutter
//!
//! # Example
//!
//! ```rust,ignore
//! use fluoro_daq::hardware::serial::CommandChannel;
//! use tokio::time::{Duration, Instant};
//!
//! let mut channel = CommandChannel::open("/dev/ttyACM0", 9600, Duration::from_millis(10)).await?;
//! channel.send("ZERO,WL").await?;
//! let reply = channel.read_line(Instant::now() + Duration::from_secs(20)).await?;
//! ```

use crate::error::{AppResult, DaqError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default interval between polls of the port while waiting for a line.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// =============================================================================
// Serial Port Trait
// =============================================================================

/// Trait alias for async serial port I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be used
/// as a serial port. This includes:
/// - `tokio_serial::SerialStream` (real hardware)
/// - `tokio::io::DuplexStream` (testing)
/// - [`MockSerialPort`](super::mock_serial::MockSerialPort)
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// A controller's command channel, shared between the controller (shutter
/// commands), its grating axis and its slit bank.
///
/// Holding the lock for a whole transaction keeps command/response pairs from
/// interleaving on the wire.
pub type SharedChannel = Arc<Mutex<CommandChannel>>;

// =============================================================================
// CommandChannel
// =============================================================================

/// Newline-framed ASCII channel with deadline-bounded line reads.
pub struct CommandChannel {
    port: BufReader<DynSerial>,
    /// Bytes of a line received so far. Survives poll timeouts.
    pending: Vec<u8>,
    poll_interval: Duration,
}

impl CommandChannel {
    /// Wrap an already-open port.
    pub fn new(port: DynSerial, poll_interval: Duration) -> Self {
        Self {
            port: BufReader::new(port),
            pending: Vec::new(),
            poll_interval,
        }
    }

    /// Open a real serial port (8N1, no flow control).
    #[cfg(feature = "instrument_serial")]
    pub async fn open(port_path: &str, baud_rate: u32, poll_interval: Duration) -> AppResult<Self> {
        let port = open_serial_async(port_path, baud_rate).await?;
        tracing::info!(port = port_path, baud_rate, "Opened serial port");
        Ok(Self::new(Box::new(port), poll_interval))
    }

    /// Open a real serial port (8N1, no flow control).
    #[cfg(not(feature = "instrument_serial"))]
    pub async fn open(
        _port_path: &str,
        _baud_rate: u32,
        _poll_interval: Duration,
    ) -> AppResult<Self> {
        Err(DaqError::FeatureNotEnabled("instrument_serial".to_string()))
    }

    /// Move the channel behind a shared async mutex.
    pub fn into_shared(self) -> SharedChannel {
        Arc::new(Mutex::new(self))
    }

    /// Interval between polls while waiting for a line.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Write one command line. The terminating newline is appended here.
    pub async fn send(&mut self, line: &str) -> AppResult<()> {
        tracing::debug!(command = line, "Sending");
        let writer = self.port.get_mut();
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read the next non-empty line, or `None` once `deadline` passes.
    ///
    /// Blank lines are skipped and do not move the deadline. The port is polled
    /// every `poll_interval`; a line split across polls is reassembled.
    pub async fn read_line(&mut self, deadline: Instant) -> AppResult<Option<String>> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait = self.poll_interval.min(deadline - now);

            match tokio::time::timeout(wait, self.port.read_until(b'\n', &mut self.pending)).await
            {
                // Poll interval elapsed with no complete line.
                Err(_) => continue,
                Ok(Err(e)) => return Err(DaqError::Io(e)),
                Ok(Ok(0)) => {
                    // End of stream: flush a trailing unterminated line, otherwise
                    // keep waiting for the deadline like a silent device.
                    if let Some(line) = self.take_line() {
                        return Ok(Some(line));
                    }
                    tokio::time::sleep(wait).await;
                }
                Ok(Ok(_)) => {
                    if !self.pending.ends_with(b"\n") {
                        continue;
                    }
                    if let Some(line) = self.take_line() {
                        tracing::debug!(line = %line, "Received");
                        return Ok(Some(line));
                    }
                }
            }
        }
    }

    /// Flush and shut down the write half of the port.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        let writer = self.port.get_mut();
        writer.flush().await?;
        writer.shutdown().await?;
        Ok(())
    }

    fn take_line(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

// =============================================================================
// Serial Port Utilities
// =============================================================================

/// Open a serial port asynchronously using spawn_blocking.
///
/// Standard settings are applied: 8N1, no flow control.
#[cfg(feature = "instrument_serial")]
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
) -> AppResult<tokio_serial::SerialStream> {
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                DaqError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Failed to open serial port {port_path_owned}: {e}"),
                ))
            })
    })
    .await
    .map_err(|e| DaqError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_pair(poll: Duration) -> (tokio::io::DuplexStream, CommandChannel) {
        let (host, device) = tokio::io::duplex(256);
        (host, CommandChannel::new(Box::new(device), poll))
    }

    #[tokio::test]
    async fn send_appends_newline() {
        use tokio::io::AsyncReadExt;

        let (mut host, mut channel) = channel_pair(DEFAULT_POLL_INTERVAL);
        channel.send("ZERO,WL").await.unwrap();

        let mut buf = vec![0u8; 32];
        let n = host.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ZERO,WL\n");
    }

    #[tokio::test]
    async fn read_line_skips_blank_lines() {
        let (mut host, mut channel) = channel_pair(DEFAULT_POLL_INTERVAL);
        host.write_all(b"\n\r\n   \nMOVE,DONE\r\n").await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let line = channel.read_line(deadline).await.unwrap();
        assert_eq!(line.as_deref(), Some("MOVE,DONE"));
    }

    #[tokio::test]
    async fn read_line_reassembles_split_lines() {
        let (mut host, mut channel) = channel_pair(Duration::from_millis(5));

        let writer = tokio::spawn(async move {
            host.write_all(b"ZERO,").await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            host.write_all(b"DONE\n").await.unwrap();
            host
        });

        let deadline = Instant::now() + Duration::from_secs(1);
        let line = channel.read_line(deadline).await.unwrap();
        assert_eq!(line.as_deref(), Some("ZERO,DONE"));
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn read_line_times_out_on_silence() {
        let (_host, mut channel) = channel_pair(DEFAULT_POLL_INTERVAL);

        let started = Instant::now();
        let line = channel
            .read_line(started + Duration::from_millis(100))
            .await
            .unwrap();
        assert!(line.is_none());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(500));
    }
}
