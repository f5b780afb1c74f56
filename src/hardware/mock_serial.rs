//! In-memory serial port for exercising the command channel without hardware.
//!
//! `MockSerialPort` implements `AsyncRead` and `AsyncWrite` and is handed to a
//! [`CommandChannel`](super::serial::CommandChannel) in place of a real port.
//! The paired `MockDeviceHarness` stays in the test and plays the firmware:
//! it sees every line the host writes and injects reply lines.
//!
//! # Architecture
//!
//! The mock uses a pair of unbounded channels to simulate bidirectional communication:
//! - `MockSerialPort` (given to application): implements AsyncRead/AsyncWrite
//! - `MockDeviceHarness` (kept in test): scripts device behavior
//!
//! For longer sequences (whole scans) the harness can be turned into a
//! background [`MockResponder`] that answers each command line through a
//! closure and records the full command log.
//!
//! # Example
//!
//! ```rust,ignore
//! use fluoro_daq::hardware::mock_serial;
//!
//! let (port, mut harness) = mock_serial::new();
//! let channel = CommandChannel::new(Box::new(port), DEFAULT_POLL_INTERVAL);
//!
//! harness.expect_line("ZERO,WL").await;
//! harness.send_line("ZERO,DONE");
//! ```

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

/// How long harness expectations wait for the host before giving up.
const EXPECT_TIMEOUT: Duration = Duration::from_secs(2);

/// The host-facing side of the mock serial port.
#[derive(Debug)]
pub struct MockSerialPort {
    /// Channel to send written data to the harness
    writes_tx: UnboundedSender<Vec<u8>>,
    /// Channel to receive data from the harness to be read
    reads_rx: UnboundedReceiver<Vec<u8>>,
    /// Buffer for data received from the harness but not yet read by the client
    read_buffer: VecDeque<u8>,
}

/// The test-facing side: observes host writes and plays device replies.
#[derive(Debug)]
pub struct MockDeviceHarness {
    /// Channel to receive data written by the client
    writes_rx: UnboundedReceiver<Vec<u8>>,
    /// Channel to send data to the client for it to read
    reads_tx: UnboundedSender<Vec<u8>>,
    /// Bytes written by the host but not yet consumed by an expectation
    write_buffer: Vec<u8>,
}

/// Creates a new connected pair of `MockSerialPort` and `MockDeviceHarness`
pub fn new() -> (MockSerialPort, MockDeviceHarness) {
    let (client_to_harness_tx, client_to_harness_rx) = mpsc::unbounded_channel();
    let (harness_to_client_tx, harness_to_client_rx) = mpsc::unbounded_channel();

    let port = MockSerialPort {
        writes_tx: client_to_harness_tx,
        reads_rx: harness_to_client_rx,
        read_buffer: VecDeque::new(),
    };

    let harness = MockDeviceHarness {
        writes_rx: client_to_harness_rx,
        reads_tx: harness_to_client_tx,
        write_buffer: Vec::new(),
    };

    (port, harness)
}

// =============================================================================
// MockSerialPort Implementations
// =============================================================================

impl MockSerialPort {
    fn fill(&mut self, buf: &mut ReadBuf<'_>) {
        let to_read = std::cmp::min(buf.remaining(), self.read_buffer.len());
        let chunk: Vec<u8> = self.read_buffer.drain(..to_read).collect();
        buf.put_slice(&chunk);
    }
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.read_buffer.is_empty() {
            self.fill(buf);
            return Poll::Ready(Ok(()));
        }

        match self.reads_rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => {
                self.read_buffer.extend(chunk);
                self.fill(buf);
                Poll::Ready(Ok(()))
            }
            // Harness dropped: end-of-file
            Poll::Ready(None) => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.writes_tx.send(buf.to_vec()) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock device harness disconnected",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

// =============================================================================
// MockDeviceHarness Implementations
// =============================================================================

impl MockDeviceHarness {
    /// Sends raw bytes to the host.
    ///
    /// # Errors
    /// Returns error if the host port has been dropped.
    pub fn send_response(&self, data: &[u8]) -> Result<(), &'static str> {
        self.reads_tx
            .send(data.to_vec())
            .map_err(|_| "Failed to send response: client port disconnected")
    }

    /// Sends one reply line, appending the newline terminator.
    ///
    /// A dropped host port is ignored; the test will notice through the host's result.
    pub fn send_line(&self, line: &str) {
        let _ = self.send_response(format!("{line}\n").as_bytes());
    }

    /// Waits for the next complete line written by the host.
    ///
    /// Returns `None` if nothing arrives within `wait` or the host port is dropped.
    pub async fn next_line(&mut self, wait: Duration) -> Option<String> {
        loop {
            if let Some(pos) = self.write_buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.write_buffer.drain(..=pos).collect();
                return Some(String::from_utf8_lossy(&raw).trim_end().to_string());
            }
            match timeout(wait, self.writes_rx.recv()).await {
                Ok(Some(chunk)) => self.write_buffer.extend_from_slice(&chunk),
                Ok(None) | Err(_) => return None,
            }
        }
    }

    /// Waits for the host to write exactly `expected` as its next line.
    ///
    /// # Panics
    /// Panics if no line arrives within two seconds or if the line differs.
    pub async fn expect_line(&mut self, expected: &str) {
        match self.next_line(EXPECT_TIMEOUT).await {
            Some(line) => assert_eq!(line, expected, "unexpected command line"),
            None => panic!("Timeout waiting for command line `{expected}`"),
        }
    }

    /// Expects a command line and answers it with a reply line.
    pub async fn expect_and_respond(&mut self, expected: &str, reply: &str) {
        self.expect_line(expected).await;
        self.send_line(reply);
    }

    /// Collects every line the host writes within `window`.
    pub async fn drain_lines(&mut self, window: Duration) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line(window).await {
            lines.push(line);
        }
        lines
    }

    /// True when the host has written nothing within `window`.
    pub async fn is_silent(&mut self, window: Duration) -> bool {
        if !self.write_buffer.is_empty() {
            return false;
        }
        match timeout(window, self.writes_rx.recv()).await {
            Ok(Some(chunk)) => {
                self.write_buffer.extend_from_slice(&chunk);
                false
            }
            Ok(None) | Err(_) => true,
        }
    }

    /// Moves the harness into a background task that answers every command
    /// line through `reply`. Each returned string is sent as one line.
    pub fn spawn_responder<F>(mut self, mut reply: F) -> MockResponder
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let log = Arc::new(Mutex::new(Vec::new()));
        let task_log = Arc::clone(&log);
        let handle = tokio::spawn(async move {
            while let Some(line) = self.next_line(Duration::from_secs(3600)).await {
                if let Ok(mut log) = task_log.lock() {
                    log.push(line.clone());
                }
                for answer in reply(&line) {
                    self.send_line(&answer);
                }
            }
        });
        MockResponder { log, handle }
    }
}

/// Scripted firmware that answers commands in the background.
#[derive(Debug)]
pub struct MockResponder {
    log: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl MockResponder {
    /// Every command line received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Stops answering.
    pub fn stop(self) {
        self.handle.abort();
    }
}

/// Default firmware behaviour: `ZERO,DONE` for zero commands, `MOVE,DONE` for
/// moves, silence for everything else.
pub fn well_behaved(line: &str) -> Vec<String> {
    if line.starts_with("ZERO,") {
        vec!["ZERO,DONE".to_string()]
    } else if line.starts_with("MOVE,") {
        vec!["MOVE,DONE".to_string()]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_command_response() {
        let (port, mut harness) = new();
        let mut port = BufReader::new(port);

        let app_task = tokio::spawn(async move {
            port.write_all(b"ZERO,WL\n").await.unwrap();
            let mut response = String::new();
            port.read_line(&mut response).await.unwrap();
            response
        });

        harness.expect_and_respond("ZERO,WL", "ZERO,DONE").await;

        assert_eq!(app_task.await.unwrap(), "ZERO,DONE\n");
    }

    #[tokio::test]
    async fn test_lines_split_across_writes() {
        let (mut port, mut harness) = new();

        port.write_all(b"MOVE,WL,").await.unwrap();
        port.write_all(b"10,True").await.unwrap();
        port.write_all(b"\nZERO,SLIT1\n").await.unwrap();

        let lines = harness.drain_lines(Duration::from_millis(50)).await;
        assert_eq!(lines, vec!["MOVE,WL,10,True", "ZERO,SLIT1"]);
    }

    #[tokio::test]
    async fn test_silence_detection() {
        let (mut port, mut harness) = new();
        assert!(harness.is_silent(Duration::from_millis(20)).await);

        port.write_all(b"SHUTTER, OPEN\n").await.unwrap();
        assert!(!harness.is_silent(Duration::from_millis(20)).await);
        harness.expect_line("SHUTTER, OPEN").await;
    }

    #[tokio::test]
    async fn test_responder_logs_commands() {
        let (port, harness) = new();
        let responder = harness.spawn_responder(well_behaved);
        let mut port = BufReader::new(port);

        port.write_all(b"MOVE,WL,5,False\n").await.unwrap();
        let mut response = String::new();
        port.read_line(&mut response).await.unwrap();

        assert_eq!(response, "MOVE,DONE\n");
        assert_eq!(responder.commands(), vec!["MOVE,WL,5,False"]);
        responder.stop();
    }
}
