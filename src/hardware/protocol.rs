//! Monochromator firmware command grammar and transaction state machine.
//!
//! Every line is comma-separated ASCII terminated by a newline:
//!
//! | Command | Terminal responses |
//! |---|---|
//! | `ZERO,<AXIS>` | `ZERO,DONE`, `ZERO,TIMEOUT`, `ERROR,<reason>` |
//! | `MOVE,<AXIS>,<steps>,<True\|False>` | `MOVE,DONE`, `ERROR,<reason>` |
//! | `SHUTTER, OPEN` / `SHUTTER, CLOSE` | none; fire-and-forget |
//!
//! After power-up the firmware prints `Monochromator Control Initialized`
//! once; [`await_banner`] waits for it before any zero or move is issued.
//!
//! A transaction ([`transact`]) sends one command and reads lines until a
//! terminal response arrives or its deadline, measured from the send, elapses.
//! Lines that are not terminal for the command in flight are ignored and never
//! extend the deadline.

use super::serial::{CommandChannel, DEFAULT_POLL_INTERVAL};
use crate::error::{AppResult, ProtocolError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;

/// Line printed by the firmware once it is ready for commands.
pub const INIT_BANNER: &str = "Monochromator Control Initialized";

// =============================================================================
// Timings
// =============================================================================

/// Deadlines and delays used by one controller's protocol traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTimings {
    /// Deadline for a zero or move transaction.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
    /// Deadline for the power-up banner.
    #[serde(with = "humantime_serde")]
    pub init_timeout: Duration,
    /// Interval between port polls while waiting for a line.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Delay after a shutter command before continuing.
    #[serde(with = "humantime_serde")]
    pub shutter_settle: Duration,
    /// Delay between the banner and the first zero command.
    #[serde(with = "humantime_serde")]
    pub init_settle: Duration,
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(20),
            init_timeout: Duration::from_secs(100),
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutter_settle: Duration::from_millis(100),
            init_settle: Duration::from_millis(100),
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Direction of a relative move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Step count increases.
    Forward,
    /// Step count decreases (also used for zero-length moves).
    Backward,
}

impl Direction {
    /// Direction from `current` to `target`.
    pub fn between(current: i64, target: i64) -> Self {
        if target > current {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "True"),
            Direction::Backward => write!(f, "False"),
        }
    }
}

/// Shutter command argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterAction {
    /// `SHUTTER, OPEN`
    Open,
    /// `SHUTTER, CLOSE`
    Close,
}

/// A command line understood by the firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Drive an axis to its limit switch and call that step 0.
    Zero {
        /// Axis token (`WL`, `SLIT1`, ...).
        axis: String,
    },
    /// Relative move by `steps` in `direction`.
    Move {
        /// Axis token.
        axis: String,
        /// Magnitude of the move.
        steps: u64,
        /// Sign of the move.
        direction: Direction,
    },
    /// Open or close the shutter.
    Shutter(ShutterAction),
}

impl Command {
    /// Axis addressed by the command, empty for shutter commands.
    pub fn axis(&self) -> &str {
        match self {
            Command::Zero { axis } | Command::Move { axis, .. } => axis,
            Command::Shutter(_) => "",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Zero { axis } => write!(f, "ZERO,{axis}"),
            Command::Move {
                axis,
                steps,
                direction,
            } => write!(f, "MOVE,{axis},{steps},{direction}"),
            Command::Shutter(ShutterAction::Open) => write!(f, "SHUTTER, OPEN"),
            Command::Shutter(ShutterAction::Close) => write!(f, "SHUTTER, CLOSE"),
        }
    }
}

// =============================================================================
// Replies
// =============================================================================

/// A parsed response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `ZERO,DONE`
    ZeroDone,
    /// `ZERO,TIMEOUT`
    ZeroTimeout,
    /// `MOVE,DONE`
    MoveDone,
    /// `ERROR,<reason>`
    Error(String),
    /// Anything else (banner, debug chatter).
    Other(String),
}

impl Reply {
    /// Classify one trimmed, non-empty line.
    pub fn parse(line: &str) -> Self {
        let mut parts = line.splitn(2, ',').map(str::trim);
        let head = parts.next().unwrap_or_default();
        let rest = parts.next();

        match (head, rest) {
            ("ERROR", reason) => Reply::Error(reason.unwrap_or_default().to_string()),
            ("ZERO", Some(rest)) if first_field(rest) == "DONE" => Reply::ZeroDone,
            ("ZERO", Some(rest)) if first_field(rest) == "TIMEOUT" => Reply::ZeroTimeout,
            ("MOVE", Some(rest)) if first_field(rest) == "DONE" => Reply::MoveDone,
            _ => Reply::Other(line.to_string()),
        }
    }
}

fn first_field(rest: &str) -> &str {
    rest.split(',').next().map(str::trim).unwrap_or_default()
}

// =============================================================================
// Transactions
// =============================================================================

/// Send a zero or move command and wait for its terminal response.
///
/// `ERROR,<reason>` maps to [`ProtocolError::DeviceReported`], `ZERO,TIMEOUT`
/// (only while a zero is in flight) to [`ProtocolError::DeviceTimeout`], and an
/// expired deadline to [`ProtocolError::LocalTimeout`]. I/O failures on the
/// port surface as [`DaqError::Io`](crate::error::DaqError::Io).
#[instrument(skip(channel, command), fields(command = %command), err)]
pub async fn transact(
    channel: &mut CommandChannel,
    command: &Command,
    timeout: Duration,
) -> AppResult<()> {
    let wire = command.to_string();
    channel.send(&wire).await?;
    let deadline = Instant::now() + timeout;

    loop {
        let Some(line) = channel.read_line(deadline).await? else {
            return Err(ProtocolError::LocalTimeout {
                axis: command.axis().to_string(),
                command: wire,
                timeout,
            }
            .into());
        };

        match (command, Reply::parse(&line)) {
            (Command::Zero { .. }, Reply::ZeroDone) | (Command::Move { .. }, Reply::MoveDone) => {
                return Ok(());
            }
            (Command::Zero { axis }, Reply::ZeroTimeout) => {
                return Err(ProtocolError::DeviceTimeout { axis: axis.clone() }.into());
            }
            (_, Reply::Error(reason)) => {
                return Err(ProtocolError::DeviceReported {
                    axis: command.axis().to_string(),
                    reason,
                }
                .into());
            }
            _ => tracing::trace!(line = %line, "Ignoring non-terminal line"),
        }
    }
}

/// Send a command that has no acknowledgement, then wait `settle`.
pub async fn fire_and_forget(
    channel: &mut CommandChannel,
    command: &Command,
    settle: Duration,
) -> AppResult<()> {
    channel.send(&command.to_string()).await?;
    tokio::time::sleep(settle).await;
    Ok(())
}

/// Wait for the firmware's power-up banner. Lines before it are discarded.
#[instrument(skip(channel), err)]
pub async fn await_banner(channel: &mut CommandChannel, timeout: Duration) -> AppResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match channel.read_line(deadline).await? {
            Some(line) if line == INIT_BANNER => {
                tracing::info!("Monochromator firmware ready");
                return Ok(());
            }
            Some(line) => tracing::trace!(line = %line, "Discarding line before banner"),
            None => {
                return Err(ProtocolError::LocalTimeout {
                    axis: String::new(),
                    command: "<init handshake>".to_string(),
                    timeout,
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaqError;
    use crate::hardware::mock_serial;
    use figment::providers::Format;

    fn channel() -> (CommandChannel, mock_serial::MockDeviceHarness) {
        let (port, harness) = mock_serial::new();
        (
            CommandChannel::new(Box::new(port), Duration::from_millis(5)),
            harness,
        )
    }

    fn move_wl(steps: u64, direction: Direction) -> Command {
        Command::Move {
            axis: "WL".into(),
            steps,
            direction,
        }
    }

    #[test]
    fn command_wire_format() {
        assert_eq!(Command::Zero { axis: "SLIT2".into() }.to_string(), "ZERO,SLIT2");
        assert_eq!(
            move_wl(120, Direction::Forward).to_string(),
            "MOVE,WL,120,True"
        );
        assert_eq!(move_wl(0, Direction::Backward).to_string(), "MOVE,WL,0,False");
        assert_eq!(
            Command::Shutter(ShutterAction::Open).to_string(),
            "SHUTTER, OPEN"
        );
        assert_eq!(
            Command::Shutter(ShutterAction::Close).to_string(),
            "SHUTTER, CLOSE"
        );
    }

    #[test]
    fn direction_of_zero_length_move_is_backward() {
        assert_eq!(Direction::between(10, 10), Direction::Backward);
        assert_eq!(Direction::between(10, 11), Direction::Forward);
        assert_eq!(Direction::between(10, 3), Direction::Backward);
    }

    #[test]
    fn reply_classification() {
        assert_eq!(Reply::parse("ZERO,DONE"), Reply::ZeroDone);
        assert_eq!(Reply::parse("ZERO,TIMEOUT"), Reply::ZeroTimeout);
        assert_eq!(Reply::parse("MOVE,DONE"), Reply::MoveDone);
        assert_eq!(
            Reply::parse("ERROR,UNKNOWN_MOTOR"),
            Reply::Error("UNKNOWN_MOTOR".into())
        );
        assert_eq!(Reply::parse("ERROR"), Reply::Error(String::new()));
        assert_eq!(
            Reply::parse("MOVE,STARTED"),
            Reply::Other("MOVE,STARTED".into())
        );
        assert_eq!(Reply::parse(INIT_BANNER), Reply::Other(INIT_BANNER.into()));
    }

    #[tokio::test]
    async fn move_ignores_chatter_until_done() {
        let (mut channel, mut harness) = channel();
        let device = tokio::spawn(async move {
            harness.expect_line("MOVE,WL,5,True").await;
            harness.send_line("ZERO,DONE");
            harness.send_line("debug: stepping");
            harness.send_line("MOVE,DONE");
            harness
        });

        transact(
            &mut channel,
            &move_wl(5, Direction::Forward),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        device.await.unwrap();
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn unrecognized_lines_are_logged() {
        let (mut channel, mut harness) = channel();
        let device = tokio::spawn(async move {
            harness.expect_line("ZERO,WL").await;
            harness.send_line("LIMIT,HIT");
            harness.send_line("ZERO,DONE");
            harness
        });

        transact(
            &mut channel,
            &Command::Zero { axis: "WL".into() },
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        device.await.unwrap();
        assert!(logs_contain("Ignoring non-terminal line"));
        assert!(logs_contain("LIMIT,HIT"));
    }

    #[tokio::test]
    async fn zero_timeout_is_distinct_from_local_timeout() {
        let (mut channel, mut harness) = channel();
        let device = tokio::spawn(async move {
            harness.expect_and_respond("ZERO,WL", "ZERO,TIMEOUT").await;
            harness
        });

        let err = transact(
            &mut channel,
            &Command::Zero { axis: "WL".into() },
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            DaqError::Protocol(ProtocolError::DeviceTimeout { ref axis }) if axis == "WL"
        ));
        device.await.unwrap();
    }

    #[tokio::test]
    async fn chatter_does_not_extend_deadline() {
        let (mut channel, harness) = channel();
        let chatter = tokio::spawn(async move {
            for _ in 0..40 {
                harness.send_line("still busy");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            harness
        });

        let started = Instant::now();
        let err = transact(
            &mut channel,
            &move_wl(1, Direction::Forward),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(matches!(
            err,
            DaqError::Protocol(ProtocolError::LocalTimeout { .. })
        ));
        drop(chatter.await.unwrap());
    }

    #[tokio::test]
    async fn banner_wait_discards_boot_noise() {
        let (mut channel, harness) = channel();
        harness.send_line("booting");
        harness.send_line("");
        harness.send_line(INIT_BANNER);
        harness.send_line("ZERO,DONE");

        await_banner(&mut channel, Duration::from_secs(1))
            .await
            .unwrap();
        // The line after the banner is still available to the next reader.
        let next = channel
            .read_line(Instant::now() + Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(next.as_deref(), Some("ZERO,DONE"));
    }

    #[tokio::test]
    async fn banner_wait_times_out_on_noise_only() {
        let (mut channel, harness) = channel();
        harness.send_line("booting");
        harness.send_line("calibrating");

        let started = Instant::now();
        let err = await_banner(&mut channel, Duration::from_millis(150))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(
            err,
            DaqError::Protocol(ProtocolError::LocalTimeout { ref command, timeout, .. })
                if command == "<init handshake>" && timeout == Duration::from_millis(150)
        ));
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
        drop(harness);
    }

    #[test]
    fn timings_deserialize_humantime() {
        let timings: ProtocolTimings = figment::Figment::new()
            .merge(figment::providers::Serialized::defaults(
                ProtocolTimings::default(),
            ))
            .merge(figment::providers::Toml::string(
                "command_timeout = \"250ms\"\npoll_interval = \"2ms\"",
            ))
            .extract()
            .unwrap();
        assert_eq!(timings.command_timeout, Duration::from_millis(250));
        assert_eq!(timings.poll_interval, Duration::from_millis(2));
        assert_eq!(timings.init_timeout, Duration::from_secs(100));
    }
}
