//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it gives callers one place to discriminate
//! configuration mistakes from unreachable targets and from faults reported by
//! (or timing out on) the monochromator firmware.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: semantic problems caught before any hardware command is
//!   issued: role conflicts, invalid ranges, invalid integration times.
//! - **`Range`**: a computed target step lies outside an axis or slit bank's bounds.
//!   Always raised before the command is written.
//! - **`Protocol`**: a zero/move transaction failed. See [`ProtocolError`] for the
//!   three distinct failure modes.
//! - **`KinematicDomain`**: the sinusoidal-phase model cannot invert the requested
//!   wavelength.
//! - **`Config`**, **`Io`**, **`Storage`**, **`FeatureNotEnabled`**: ambient failures
//!   from configuration loading, the serial port, CSV persistence, or a disabled
//!   cargo feature.
//!
//! No layer retries automatically. Recovery policy belongs to the caller.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Failure of a single zero/move transaction on the command channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The device answered `ERROR,<reason>`.
    #[error("{axis}: device reported error: {reason}")]
    DeviceReported {
        /// Axis token the command was addressed to (`WL`, `SLIT2`, ...).
        axis: String,
        /// Reason text embedded in the error line.
        reason: String,
    },

    /// The device answered `ZERO,TIMEOUT`: its own limit-switch search gave up.
    #[error("{axis}: device reported zero-finding timeout")]
    DeviceTimeout {
        /// Axis token the command was addressed to.
        axis: String,
    },

    /// No terminal response arrived before the local deadline.
    #[error("{axis}: no terminal response to '{command}' within {timeout:?}")]
    LocalTimeout {
        /// Axis token the command was addressed to (empty for the init handshake).
        axis: String,
        /// Wire text of the command that was waiting.
        command: String,
        /// Deadline that elapsed, measured from the moment the command was sent.
        timeout: Duration,
    },
}

/// Primary error type for the spectrometer control stack.
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Step {step} for {target} is outside [{min}, {max}]")]
    Range {
        /// What was being positioned (axis token or slit bank).
        target: String,
        step: i64,
        min: i64,
        max: i64,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Wavelength {wavelength} nm is unreachable: asin argument {argument} outside [-1, 1]")]
    KinematicDomain { wavelength: f64, argument: f64 },

    #[error("Slit bank diverged: {moved} of {total} elements moved before a failure; zero the bank first")]
    SlitBankDiverged { moved: usize, total: usize },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

impl DaqError {
    /// True for faults raised by the device protocol (reported or timed out).
    pub fn is_protocol(&self) -> bool {
        matches!(self, DaqError::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaqError::Configuration("resolution must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration validation error: resolution must be positive"
        );
    }

    #[test]
    fn protocol_errors_keep_their_kind() {
        let err: DaqError = ProtocolError::DeviceReported {
            axis: "WL".into(),
            reason: "STUCK".into(),
        }
        .into();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("STUCK"));

        let local = ProtocolError::LocalTimeout {
            axis: "WL".into(),
            command: "MOVE,WL,10,True".into(),
            timeout: Duration::from_millis(200),
        };
        assert_ne!(local, ProtocolError::DeviceTimeout { axis: "WL".into() });
    }

    #[test]
    fn range_error_names_bounds() {
        let err = DaqError::Range {
            target: "WL".into(),
            step: 12_000,
            min: 0,
            max: 10_000,
        };
        assert_eq!(err.to_string(), "Step 12000 for WL is outside [0, 10000]");
    }
}
