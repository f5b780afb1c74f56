//! # Fluorescence Spectrometer Control Library
//!
//! This crate drives a two-monochromator fluorescence spectrometer: it moves
//! diffraction-grating motors to target wavelengths over a serial command
//! protocol, sets slit widths for resolution control, and runs wavelength scans
//! while accumulating measured and reference signal samples. The `fluoro-daq`
//! binary (`main.rs`) is a thin command-line frontend over it.
//!
//! ## Crate Structure
//!
//! - **`config`**: system and scan-plan configuration (YAML/TOML via `figment`),
//!   with semantic validation.
//! - **`data`**: persistence of scan results (CSV).
//! - **`error`**: the `DaqError` enum and the `ProtocolError` kinds.
//! - **`experiment`**: scan protocols, the single-use `ScanEngine`, the
//!   `SignalSource` acquisition seam, and plan execution.
//! - **`hardware`**: serial command channel, firmware protocol state machine,
//!   kinematic models, motor axes, slit banks, and the monochromator controller.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`measurement`**: wavelength, range, integration-time and trace value types.

pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod logging;
pub mod measurement;

pub use error::{AppResult, DaqError, ProtocolError};
