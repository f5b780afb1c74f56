//! Measurement value types shared by the hardware and experiment layers.

pub mod trace;
pub mod wavelength;

pub use trace::SignalTrace;
pub use wavelength::{IntegrationTime, ScanRange, Wavelength};
