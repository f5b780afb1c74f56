//! Scan execution: protocols, the scan engine, and the acquisition seam.

pub mod detector;
pub mod runner;
pub mod scan;

pub use detector::{PlaceholderDetector, SignalSource};
pub use runner::run_plan;
pub use scan::{ScanEngine, ScanKind, ScanPoint, ScanResult, ScanSpec, ScanState, ScanType};
