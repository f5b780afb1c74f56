//! Scan protocols and the single-use engine that executes them.
//!
//! Four protocols are supported:
//!
//! | Kind | Excitation | Emission |
//! |---|---|---|
//! | `Singular` | fixed | fixed |
//! | `Excitation` | swept | fixed |
//! | `Emission` | fixed | swept |
//! | `Synchronous` | swept | excitation + offset |
//!
//! Each step moves the swept axis (both, for synchronous scans), then takes
//! one measured/reference sample pair. Sweeps include `max` and overshoot it
//! by less than one step when the span is not a multiple of the step (see
//! [`ScanRange::len`]).
//!
//! # State Machine
//!
//! ```text
//! Configured ──run──> Running ──> Completed
//!                        │
//!                        └──────> Failed
//! ```
//!
//! An engine never leaves a terminal state; running it again is an error.
//! Shutters are closed on every exit path from `run`.

use super::detector::SignalSource;
use crate::error::{AppResult, DaqError};
use crate::hardware::monochromator::{MonochromatorController, Role};
use crate::measurement::{IntegrationTime, ScanRange, SignalTrace, Wavelength};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

// =============================================================================
// Scan specification
// =============================================================================

/// Protocol tag, as written in scan plan files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    /// One point, both wavelengths fixed.
    Singular,
    /// Excitation swept, emission fixed.
    Excitation,
    /// Emission swept, excitation fixed.
    Emission,
    /// Both swept at a constant offset.
    Synchronous,
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanType::Singular => write!(f, "singular"),
            ScanType::Excitation => write!(f, "excitation"),
            ScanType::Emission => write!(f, "emission"),
            ScanType::Synchronous => write!(f, "synchronous"),
        }
    }
}

/// Wavelength program of a scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanKind {
    /// Single point at fixed wavelengths.
    Singular {
        /// Excitation wavelength.
        excitation: Wavelength,
        /// Emission wavelength.
        emission: Wavelength,
    },
    /// Sweep excitation, emission fixed.
    Excitation {
        /// Fixed emission wavelength.
        emission: Wavelength,
        /// Excitation sweep.
        excitation: ScanRange,
    },
    /// Sweep emission, excitation fixed.
    Emission {
        /// Fixed excitation wavelength.
        excitation: Wavelength,
        /// Emission sweep.
        emission: ScanRange,
    },
    /// Sweep excitation; emission follows at `excitation + offset`.
    Synchronous {
        /// Emission minus excitation, in nm.
        offset: f64,
        /// Excitation sweep.
        excitation: ScanRange,
    },
}

impl ScanKind {
    /// Protocol tag.
    pub fn scan_type(&self) -> ScanType {
        match self {
            ScanKind::Singular { .. } => ScanType::Singular,
            ScanKind::Excitation { .. } => ScanType::Excitation,
            ScanKind::Emission { .. } => ScanType::Emission,
            ScanKind::Synchronous { .. } => ScanType::Synchronous,
        }
    }

    /// Number of sample pairs a complete run produces.
    pub fn len(&self) -> usize {
        match self {
            ScanKind::Singular { .. } => 1,
            ScanKind::Excitation { excitation, .. } | ScanKind::Synchronous { excitation, .. } => {
                excitation.len()
            }
            ScanKind::Emission { emission, .. } => emission.len(),
        }
    }

    /// Always false: every protocol has at least one step.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (excitation, emission) wavelengths of step `index`.
    pub fn pair(&self, index: usize) -> (Wavelength, Wavelength) {
        match *self {
            ScanKind::Singular {
                excitation,
                emission,
            } => (excitation, emission),
            ScanKind::Excitation {
                emission,
                excitation,
            } => (excitation.point(index), emission),
            ScanKind::Emission {
                excitation,
                emission,
            } => (excitation, emission.point(index)),
            ScanKind::Synchronous { offset, excitation } => {
                let ex = excitation.point(index);
                (ex, ex + offset)
            }
        }
    }
}

/// A named scan with its acquisition settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSpec {
    /// Scan name; also names the traces and the output file.
    pub name: String,
    /// Wavelength program.
    pub kind: ScanKind,
    /// Detector integration time per step.
    pub integration_time: IntegrationTime,
    /// Slit width applied to both monochromators before sampling.
    pub resolution: f64,
}

// =============================================================================
// Engine state and results
// =============================================================================

/// Lifecycle of a [`ScanEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    /// Built, not yet run.
    Configured,
    /// Executing.
    Running,
    /// Every step succeeded.
    Completed,
    /// A step failed; collected samples remain available.
    Failed,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Configured => write!(f, "Configured"),
            ScanState::Running => write!(f, "Running"),
            ScanState::Completed => write!(f, "Completed"),
            ScanState::Failed => write!(f, "Failed"),
        }
    }
}

impl ScanState {
    /// True for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Completed | ScanState::Failed)
    }
}

/// One sample pair with the wavelengths it was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    /// Excitation wavelength (nm).
    pub excitation_nm: f64,
    /// Emission wavelength (nm).
    pub emission_nm: f64,
    /// Measured signal.
    pub measured: f64,
    /// Reference signal.
    pub reference: f64,
}

/// Samples of one scan, paired with their wavelengths.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    /// Scan name.
    pub name: String,
    /// Protocol tag.
    pub scan_type: ScanType,
    /// When the engine started running.
    pub started_at: DateTime<Local>,
    /// One entry per completed step, in acquisition order.
    pub points: Vec<ScanPoint>,
}

impl ScanResult {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when no step completed.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// =============================================================================
// ScanEngine
// =============================================================================

/// Executes one [`ScanSpec`] against an excitation/emission controller pair.
pub struct ScanEngine<'a> {
    spec: ScanSpec,
    excitation: &'a mut MonochromatorController,
    emission: &'a mut MonochromatorController,
    detector: &'a mut dyn SignalSource,
    state: ScanState,
    measured: SignalTrace,
    reference: SignalTrace,
    started_at: DateTime<Local>,
}

impl<'a> ScanEngine<'a> {
    /// Check controller roles and build a `Configured` engine.
    ///
    /// Nothing is sent to the hardware here.
    pub fn new(
        spec: ScanSpec,
        excitation: &'a mut MonochromatorController,
        emission: &'a mut MonochromatorController,
        detector: &'a mut dyn SignalSource,
    ) -> AppResult<Self> {
        if excitation.role() != Role::Excitation {
            return Err(DaqError::Configuration(format!(
                "scan '{}': excitation controller has role {}",
                spec.name,
                excitation.role()
            )));
        }
        if emission.role() != Role::Emission {
            return Err(DaqError::Configuration(format!(
                "scan '{}': emission controller has role {}",
                spec.name,
                emission.role()
            )));
        }

        let measured = SignalTrace::new(format!("{} : Measured signal", spec.name));
        let reference = SignalTrace::new(format!("{} : Reference signal", spec.name));
        Ok(Self {
            spec,
            excitation,
            emission,
            detector,
            state: ScanState::Configured,
            measured,
            reference,
            started_at: Local::now(),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// The scan being executed.
    pub fn spec(&self) -> &ScanSpec {
        &self.spec
    }

    /// Measured samples collected so far.
    pub fn measured(&self) -> &SignalTrace {
        &self.measured
    }

    /// Reference samples collected so far.
    pub fn reference(&self) -> &SignalTrace {
        &self.reference
    }

    /// Samples collected so far, paired with their wavelengths.
    ///
    /// Available in every state, so a failed scan can still be inspected.
    pub fn result(&self) -> ScanResult {
        let points = self
            .measured
            .samples()
            .iter()
            .zip(self.reference.samples())
            .enumerate()
            .map(|(i, (&measured, &reference))| {
                let (ex, em) = self.spec.kind.pair(i);
                ScanPoint {
                    excitation_nm: ex.nm(),
                    emission_nm: em.nm(),
                    measured,
                    reference,
                }
            })
            .collect();

        ScanResult {
            name: self.spec.name.clone(),
            scan_type: self.spec.kind.scan_type(),
            started_at: self.started_at,
            points,
        }
    }

    /// Execute the scan once.
    ///
    /// On failure the engine moves to `Failed` and returns the first error;
    /// shutters are closed either way.
    #[instrument(skip(self), fields(scan = %self.spec.name, kind = %self.spec.kind.scan_type()), err)]
    pub async fn run(&mut self) -> AppResult<ScanResult> {
        if self.state != ScanState::Configured {
            return Err(DaqError::InvalidState(format!(
                "scan '{}' is {} and cannot be run again",
                self.spec.name, self.state
            )));
        }
        self.state = ScanState::Running;
        self.started_at = Local::now();
        tracing::info!(
            scan = %self.spec.name,
            steps = self.spec.kind.len(),
            integration = %self.spec.integration_time,
            "Scan started"
        );

        let outcome = self.execute().await;
        let closed = self.close_shutters().await;

        let outcome = match (outcome, closed) {
            (Ok(()), closed) => closed,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                tracing::warn!(error = %close_err, "Failed to close shutters after scan failure");
                Err(e)
            }
        };

        match outcome {
            Ok(()) => {
                self.state = ScanState::Completed;
                tracing::info!(scan = %self.spec.name, samples = self.measured.len(), "Scan completed");
                Ok(self.result())
            }
            Err(e) => {
                self.state = ScanState::Failed;
                tracing::warn!(
                    scan = %self.spec.name,
                    samples = self.measured.len(),
                    error = %e,
                    "Scan failed"
                );
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> AppResult<()> {
        match self.spec.kind {
            ScanKind::Singular {
                excitation,
                emission,
            } => {
                self.open_shutters().await?;
                self.set_resolution().await?;
                self.excitation.move_to_wavelength(excitation).await?;
                self.emission.move_to_wavelength(emission).await?;
                self.sample().await?;
            }
            ScanKind::Excitation {
                emission,
                excitation,
            } => {
                self.emission.move_to_wavelength(emission).await?;
                self.open_shutters().await?;
                self.set_resolution().await?;
                for wl in excitation.points() {
                    self.excitation.move_to_wavelength(wl).await?;
                    self.sample().await?;
                }
            }
            ScanKind::Emission {
                excitation,
                emission,
            } => {
                self.excitation.move_to_wavelength(excitation).await?;
                self.open_shutters().await?;
                self.set_resolution().await?;
                for wl in emission.points() {
                    self.emission.move_to_wavelength(wl).await?;
                    self.sample().await?;
                }
            }
            ScanKind::Synchronous { offset, excitation } => {
                self.open_shutters().await?;
                self.set_resolution().await?;
                for wl in excitation.points() {
                    self.excitation.move_to_wavelength(wl).await?;
                    self.emission.move_to_wavelength(wl + offset).await?;
                    self.sample().await?;
                }
            }
        }
        Ok(())
    }

    /// Acquire one pair. Both traces grow together or not at all.
    async fn sample(&mut self) -> AppResult<()> {
        let measured = self.detector.measure(self.spec.integration_time).await?;
        let reference = self.detector.reference().await?;
        self.measured.append(measured);
        self.reference.append(reference);
        tracing::debug!(
            step = self.measured.len(),
            excitation = %self.excitation.wavelength(),
            emission = %self.emission.wavelength(),
            measured,
            reference,
            "Sample acquired"
        );
        Ok(())
    }

    async fn set_resolution(&mut self) -> AppResult<()> {
        self.excitation.set_resolution(self.spec.resolution).await?;
        self.emission.set_resolution(self.spec.resolution).await
    }

    async fn open_shutters(&mut self) -> AppResult<()> {
        self.excitation.open_shutter().await?;
        self.emission.open_shutter().await
    }

    /// Close both shutters, attempting the second even if the first fails.
    async fn close_shutters(&mut self) -> AppResult<()> {
        let ex = self.excitation.close_shutter().await;
        let em = self.emission.close_shutter().await;
        ex.and(em)
    }
}

impl fmt::Debug for ScanEngine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanEngine")
            .field("spec", &self.spec)
            .field("state", &self.state)
            .field("samples", &self.measured.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: f64, max: f64, step: f64) -> ScanRange {
        ScanRange::new(min.into(), max.into(), step.into()).unwrap()
    }

    #[test]
    fn pairing_rules_per_kind() {
        let singular = ScanKind::Singular {
            excitation: 350.0.into(),
            emission: 450.0.into(),
        };
        assert_eq!(singular.len(), 1);
        assert_eq!(singular.pair(0), (350.0.into(), 450.0.into()));

        let ex = ScanKind::Excitation {
            emission: 450.0.into(),
            excitation: range(300.0, 310.0, 5.0),
        };
        assert_eq!(ex.len(), 3);
        assert_eq!(ex.pair(2), (310.0.into(), 450.0.into()));

        let em = ScanKind::Emission {
            excitation: 350.0.into(),
            emission: range(400.0, 410.0, 10.0),
        };
        assert_eq!(em.pair(1), (350.0.into(), 410.0.into()));

        let sync = ScanKind::Synchronous {
            offset: 20.0,
            excitation: range(400.0, 402.0, 1.0),
        };
        let pairs: Vec<_> = (0..sync.len()).map(|i| sync.pair(i)).collect();
        assert_eq!(
            pairs,
            vec![
                (400.0.into(), 420.0.into()),
                (401.0.into(), 421.0.into()),
                (402.0.into(), 422.0.into()),
            ]
        );
        assert_eq!(sync.scan_type(), ScanType::Synchronous);
    }

    #[test]
    fn terminal_states() {
        assert!(!ScanState::Configured.is_terminal());
        assert!(!ScanState::Running.is_terminal());
        assert!(ScanState::Completed.is_terminal());
        assert!(ScanState::Failed.is_terminal());
        assert_eq!(ScanState::Failed.to_string(), "Failed");
    }
}
