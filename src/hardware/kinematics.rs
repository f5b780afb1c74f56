//! Step ↔ wavelength conversion for grating drives and slit actuators.

use super::axis::StepBounds;
use crate::error::{AppResult, DaqError};
use crate::measurement::Wavelength;
use std::fmt;

/// Quotients this close to an integer are treated as that integer before
/// truncation, so float noise never costs a step on a round trip.
const SNAP_EPSILON: f64 = 1e-9;

/// Deterministic mapping between motor step and physical value.
///
/// - `Linear`: `λ = offset + coeff·step`
/// - `SinusoidalPhase`: `λ = offset + coeff·sin(phase·step)`
///
/// Inverses truncate toward zero. The sinusoidal inverse is only defined while
/// `(λ − offset) / coeff` lies in [−1, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KinematicModel {
    /// Direct-drive grating or slit actuator.
    Linear {
        /// Value at step 0.
        offset: f64,
        /// Value change per step.
        coeff: f64,
    },
    /// Sine-bar grating drive.
    SinusoidalPhase {
        /// Value at step 0.
        offset: f64,
        /// Amplitude of the sine term.
        coeff: f64,
        /// Radians per step.
        phase: f64,
    },
}

impl KinematicModel {
    /// Linear model. `coeff` must be finite and non-zero.
    pub fn linear(offset: f64, coeff: f64) -> AppResult<Self> {
        check_finite("offset", offset)?;
        check_nonzero("coefficient", coeff)?;
        Ok(Self::Linear { offset, coeff })
    }

    /// Sinusoidal-phase model. `coeff` and `phase` must be finite and non-zero.
    pub fn sinusoidal(offset: f64, coeff: f64, phase: f64) -> AppResult<Self> {
        check_finite("offset", offset)?;
        check_nonzero("coefficient", coeff)?;
        check_nonzero("phase", phase)?;
        Ok(Self::SinusoidalPhase {
            offset,
            coeff,
            phase,
        })
    }

    /// Value at step 0.
    pub fn offset(&self) -> f64 {
        match *self {
            Self::Linear { offset, .. } | Self::SinusoidalPhase { offset, .. } => offset,
        }
    }

    /// Forward model.
    pub fn wavelength_at(&self, step: i64) -> Wavelength {
        let step = step as f64;
        let nm = match *self {
            Self::Linear { offset, coeff } => offset + coeff * step,
            Self::SinusoidalPhase {
                offset,
                coeff,
                phase,
            } => offset + coeff * (phase * step).sin(),
        };
        Wavelength::new(nm)
    }

    /// Values at the lower and upper step bounds.
    pub fn limits(&self, bounds: StepBounds) -> (Wavelength, Wavelength) {
        (self.wavelength_at(bounds.min), self.wavelength_at(bounds.max))
    }

    /// Inverse model, truncated toward zero.
    ///
    /// Fails with [`DaqError::KinematicDomain`] when the sinusoidal argument
    /// leaves [−1, 1].
    pub fn step_for(&self, wavelength: Wavelength) -> AppResult<i64> {
        let nm = wavelength.nm();
        check_finite("wavelength", nm)?;

        let quotient = match *self {
            Self::Linear { offset, coeff } => (nm - offset) / coeff,
            Self::SinusoidalPhase {
                offset,
                coeff,
                phase,
            } => {
                let argument = (nm - offset) / coeff;
                if !(-1.0..=1.0).contains(&argument) {
                    return Err(DaqError::KinematicDomain {
                        wavelength: nm,
                        argument,
                    });
                }
                argument.asin() / phase
            }
        };
        Ok(truncate(quotient))
    }
}

impl fmt::Display for KinematicModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear { offset, coeff } => write!(f, "linear({offset} + {coeff}·step)"),
            Self::SinusoidalPhase {
                offset,
                coeff,
                phase,
            } => write!(f, "sinusoidal({offset} + {coeff}·sin({phase}·step))"),
        }
    }
}

fn truncate(quotient: f64) -> i64 {
    let nearest = quotient.round();
    if (quotient - nearest).abs() < SNAP_EPSILON {
        nearest as i64
    } else {
        quotient.trunc() as i64
    }
}

fn check_finite(what: &str, value: f64) -> AppResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DaqError::Configuration(format!(
            "{what} must be finite, got {value}"
        )))
    }
}

fn check_nonzero(what: &str, value: f64) -> AppResult<()> {
    check_finite(what, value)?;
    if value == 0.0 {
        return Err(DaqError::Configuration(format!("{what} must be non-zero")));
    }
    Ok(())
}
