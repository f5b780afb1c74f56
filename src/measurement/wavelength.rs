//! Wavelength value types: single wavelengths, sweep ranges, and integration time.

use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Longest accepted integration time, in milliseconds.
pub const MAX_INTEGRATION_MS: f64 = 1_000_000.0;

/// An optical wavelength in nanometers.
///
/// Carries no bounds of its own; reachability is decided by the kinematic model
/// and the axis step limits.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wavelength(f64);

impl Wavelength {
    /// Wrap a value in nanometers.
    pub const fn new(nm: f64) -> Self {
        Self(nm)
    }

    /// Value in nanometers.
    pub const fn nm(self) -> f64 {
        self.0
    }

    /// Wavenumber in cm⁻¹ (10⁴ / λ).
    pub fn to_wavenumber(self) -> AppResult<f64> {
        if self.0 == 0.0 {
            return Err(DaqError::Configuration(
                "wavelength cannot be zero for wavenumber conversion".into(),
            ));
        }
        Ok(1e4 / self.0)
    }

    /// Frequency as c / λ, with λ taken in the unit it is stored in.
    pub fn to_frequency(self) -> AppResult<f64> {
        if self.0 == 0.0 {
            return Err(DaqError::Configuration(
                "wavelength cannot be zero for frequency conversion".into(),
            ));
        }
        Ok(SPEED_OF_LIGHT / self.0)
    }
}

impl fmt::Display for Wavelength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} nm", self.0)
    }
}

impl From<f64> for Wavelength {
    fn from(nm: f64) -> Self {
        Self(nm)
    }
}

impl Add<f64> for Wavelength {
    type Output = Wavelength;

    fn add(self, rhs: f64) -> Wavelength {
        Wavelength(self.0 + rhs)
    }
}

impl Sub<f64> for Wavelength {
    type Output = Wavelength;

    fn sub(self, rhs: f64) -> Wavelength {
        Wavelength(self.0 - rhs)
    }
}

/// A (min, max, step) sweep specification.
///
/// Invariant: `min < max` and `step > 0`, checked by [`ScanRange::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanRange {
    min: Wavelength,
    max: Wavelength,
    step: Wavelength,
}

impl ScanRange {
    /// Validate and build a range.
    pub fn new(min: Wavelength, max: Wavelength, step: Wavelength) -> AppResult<Self> {
        if !min.nm().is_finite() || !max.nm().is_finite() {
            return Err(DaqError::Configuration(format!(
                "scan range bounds must be finite, got {min} .. {max}"
            )));
        }
        if !(min.nm() < max.nm()) {
            return Err(DaqError::Configuration(format!(
                "scan range minimum ({min}) must be less than maximum ({max})"
            )));
        }
        if !(step.nm() > 0.0) || !step.nm().is_finite() {
            return Err(DaqError::Configuration(format!(
                "scan range step must be positive, got {step}"
            )));
        }
        Ok(Self { min, max, step })
    }

    /// Lower end of the sweep.
    pub fn min(&self) -> Wavelength {
        self.min
    }

    /// Upper end of the sweep.
    pub fn max(&self) -> Wavelength {
        self.max
    }

    /// Increment between consecutive points.
    pub fn step(&self) -> Wavelength {
        self.step
    }

    /// Number of points visited by [`ScanRange::points`].
    ///
    /// Points are `min + i·step` for every value strictly below `max + step`, so
    /// `max` itself is included when the span is a multiple of the step, and the
    /// sweep overshoots `max` by less than one step otherwise.
    pub fn len(&self) -> usize {
        let span = (self.max.nm() + self.step.nm() - self.min.nm()) / self.step.nm();
        span.ceil().max(0.0) as usize
    }

    /// Always false: a validated range has at least one point.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The i-th point of the sweep.
    pub fn point(&self, index: usize) -> Wavelength {
        Wavelength(self.min.nm() + index as f64 * self.step.nm())
    }

    /// Points of the sweep, in order, computed as they are consumed.
    pub fn points(&self) -> impl Iterator<Item = Wavelength> + '_ {
        (0..self.len()).map(|i| self.point(i))
    }
}

impl fmt::Display for ScanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {} step {}",
            self.min.nm(),
            self.max.nm(),
            self.step.nm()
        )
    }
}

/// Detector integration time in milliseconds, `0 < ms <= 1_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct IntegrationTime(f64);

impl IntegrationTime {
    /// Validate a value in milliseconds.
    pub fn from_millis(ms: f64) -> AppResult<Self> {
        if !(ms > 0.0) {
            return Err(DaqError::Configuration(format!(
                "integration time must be positive, got {ms} ms"
            )));
        }
        if ms > MAX_INTEGRATION_MS {
            return Err(DaqError::Configuration(format!(
                "integration time must not exceed {MAX_INTEGRATION_MS} ms, got {ms} ms"
            )));
        }
        Ok(Self(ms))
    }

    /// Value in milliseconds.
    pub fn as_millis(&self) -> f64 {
        self.0
    }

    /// Value in seconds.
    pub fn as_secs_f64(&self) -> f64 {
        self.0 / 1000.0
    }

    /// Value as a sleepable duration.
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs_f64(self.as_secs_f64())
    }
}

impl Default for IntegrationTime {
    fn default() -> Self {
        Self(1000.0)
    }
}

impl fmt::Display for IntegrationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ms", self.0)
    }
}
