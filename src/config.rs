//! Configuration loading using Figment.
//!
//! Two documents drive a session:
//! 1. the **system** file: one section per monochromator (port, calibration,
//!    step bounds, optional slit bank, protocol timings)
//! 2. the **scan plan** file: an ordered list of scans to execute
//!
//! Both may be YAML (`.yml`/`.yaml`) or TOML (`.toml`). System settings can be
//! overridden from the environment with the `FLUORO_DAQ_` prefix, nested keys
//! separated by `__`, e.g. `FLUORO_DAQ_EXCITATION__PORT=/dev/ttyACM1`.
//!
//! # Example
//! ```no_run
//! use fluoro_daq::config::{ScanPlanConfig, SystemConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let system = SystemConfig::load_from("config/system.yml")?;
//! system.validate()?;
//! let scans = ScanPlanConfig::load_from("config/scans.yml")?.specs()?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, DaqError};
use crate::experiment::{ScanKind, ScanSpec, ScanType};
use crate::hardware::axis::StepBounds;
use crate::hardware::kinematics::KinematicModel;
use crate::hardware::monochromator::Role;
use crate::hardware::protocol::ProtocolTimings;
use crate::logging;
use crate::measurement::{IntegrationTime, ScanRange, Wavelength};
use figment::{
    providers::{Env, Format, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Prefix of environment overrides for the system file.
pub const ENV_PREFIX: &str = "FLUORO_DAQ_";

// =============================================================================
// System configuration
// =============================================================================

/// Hardware description of the spectrometer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Excitation monochromator
    pub excitation: ControllerConfig,
    /// Emission monochromator
    pub emission: ControllerConfig,
}

/// One monochromator controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Serial port path (e.g. `/dev/ttyACM0`, `COM3`)
    pub port: String,
    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Wavelength at step 0 (nm)
    #[serde(default)]
    pub offset: f64,
    /// Linear nm per step, or sine amplitude when `phase` is set
    #[serde(default = "default_coeff")]
    pub coeff: f64,
    /// Radians per step; selects the sinusoidal-phase model when present
    #[serde(default)]
    pub phase: Option<f64>,
    /// Lowest grating step
    #[serde(default)]
    pub min_step: i64,
    /// Highest grating step
    #[serde(default = "default_max_step")]
    pub max_step: i64,
    /// Slit bank, on models that have one
    #[serde(default)]
    pub slits: Option<SlitConfig>,
    /// Protocol deadlines and delays
    #[serde(default)]
    pub timings: ProtocolTimings,
}

/// Slit bank of a controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlitConfig {
    /// Number of slit elements (`SLIT1` .. `SLITn`)
    #[serde(default = "default_slit_count")]
    pub count: usize,
    /// Slit width at step 0
    #[serde(default)]
    pub offset: f64,
    /// Slit width per step
    pub coeff: f64,
    /// Lowest slit step
    #[serde(default = "default_slit_min_step")]
    pub min_step: i64,
    /// Highest slit step
    #[serde(default = "default_max_step")]
    pub max_step: i64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_coeff() -> f64 {
    1.0
}

fn default_max_step() -> i64 {
    10_000
}

fn default_slit_count() -> usize {
    1
}

fn default_slit_min_step() -> i64 {
    -1000
}

impl SystemConfig {
    /// Load from a YAML or TOML file, then apply `FLUORO_DAQ_` overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(file_figment(path.as_ref())?
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?)
    }

    /// Semantic checks that deserialization cannot express.
    pub fn validate(&self) -> AppResult<()> {
        logging::parse_log_level(&self.log_level)?;
        self.excitation.validate(Role::Excitation)?;
        self.emission.validate(Role::Emission)?;
        if self.excitation.port == self.emission.port {
            return Err(DaqError::Configuration(format!(
                "excitation and emission share serial port {}",
                self.excitation.port
            )));
        }
        Ok(())
    }

    /// Section for the given role.
    pub fn controller(&self, role: Role) -> &ControllerConfig {
        match role {
            Role::Excitation => &self.excitation,
            Role::Emission => &self.emission,
        }
    }
}

impl ControllerConfig {
    /// Grating model: sinusoidal when `phase` is set, linear otherwise.
    pub fn kinematic_model(&self) -> AppResult<KinematicModel> {
        match self.phase {
            Some(phase) => KinematicModel::sinusoidal(self.offset, self.coeff, phase),
            None => KinematicModel::linear(self.offset, self.coeff),
        }
    }

    /// Grating step bounds.
    pub fn step_bounds(&self) -> AppResult<StepBounds> {
        StepBounds::new(self.min_step, self.max_step)
    }

    /// Wavelengths at the grating step bounds.
    pub fn wavelength_limits(&self) -> AppResult<(Wavelength, Wavelength)> {
        Ok(self.kinematic_model()?.limits(self.step_bounds()?))
    }

    /// Slit values at the slit step bounds, `None` without a slit bank.
    pub fn resolution_limits(&self) -> AppResult<Option<(Wavelength, Wavelength)>> {
        match &self.slits {
            Some(slits) => Ok(Some(
                slits.kinematic_model()?.limits(slits.step_bounds()?),
            )),
            None => Ok(None),
        }
    }

    fn validate(&self, role: Role) -> AppResult<()> {
        let context = |e: DaqError| match e {
            DaqError::Configuration(msg) => DaqError::Configuration(format!("{role}: {msg}")),
            other => other,
        };
        if self.port.trim().is_empty() {
            return Err(DaqError::Configuration(format!(
                "{role}: serial port must not be empty"
            )));
        }
        if self.baud_rate == 0 {
            return Err(DaqError::Configuration(format!(
                "{role}: baud rate must be positive"
            )));
        }
        self.kinematic_model().map_err(context)?;
        self.step_bounds().map_err(context)?;
        if self.timings.command_timeout.is_zero() || self.timings.poll_interval.is_zero() {
            return Err(DaqError::Configuration(format!(
                "{role}: command timeout and poll interval must be positive"
            )));
        }
        if let Some(slits) = &self.slits {
            if slits.count == 0 {
                return Err(DaqError::Configuration(format!(
                    "{role}: slit bank needs at least one element"
                )));
            }
            slits.kinematic_model().map_err(context)?;
            slits.step_bounds().map_err(context)?;
        }
        Ok(())
    }
}

impl SlitConfig {
    /// Linear slit-width model.
    pub fn kinematic_model(&self) -> AppResult<KinematicModel> {
        KinematicModel::linear(self.offset, self.coeff)
    }

    /// Slit step bounds.
    pub fn step_bounds(&self) -> AppResult<StepBounds> {
        StepBounds::new(self.min_step, self.max_step)
    }
}

// =============================================================================
// Scan plan
// =============================================================================

/// Ordered list of scans to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPlanConfig {
    /// Scans in execution order
    pub scans: Vec<ScanEntry>,
}

/// One scan as written in the plan file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEntry {
    /// Scan name; also the output file name
    pub name: String,
    /// Protocol
    #[serde(rename = "type")]
    pub scan_type: ScanType,
    /// Integration time per step: a number of milliseconds or `"100ms"`
    #[serde(default = "default_integration_time")]
    pub integration_time: Millis,
    /// Slit width applied before sampling
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    /// Fixed excitation wavelength (singular, emission)
    #[serde(default)]
    pub excitation_wavelength: Option<f64>,
    /// Fixed emission wavelength (singular, excitation)
    #[serde(default)]
    pub emission_wavelength: Option<f64>,
    /// Emission minus excitation (synchronous)
    #[serde(default)]
    pub offset_wavelength: Option<f64>,
    /// Swept range (excitation, emission, synchronous)
    #[serde(default)]
    pub scan_range: Option<RangeEntry>,
}

/// Sweep range as written in the plan file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeEntry {
    /// First wavelength (nm)
    pub start: f64,
    /// Last wavelength (nm), included when reached exactly
    pub end: f64,
    /// Increment (nm)
    #[serde(default = "default_range_step")]
    pub step: f64,
}

/// A millisecond quantity written either as a number or with an `ms` suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Millis {
    /// Plain number, milliseconds
    Number(f64),
    /// Text such as `"250ms"` or `"250"`
    Text(String),
}

impl Millis {
    /// Value in milliseconds.
    pub fn as_millis(&self) -> AppResult<f64> {
        match self {
            Millis::Number(ms) => Ok(*ms),
            Millis::Text(text) => {
                let trimmed = text.trim();
                let digits = trimmed.strip_suffix("ms").unwrap_or(trimmed).trim();
                digits.parse::<f64>().map_err(|_| {
                    DaqError::Configuration(format!(
                        "invalid integration time '{text}', expected milliseconds such as \"100ms\""
                    ))
                })
            }
        }
    }
}

fn default_integration_time() -> Millis {
    Millis::Number(100.0)
}

fn default_resolution() -> f64 {
    0.1
}

fn default_range_step() -> f64 {
    1.0
}

impl ScanPlanConfig {
    /// Load from a YAML or TOML file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(file_figment(path.as_ref())?.extract()?)
    }

    /// Validate every entry and check for duplicate names.
    pub fn validate(&self) -> AppResult<()> {
        self.specs().map(|_| ())
    }

    /// Validated scan specifications, in file order.
    pub fn specs(&self) -> AppResult<Vec<ScanSpec>> {
        if self.scans.is_empty() {
            return Err(DaqError::Configuration(
                "scan plan contains no scans".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for entry in &self.scans {
            if !names.insert(entry.name.as_str()) {
                return Err(DaqError::Configuration(format!(
                    "duplicate scan name '{}'",
                    entry.name
                )));
            }
        }
        self.scans.iter().map(ScanEntry::to_spec).collect()
    }
}

impl ScanEntry {
    /// Build a validated [`ScanSpec`].
    pub fn to_spec(&self) -> AppResult<ScanSpec> {
        let invalid = |msg: String| DaqError::Configuration(format!("scan '{}': {msg}", self.name));

        if self.name.trim().is_empty() {
            return Err(DaqError::Configuration(
                "scan name must not be empty".to_string(),
            ));
        }
        let integration_time = self
            .integration_time
            .as_millis()
            .and_then(IntegrationTime::from_millis)
            .map_err(|e| invalid(inner_message(e)))?;
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(invalid(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }

        let require = |value: Option<f64>, field: &str| {
            value
                .map(Wavelength::new)
                .ok_or_else(|| invalid(format!("{} scan requires '{field}'", self.scan_type)))
        };
        let range = || -> AppResult<ScanRange> {
            let r = self.scan_range.ok_or_else(|| {
                invalid(format!("{} scan requires 'scan_range'", self.scan_type))
            })?;
            ScanRange::new(r.start.into(), r.end.into(), r.step.into())
                .map_err(|e| invalid(inner_message(e)))
        };

        let kind = match self.scan_type {
            ScanType::Singular => ScanKind::Singular {
                excitation: require(self.excitation_wavelength, "excitation_wavelength")?,
                emission: require(self.emission_wavelength, "emission_wavelength")?,
            },
            ScanType::Excitation => ScanKind::Excitation {
                emission: require(self.emission_wavelength, "emission_wavelength")?,
                excitation: range()?,
            },
            ScanType::Emission => ScanKind::Emission {
                excitation: require(self.excitation_wavelength, "excitation_wavelength")?,
                emission: range()?,
            },
            ScanType::Synchronous => ScanKind::Synchronous {
                offset: require(self.offset_wavelength, "offset_wavelength")?.nm(),
                excitation: range()?,
            },
        };

        Ok(ScanSpec {
            name: self.name.clone(),
            kind,
            integration_time,
            resolution: self.resolution,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn file_figment(path: &Path) -> AppResult<Figment> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("yml" | "yaml") => Ok(Figment::new().merge(Yaml::file(path))),
        Some("toml") => Ok(Figment::new().merge(Toml::file(path))),
        _ => Err(DaqError::Configuration(format!(
            "unsupported configuration format: {} (expected .yml, .yaml or .toml)",
            path.display()
        ))),
    }
}

fn inner_message(e: DaqError) -> String {
    match e {
        DaqError::Configuration(msg) => msg,
        other => other.to_string(),
    }
}
