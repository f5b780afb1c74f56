//! Excitation/emission monochromator controller.
//!
//! A controller owns one serial connection, shared by its grating axis (`WL`),
//! its shutter and, on slit-equipped models, its slit bank. Wavelength moves go
//! through the kinematic model; the cached wavelength is always recomputed from
//! the step actually reached, so integer-step rounding is visible to callers.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut ex = MonochromatorController::connect(Role::Excitation, &config.excitation).await?;
//! ex.initialize().await?;
//! let reached = ex.move_to_wavelength(Wavelength::new(450.0)).await?;
//! ex.shutdown().await?;
//! ```

use super::axis::{MotorAxis, StepBounds};
use super::kinematics::KinematicModel;
use super::protocol::{self, Command, ProtocolTimings, ShutterAction};
use super::serial::{CommandChannel, SharedChannel};
use super::slit::SlitBank;
use crate::config::ControllerConfig;
use crate::error::AppResult;
use crate::measurement::Wavelength;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::instrument;

/// Wire token of the grating axis.
pub const GRATING_AXIS: &str = "WL";

/// Which optical path a controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Selects the wavelength exciting the sample.
    Excitation,
    /// Selects the wavelength collected from the sample.
    Emission,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Excitation => write!(f, "excitation"),
            Role::Emission => write!(f, "emission"),
        }
    }
}

/// Last commanded shutter position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutterState {
    /// Light passes.
    Open,
    /// Light blocked.
    #[default]
    Closed,
}

/// One monochromator: grating axis, kinematic model, shutter, optional slits.
pub struct MonochromatorController {
    role: Role,
    channel: SharedChannel,
    axis: MotorAxis,
    model: KinematicModel,
    slits: Option<SlitBank>,
    shutter: ShutterState,
    wavelength: Wavelength,
    timings: ProtocolTimings,
}

impl MonochromatorController {
    /// Create a controller on an already-open channel.
    pub fn new(
        role: Role,
        channel: SharedChannel,
        model: KinematicModel,
        bounds: StepBounds,
        timings: ProtocolTimings,
    ) -> Self {
        let axis = MotorAxis::new(
            GRATING_AXIS,
            channel.clone(),
            bounds,
            timings.command_timeout,
        );
        Self {
            role,
            channel,
            axis,
            wavelength: model.wavelength_at(0),
            model,
            slits: None,
            shutter: ShutterState::Closed,
            timings,
        }
    }

    /// Attach a slit bank sharing this controller's channel.
    pub fn with_slits(
        mut self,
        count: usize,
        model: KinematicModel,
        bounds: StepBounds,
    ) -> AppResult<Self> {
        self.slits = Some(SlitBank::new(
            count,
            model,
            bounds,
            self.channel.clone(),
            self.timings.command_timeout,
        )?);
        Ok(self)
    }

    /// Build a controller from its configuration on an already-open channel.
    pub fn from_config(
        role: Role,
        config: &ControllerConfig,
        channel: SharedChannel,
    ) -> AppResult<Self> {
        let controller = Self::new(
            role,
            channel,
            config.kinematic_model()?,
            config.step_bounds()?,
            config.timings,
        );
        match &config.slits {
            Some(slits) => {
                controller.with_slits(slits.count, slits.kinematic_model()?, slits.step_bounds()?)
            }
            None => Ok(controller),
        }
    }

    /// Open the configured serial port and build the controller on it.
    pub async fn connect(role: Role, config: &ControllerConfig) -> AppResult<Self> {
        let channel =
            CommandChannel::open(&config.port, config.baud_rate, config.timings.poll_interval)
                .await?;
        tracing::info!(%role, port = %config.port, "Monochromator connected");
        Self::from_config(role, config, channel.into_shared())
    }

    /// Optical path this controller drives.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Wavelength at the current step, from the forward model.
    pub fn wavelength(&self) -> Wavelength {
        self.wavelength
    }

    /// Current grating step.
    pub fn step(&self) -> i64 {
        self.axis.step()
    }

    /// True once the grating axis has been zeroed.
    pub fn is_zeroed(&self) -> bool {
        self.axis.is_zeroed()
    }

    /// Last commanded shutter position.
    pub fn shutter(&self) -> ShutterState {
        self.shutter
    }

    /// Kinematic model of the grating axis.
    pub fn model(&self) -> &KinematicModel {
        &self.model
    }

    /// Slit bank, if the model has one.
    pub fn slits(&self) -> Option<&SlitBank> {
        self.slits.as_ref()
    }

    /// Wavelengths at the lower and upper step bounds.
    pub fn wavelength_limits(&self) -> (Wavelength, Wavelength) {
        self.model.limits(self.axis.bounds())
    }

    /// Slit values at the slit bank's step bounds, if there is a bank.
    pub fn resolution_limits(&self) -> Option<(Wavelength, Wavelength)> {
        self.slits.as_ref().map(SlitBank::resolution_limits)
    }

    /// Wait for the firmware banner, then zero the grating and the slits.
    #[instrument(skip(self), fields(role = %self.role), err)]
    pub async fn initialize(&mut self) -> AppResult<()> {
        {
            let mut channel = self.channel.lock().await;
            protocol::await_banner(&mut channel, self.timings.init_timeout).await?;
        }
        tokio::time::sleep(self.timings.init_settle).await;

        self.zero().await?;
        tracing::info!(role = %self.role, wavelength = %self.wavelength, "Monochromator initialized");
        Ok(())
    }

    /// Zero the grating axis (and slits) without waiting for the banner.
    #[instrument(skip(self), fields(role = %self.role), err)]
    pub async fn zero(&mut self) -> AppResult<()> {
        self.axis.zero().await?;
        self.wavelength = self.model.wavelength_at(self.axis.step());
        if let Some(slits) = self.slits.as_mut() {
            slits.zero().await?;
        }
        Ok(())
    }

    /// Move the grating to `target` and return the wavelength actually reached.
    #[instrument(skip(self, target), fields(role = %self.role, target = %target), err)]
    pub async fn move_to_wavelength(&mut self, target: Wavelength) -> AppResult<Wavelength> {
        let step = self.model.step_for(target)?;
        self.axis.move_to(step).await?;
        self.wavelength = self.model.wavelength_at(self.axis.step());
        Ok(self.wavelength)
    }

    /// Send `SHUTTER, OPEN` and wait for the shutter to settle.
    pub async fn open_shutter(&mut self) -> AppResult<()> {
        self.shutter_command(ShutterAction::Open).await?;
        self.shutter = ShutterState::Open;
        Ok(())
    }

    /// Send `SHUTTER, CLOSE` and wait for the shutter to settle.
    pub async fn close_shutter(&mut self) -> AppResult<()> {
        self.shutter_command(ShutterAction::Close).await?;
        self.shutter = ShutterState::Closed;
        Ok(())
    }

    /// Set the slit width. Controllers without slits log and do nothing.
    #[instrument(skip(self), fields(role = %self.role), err)]
    pub async fn set_resolution(&mut self, width: f64) -> AppResult<()> {
        match self.slits.as_mut() {
            Some(slits) => slits.move_to_value(width).await,
            None => {
                tracing::info!(role = %self.role, "No slit bank; resolution control not available");
                Ok(())
            }
        }
    }

    /// Flush and release the serial connection.
    pub async fn shutdown(self) -> AppResult<()> {
        let mut channel = self.channel.lock().await;
        channel.shutdown().await?;
        tracing::info!(role = %self.role, "Monochromator connection released");
        Ok(())
    }

    async fn shutter_command(&mut self, action: ShutterAction) -> AppResult<()> {
        let mut channel = self.channel.lock().await;
        protocol::fire_and_forget(
            &mut channel,
            &Command::Shutter(action),
            self.timings.shutter_settle,
        )
        .await
    }
}

impl fmt::Debug for MonochromatorController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonochromatorController")
            .field("role", &self.role)
            .field("model", &self.model)
            .field("axis", &self.axis)
            .field("slits", &self.slits)
            .field("shutter", &self.shutter)
            .field("wavelength", &self.wavelength)
            .finish_non_exhaustive()
    }
}
