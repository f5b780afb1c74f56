//! A single stepper-driven axis on the monochromator controller board.
//!
//! The board only understands relative moves, so the axis keeps the absolute
//! step itself: it starts at 0 (uncalibrated) and is reset by a successful
//! zero-find. Every later successful move updates it to the commanded target.

use super::protocol::{self, Command, Direction};
use super::serial::SharedChannel;
use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;

/// Inclusive step limits of an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepBounds {
    /// Lowest reachable step.
    pub min: i64,
    /// Highest reachable step.
    pub max: i64,
}

impl StepBounds {
    /// Validate `min <= max`.
    pub fn new(min: i64, max: i64) -> AppResult<Self> {
        if min > max {
            return Err(DaqError::Configuration(format!(
                "step bounds are inverted: min {min} > max {max}"
            )));
        }
        Ok(Self { min, max })
    }

    /// True when `step` lies within the bounds.
    pub fn contains(&self, step: i64) -> bool {
        (self.min..=self.max).contains(&step)
    }

    /// [`DaqError::Range`] naming `target` when `step` is out of bounds.
    pub fn check(&self, target: &str, step: i64) -> AppResult<()> {
        if self.contains(step) {
            Ok(())
        } else {
            Err(DaqError::Range {
                target: target.to_string(),
                step,
                min: self.min,
                max: self.max,
            })
        }
    }
}

impl Default for StepBounds {
    fn default() -> Self {
        Self { min: 0, max: 10_000 }
    }
}

/// One motorized axis addressed by name (`WL`, `SLIT1`, ...).
pub struct MotorAxis {
    name: String,
    channel: SharedChannel,
    bounds: StepBounds,
    step: i64,
    zeroed: bool,
    command_timeout: Duration,
}

impl MotorAxis {
    /// Create an uncalibrated axis at step 0.
    pub fn new(
        name: impl Into<String>,
        channel: SharedChannel,
        bounds: StepBounds,
        command_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            channel,
            bounds,
            step: 0,
            zeroed: false,
            command_timeout,
        }
    }

    /// Axis token used on the wire.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current absolute step.
    pub fn step(&self) -> i64 {
        self.step
    }

    /// True once a zero-find has succeeded.
    pub fn is_zeroed(&self) -> bool {
        self.zeroed
    }

    /// Step limits.
    pub fn bounds(&self) -> StepBounds {
        self.bounds
    }

    /// Move to an absolute step.
    ///
    /// Out-of-bounds targets fail with [`DaqError::Range`] before anything is
    /// written. The step is only updated once the device answers `MOVE,DONE`.
    #[instrument(skip(self), fields(axis = %self.name, from = self.step), err)]
    pub async fn move_to(&mut self, target: i64) -> AppResult<()> {
        self.bounds.check(&self.name, target)?;

        let command = Command::Move {
            axis: self.name.clone(),
            steps: target.abs_diff(self.step),
            direction: Direction::between(self.step, target),
        };
        {
            let mut channel = self.channel.lock().await;
            protocol::transact(&mut channel, &command, self.command_timeout).await?;
        }

        self.step = target;
        tracing::debug!(axis = %self.name, step = target, "Move complete");
        Ok(())
    }

    /// Find the limit switch and reset the step to 0.
    #[instrument(skip(self), fields(axis = %self.name), err)]
    pub async fn zero(&mut self) -> AppResult<()> {
        let command = Command::Zero {
            axis: self.name.clone(),
        };
        {
            let mut channel = self.channel.lock().await;
            protocol::transact(&mut channel, &command, self.command_timeout).await?;
        }

        self.step = 0;
        self.zeroed = true;
        tracing::info!(axis = %self.name, "Zero found");
        Ok(())
    }
}

impl std::fmt::Debug for MotorAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotorAxis")
            .field("name", &self.name)
            .field("bounds", &self.bounds)
            .field("step", &self.step)
            .field("zeroed", &self.zeroed)
            .finish_non_exhaustive()
    }
}
