//! Ganged slit-width actuators used for resolution control.
//!
//! A bank of N slits (`SLIT1` .. `SLITn`) is always commanded as one: every
//! element receives the same relative move, one after another, each waiting for
//! its own `MOVE,DONE`. A failure part-way through leaves earlier elements where
//! they went. The bank then refuses further moves until it has been zeroed again.

use super::axis::{MotorAxis, StepBounds};
use super::kinematics::KinematicModel;
use super::serial::SharedChannel;
use crate::error::{AppResult, DaqError};
use crate::measurement::Wavelength;
use std::time::Duration;
use tracing::instrument;

/// N jointly commanded slit elements sharing one linear model.
#[derive(Debug)]
pub struct SlitBank {
    elements: Vec<MotorAxis>,
    model: KinematicModel,
    bounds: StepBounds,
    step: i64,
    /// Set after a partial move: number of elements that completed it.
    diverged: Option<usize>,
}

impl SlitBank {
    /// Build a bank of `count` elements on a shared channel.
    pub fn new(
        count: usize,
        model: KinematicModel,
        bounds: StepBounds,
        channel: SharedChannel,
        command_timeout: Duration,
    ) -> AppResult<Self> {
        if count == 0 {
            return Err(DaqError::Configuration(
                "slit bank needs at least one element".into(),
            ));
        }
        let elements = (1..=count)
            .map(|i| {
                MotorAxis::new(
                    format!("SLIT{i}"),
                    channel.clone(),
                    bounds,
                    command_timeout,
                )
            })
            .collect();

        Ok(Self {
            elements,
            model,
            bounds,
            step: 0,
            diverged: None,
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Always false: a bank has at least one element.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Shared step of all elements.
    pub fn step(&self) -> i64 {
        self.step
    }

    /// Step limits shared by all elements.
    pub fn bounds(&self) -> StepBounds {
        self.bounds
    }

    /// True after a partial move, until the next successful zero.
    pub fn is_diverged(&self) -> bool {
        self.diverged.is_some()
    }

    /// Current slit value from the forward model.
    pub fn value(&self) -> Wavelength {
        self.model.wavelength_at(self.step)
    }

    /// Slit values at the lower and upper step bounds.
    pub fn resolution_limits(&self) -> (Wavelength, Wavelength) {
        self.model.limits(self.bounds)
    }

    /// Move every element to the step that yields `width`.
    #[instrument(skip(self), fields(elements = self.elements.len()), err)]
    pub async fn move_to_value(&mut self, width: f64) -> AppResult<()> {
        let target = self.model.step_for(Wavelength::new(width))?;
        self.move_all(target).await
    }

    /// Move every element to `percentage` of the step range (0 to 100).
    #[instrument(skip(self), fields(elements = self.elements.len()), err)]
    pub async fn move_to_percentage(&mut self, percentage: f64) -> AppResult<()> {
        if !(0.0..=100.0).contains(&percentage) {
            return Err(DaqError::Configuration(format!(
                "slit percentage must be between 0 and 100, got {percentage}"
            )));
        }
        let span = (self.bounds.max - self.bounds.min) as f64;
        // Truncate the sum toward zero, not just the offset from min.
        let target = (self.bounds.min as f64 + span * percentage / 100.0).trunc() as i64;
        self.move_all(target).await
    }

    /// Zero every element in order, then reset the shared step.
    #[instrument(skip(self), fields(elements = self.elements.len()), err)]
    pub async fn zero(&mut self) -> AppResult<()> {
        for (done, element) in self.elements.iter_mut().enumerate() {
            if let Err(e) = element.zero().await {
                if done > 0 {
                    self.diverged = Some(done);
                }
                return Err(e);
            }
        }
        self.step = 0;
        self.diverged = None;
        Ok(())
    }

    async fn move_all(&mut self, target: i64) -> AppResult<()> {
        if let Some(moved) = self.diverged {
            return Err(DaqError::SlitBankDiverged {
                moved,
                total: self.elements.len(),
            });
        }
        self.bounds.check("slit bank", target)?;

        for (done, element) in self.elements.iter_mut().enumerate() {
            if let Err(e) = element.move_to(target).await {
                if done > 0 {
                    tracing::warn!(
                        moved = done,
                        total = self.elements.len(),
                        "Slit bank move failed part-way; elements are no longer aligned"
                    );
                    self.diverged = Some(done);
                }
                return Err(e);
            }
        }

        self.step = target;
        tracing::info!(step = target, value = %self.value(), "Slit bank moved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock_serial::{self, MockDeviceHarness};
    use crate::hardware::serial::CommandChannel;

    fn bank(count: usize) -> (SlitBank, MockDeviceHarness) {
        let (port, harness) = mock_serial::new();
        let channel = CommandChannel::new(Box::new(port), Duration::from_millis(5)).into_shared();
        let bank = SlitBank::new(
            count,
            KinematicModel::linear(0.0, 0.01).unwrap(),
            StepBounds::new(-1000, 10_000).unwrap(),
            channel,
            Duration::from_secs(1),
        )
        .unwrap();
        (bank, harness)
    }

    #[tokio::test]
    async fn elements_are_moved_in_order_with_identical_commands() {
        let (mut bank, harness) = bank(3);
        let responder = harness.spawn_responder(mock_serial::well_behaved);

        bank.move_to_value(1.5).await.unwrap();

        assert_eq!(
            responder.commands(),
            vec!["MOVE,SLIT1,150,True", "MOVE,SLIT2,150,True", "MOVE,SLIT3,150,True"]
        );
        assert_eq!(bank.step(), 150);
        assert!((bank.value().nm() - 1.5).abs() < 1e-12);
        responder.stop();
    }

    #[tokio::test]
    async fn partial_failure_leaves_bank_diverged_until_zeroed() {
        let (mut bank, mut harness) = bank(3);
        let device = tokio::spawn(async move {
            harness.expect_and_respond("MOVE,SLIT1,100,True", "MOVE,DONE").await;
            harness.expect_and_respond("MOVE,SLIT2,100,True", "ERROR,JAMMED").await;
            // No rollback and no command to SLIT3: the next line is the zero.
            harness.expect_and_respond("ZERO,SLIT1", "ZERO,DONE").await;
            harness.expect_and_respond("ZERO,SLIT2", "ZERO,DONE").await;
            harness.expect_and_respond("ZERO,SLIT3", "ZERO,DONE").await;
            harness
        });

        assert!(bank.move_to_value(1.0).await.is_err());
        assert!(bank.is_diverged());
        assert_eq!(bank.step(), 0);

        let err = bank.move_to_value(1.0).await.unwrap_err();
        assert!(matches!(
            err,
            DaqError::SlitBankDiverged { moved: 1, total: 3 }
        ));

        bank.zero().await.unwrap();
        assert!(!bank.is_diverged());
        device.await.unwrap();
    }

    #[tokio::test]
    async fn percentage_maps_onto_step_range() {
        let (mut bank, harness) = bank(2);
        let responder = harness.spawn_responder(mock_serial::well_behaved);

        bank.move_to_percentage(50.0).await.unwrap();
        assert_eq!(bank.step(), 4500);
        bank.move_to_percentage(0.0).await.unwrap();
        assert_eq!(bank.step(), -1000);

        assert_eq!(
            responder.commands(),
            vec![
                "MOVE,SLIT1,4500,True",
                "MOVE,SLIT2,4500,True",
                "MOVE,SLIT1,5500,False",
                "MOVE,SLIT2,5500,False",
            ]
        );
        responder.stop();
    }

    #[tokio::test]
    async fn fractional_percentage_truncates_toward_zero() {
        let (mut bank, harness) = bank(1);
        let responder = harness.spawn_responder(mock_serial::well_behaved);

        // -1000 + 11000 * 0.0005 = -994.5
        bank.move_to_percentage(0.05).await.unwrap();
        assert_eq!(bank.step(), -994);

        // -1000 + 11000 * 0.3333 = 2666.3
        bank.move_to_percentage(33.33).await.unwrap();
        assert_eq!(bank.step(), 2666);

        assert_eq!(
            responder.commands(),
            vec!["MOVE,SLIT1,994,False", "MOVE,SLIT1,3660,True"]
        );
        responder.stop();
    }

    #[tokio::test]
    async fn invalid_targets_write_nothing() {
        let (mut bank, mut harness) = bank(2);

        assert!(matches!(
            bank.move_to_percentage(101.0).await,
            Err(DaqError::Configuration(_))
        ));
        assert!(matches!(
            bank.move_to_value(500.0).await,
            Err(DaqError::Range { .. })
        ));
        assert!(harness.is_silent(Duration::from_millis(50)).await);
    }

    #[test]
    fn empty_bank_is_rejected() {
        let (port, _harness) = mock_serial::new();
        let channel = CommandChannel::new(Box::new(port), Duration::from_millis(5)).into_shared();
        let result = SlitBank::new(
            0,
            KinematicModel::linear(0.0, 1.0).unwrap(),
            StepBounds::default(),
            channel,
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }
}
