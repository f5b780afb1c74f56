//! Signal acquisition seam used by the scan engine.
//!
//! The spectrometer has no detector driver yet; [`PlaceholderDetector`] stands
//! in for one. It waits out the integration time and returns a fixed-formula
//! value so the scan pipeline can be exercised end to end.

use crate::error::AppResult;
use crate::measurement::IntegrationTime;
use async_trait::async_trait;

/// Fixed numerator of the placeholder signal formula.
pub const PLACEHOLDER_COUNTS: f64 = 32.0;

/// Capability: measured and reference signal acquisition.
///
/// # Contract
/// - `measure` blocks for the full integration time before returning
/// - `reference` returns the reference channel reading for the same step
#[async_trait]
pub trait SignalSource: Send {
    /// Acquire the measured signal over `integration`.
    async fn measure(&mut self, integration: IntegrationTime) -> AppResult<f64>;

    /// Acquire the reference signal.
    async fn reference(&mut self) -> AppResult<f64>;
}

/// Stand-in detector: `32 / t` after sleeping `t` seconds, reference `32`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderDetector;

#[async_trait]
impl SignalSource for PlaceholderDetector {
    async fn measure(&mut self, integration: IntegrationTime) -> AppResult<f64> {
        tokio::time::sleep(integration.as_duration()).await;
        Ok(PLACEHOLDER_COUNTS / integration.as_secs_f64())
    }

    async fn reference(&mut self) -> AppResult<f64> {
        Ok(PLACEHOLDER_COUNTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test]
    async fn placeholder_waits_out_integration_time() {
        let mut detector = PlaceholderDetector;
        let integration = IntegrationTime::from_millis(125.0).unwrap();

        let started = Instant::now();
        let measured = detector.measure(integration).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(125));
        assert_eq!(measured, 256.0);
        assert_eq!(detector.reference().await.unwrap(), 32.0);
    }
}
