//! Sequential execution of a scan plan.

use super::detector::SignalSource;
use super::scan::{ScanEngine, ScanSpec};
use crate::data::StorageWriter;
use crate::error::AppResult;
use crate::hardware::monochromator::MonochromatorController;
use std::path::PathBuf;

/// Run `specs` in order, persisting each completed scan.
///
/// Returns the written paths, one per scan, when every scan completes.
/// Stops at the first failing scan and returns its error; files written for
/// earlier scans stay on disk and the failed scan writes nothing.
pub async fn run_plan(
    specs: &[ScanSpec],
    excitation: &mut MonochromatorController,
    emission: &mut MonochromatorController,
    detector: &mut dyn SignalSource,
    writer: &mut dyn StorageWriter,
) -> AppResult<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(specs.len());

    for (index, spec) in specs.iter().enumerate() {
        tracing::info!(
            scan = %spec.name,
            position = index + 1,
            total = specs.len(),
            "Running scan"
        );
        let mut engine = ScanEngine::new(spec.clone(), excitation, emission, detector)?;
        let result = match engine.run().await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    scan = %spec.name,
                    saved = written.len(),
                    error = %e,
                    "Scan plan stopped; earlier results remain saved"
                );
                return Err(e);
            }
        };
        written.push(writer.write(&result).await?);
    }

    Ok(written)
}
