//! Scan result writers.
//!
//! [`CsvWriter`] produces one file per scan, `<dir>/<scan name>.csv`:
//!
//! ```text
//! Date :,2026-03-14,Time :,09:26:53,Name :,Chlorophyll ex
//! Ex Wavelength (nm),Em Wavelength (nm),Measured Signal,Reference Signal
//! 400,680,320,32
//! ...
//! ```
use crate::{error::DaqError, experiment::ScanResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Column header row of every CSV file.
pub const CSV_COLUMNS: [&str; 4] = [
    "Ex Wavelength (nm)",
    "Em Wavelength (nm)",
    "Measured Signal",
    "Reference Signal",
];

/// Destination for completed scan results.
#[async_trait]
pub trait StorageWriter: Send {
    /// Persist `result` and return where it went.
    async fn write(&mut self, result: &ScanResult) -> Result<PathBuf, DaqError>;
}

/// A writer for CSV files.
#[derive(Debug, Clone)]
pub struct CsvWriter {
    dir: PathBuf,
}

impl CsvWriter {
    /// Write into `dir`, created on first write if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that a scan named `name` is written to.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file_name: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        self.dir.join(format!("{file_name}.csv"))
    }
}

#[async_trait]
impl StorageWriter for CsvWriter {
    async fn write(&mut self, result: &ScanResult) -> Result<PathBuf, DaqError> {
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = result;
            return Err(DaqError::FeatureNotEnabled("storage_csv".to_string()));
        }

        #[cfg(feature = "storage_csv")]
        {
            if !self.dir.exists() {
                std::fs::create_dir_all(&self.dir)
                    .map_err(|e| DaqError::Storage(e.to_string()))?;
            }
            let path = self.path_for(&result.name);

            // The title row is wider than the data rows.
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .from_path(&path)
                .map_err(|e| DaqError::Storage(format!("Failed to create CSV file: {e}")))?;

            let date = result.started_at.format("%Y-%m-%d").to_string();
            let time = result.started_at.format("%H:%M:%S").to_string();
            writer
                .write_record([
                    "Date :",
                    date.as_str(),
                    "Time :",
                    time.as_str(),
                    "Name :",
                    result.name.as_str(),
                ])
                .map_err(|e| DaqError::Storage(e.to_string()))?;
            writer
                .write_record(CSV_COLUMNS)
                .map_err(|e| DaqError::Storage(e.to_string()))?;

            for point in &result.points {
                writer
                    .write_record(&[
                        point.excitation_nm.to_string(),
                        point.emission_nm.to_string(),
                        point.measured.to_string(),
                        point.reference.to_string(),
                    ])
                    .map_err(|e| DaqError::Storage(e.to_string()))?;
            }
            writer
                .flush()
                .map_err(|e| DaqError::Storage(e.to_string()))?;

            tracing::info!(path = %path.display(), points = result.len(), "Scan result saved");
            Ok(path)
        }
    }
}
