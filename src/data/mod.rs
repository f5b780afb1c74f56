//! Persistence of scan results.
pub mod storage;

pub use storage::{CsvWriter, StorageWriter};
