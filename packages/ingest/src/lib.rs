#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CSV ingestion for the allocation pipeline.
//!
//! Reads per-unit risk time series (observed counts or forecaster output)
//! into [`RiskRecord`](ward_patrol_allocation_models::RiskRecord)s and
//! fine-to-coarse lookup tables into a
//! [`Containment`](ward_patrol_aggregate::Containment). Column names are
//! configurable so the tool can read the exports of other scripts without
//! renaming.

pub mod lookup;
pub mod records;

use thiserror::Error;
use ward_patrol_aggregate::AggregateError;

pub use lookup::{ContainmentColumns, read_containment, read_containment_file, write_containment};
pub use records::{RecordColumns, read_records, read_records_file};

/// Errors that can occur while reading or writing tables.
#[derive(Debug, Error)]
pub enum IngestError {
    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is absent from the header.
    #[error("Missing column '{column}' (found: {found})")]
    MissingColumn {
        /// The column that was expected.
        column: String,
        /// The header that was found, comma-separated.
        found: String,
    },

    /// A count cell is not a non-negative finite number.
    #[error("Invalid count '{value}' on line {line}")]
    InvalidCount {
        /// 1-based line number in the CSV.
        line: u64,
        /// The offending cell.
        value: String,
    },

    /// The lookup table does not form a valid containment.
    #[error("Containment error: {0}")]
    Containment(#[from] AggregateError),
}

/// Finds the index of `column` in `headers`.
fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, IngestError> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| IngestError::MissingColumn {
            column: column.to_string(),
            found: headers.iter().collect::<Vec<_>>().join(","),
        })
}
