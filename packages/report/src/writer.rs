//! CSV and JSON persistence of allocation rows.
//!
//! In [`OutputMode::Overwrite`] the table holds the latest run only. In
//! [`OutputMode::Append`] every row is stamped with a run identifier and
//! the header is written only when the file is new or empty, so repeated
//! runs accumulate in one table.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use ward_patrol_allocation_models::{
    Allocation, AllocationSummary, Period, PeriodAllocation, UnitCode,
};

use crate::ReportError;

/// How rows are persisted relative to earlier runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Replace the table with this run's rows.
    #[default]
    Overwrite,
    /// Append this run's rows, each stamped with `run_id`.
    Append {
        /// Identifier of the run (usually the latest period).
        run_id: String,
    },
}

#[derive(Serialize)]
struct StampedAllocation<'a> {
    run_id: &'a str,
    unit_code: &'a UnitCode,
    allocated_hours: f64,
}

#[derive(Serialize)]
struct StampedPeriodAllocation<'a> {
    run_id: &'a str,
    unit_code: &'a UnitCode,
    period: &'a Period,
    allocated_hours: f64,
}

fn csv_writer<W: Write>(writer: W, has_headers: bool) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(has_headers)
        .from_writer(writer)
}

/// Writes allocation rows as CSV.
///
/// `has_headers` controls whether a header line is emitted before the
/// first row.
///
/// # Errors
///
/// Returns [`ReportError`] if serialization or the underlying write fails.
pub fn write_allocations<W: Write>(
    rows: &[Allocation],
    writer: W,
    mode: &OutputMode,
    has_headers: bool,
) -> Result<(), ReportError> {
    let mut csv = csv_writer(writer, has_headers);

    match mode {
        OutputMode::Overwrite => {
            for row in rows {
                csv.serialize(row)?;
            }
        }
        OutputMode::Append { run_id } => {
            for row in rows {
                csv.serialize(StampedAllocation {
                    run_id,
                    unit_code: &row.unit_code,
                    allocated_hours: row.allocated_hours,
                })?;
            }
        }
    }

    csv.flush()?;
    Ok(())
}

/// Writes per-period allocation rows as CSV.
///
/// # Errors
///
/// Returns [`ReportError`] if serialization or the underlying write fails.
pub fn write_period_allocations<W: Write>(
    rows: &[PeriodAllocation],
    writer: W,
    mode: &OutputMode,
    has_headers: bool,
) -> Result<(), ReportError> {
    let mut csv = csv_writer(writer, has_headers);

    match mode {
        OutputMode::Overwrite => {
            for row in rows {
                csv.serialize(row)?;
            }
        }
        OutputMode::Append { run_id } => {
            for row in rows {
                csv.serialize(StampedPeriodAllocation {
                    run_id,
                    unit_code: &row.unit_code,
                    period: &row.period,
                    allocated_hours: row.allocated_hours,
                })?;
            }
        }
    }

    csv.flush()?;
    Ok(())
}

/// Creates the parent directory of `path` if it does not exist yet.
fn ensure_parent_dir(path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Opens `path` for the given mode, returning the file and whether a header
/// should be written.
fn open_table(path: &Path, mode: &OutputMode) -> Result<(std::fs::File, bool), ReportError> {
    ensure_parent_dir(path)?;

    match mode {
        OutputMode::Overwrite => Ok((std::fs::File::create(path)?, true)),
        OutputMode::Append { .. } => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let is_empty = file.metadata()?.len() == 0;
            Ok((file, is_empty))
        }
    }
}

/// Writes allocation rows to a CSV file.
///
/// # Errors
///
/// Returns [`ReportError`] if the file cannot be opened or written.
pub fn write_allocations_file(
    rows: &[Allocation],
    path: &Path,
    mode: &OutputMode,
) -> Result<(), ReportError> {
    let (file, has_headers) = open_table(path, mode)?;
    write_allocations(rows, file, mode, has_headers)?;
    log::info!("Wrote {} allocation rows to {}", rows.len(), path.display());
    Ok(())
}

/// Writes per-period allocation rows to a CSV file.
///
/// # Errors
///
/// Returns [`ReportError`] if the file cannot be opened or written.
pub fn write_period_allocations_file(
    rows: &[PeriodAllocation],
    path: &Path,
    mode: &OutputMode,
) -> Result<(), ReportError> {
    let (file, has_headers) = open_table(path, mode)?;
    write_period_allocations(rows, file, mode, has_headers)?;
    log::info!(
        "Wrote {} period allocation rows to {}",
        rows.len(),
        path.display()
    );
    Ok(())
}

/// Writes a run summary as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`ReportError`] if serialization or the underlying write fails.
pub fn write_summary_json<W: Write>(
    summary: &AllocationSummary,
    mut writer: W,
) -> Result<(), ReportError> {
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Writes a run summary to a JSON file, creating missing parent
/// directories.
///
/// # Errors
///
/// Returns [`ReportError`] if the file cannot be created or written.
pub fn write_summary_file(summary: &AllocationSummary, path: &Path) -> Result<(), ReportError> {
    ensure_parent_dir(path)?;
    let file = std::fs::File::create(path)?;
    write_summary_json(summary, file)?;
    log::info!("Wrote summary to {}", path.display());
    Ok(())
}
