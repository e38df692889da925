//! Risk time-series tables: one row per unit and period.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use ward_patrol_allocation_models::{Period, RiskRecord, UnitCode};

use crate::{IngestError, column_index};

/// Column names of a risk record table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordColumns {
    /// Unit code column.
    pub unit: String,
    /// Period column. Dates are bucketed to their month.
    pub period: String,
    /// Count column.
    pub count: String,
}

impl Default for RecordColumns {
    fn default() -> Self {
        Self {
            unit: "unit_code".to_string(),
            period: "period".to_string(),
            count: "count".to_string(),
        }
    }
}

/// Parses a count cell. Empty cells count as zero.
fn parse_count(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0.0);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|count| count.is_finite() && *count >= 0.0)
}

/// Reads risk records from CSV.
///
/// Rows with an empty unit code are skipped with a warning.
///
/// # Errors
///
/// Returns [`IngestError::MissingColumn`] if a configured column is absent,
/// [`IngestError::InvalidCount`] for a negative or non-numeric count, or
/// [`IngestError::Csv`] for malformed CSV.
pub fn read_records<R: Read>(
    reader: R,
    columns: &RecordColumns,
) -> Result<Vec<RiskRecord>, IngestError> {
    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = csv.headers()?.clone();
    let unit_idx = column_index(&headers, &columns.unit)?;
    let period_idx = column_index(&headers, &columns.period)?;
    let count_idx = column_index(&headers, &columns.count)?;

    let mut records = Vec::new();
    let mut skipped = 0_u64;

    for row in csv.records() {
        let row = row?;
        let line = row.position().map_or(0, csv::Position::line);

        let unit = row.get(unit_idx).unwrap_or_default().trim();
        if unit.is_empty() {
            skipped += 1;
            continue;
        }

        let raw_count = row.get(count_idx).unwrap_or_default();
        let count = parse_count(raw_count).ok_or_else(|| IngestError::InvalidCount {
            line,
            value: raw_count.to_string(),
        })?;

        records.push(RiskRecord {
            unit_code: UnitCode::new(unit),
            period: Period::normalize(row.get(period_idx).unwrap_or_default()),
            count,
        });
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} rows without a unit code");
    }

    Ok(records)
}

/// Reads risk records from a CSV file.
///
/// # Errors
///
/// Same as [`read_records`], plus [`IngestError::Io`] if the file cannot be
/// opened.
pub fn read_records_file(
    path: &Path,
    columns: &RecordColumns,
) -> Result<Vec<RiskRecord>, IngestError> {
    let file = std::fs::File::open(path)?;
    let records = read_records(file, columns)?;
    log::info!("Read {} risk records from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn burglary_columns() -> RecordColumns {
        RecordColumns {
            unit: "lsoa_code".to_string(),
            period: "year_month".to_string(),
            count: "burglary_count".to_string(),
        }
    }

    #[test]
    fn reads_records_with_default_columns() {
        let csv = "unit_code,period,count\nW1,2024-01,3\nW2,2024-01,0\n";
        let records = read_records(csv.as_bytes(), &RecordColumns::default()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0], RiskRecord::new("W1", "2024-01", 3.0));
    }

    #[test]
    fn reads_renamed_columns_and_ignores_extras() {
        let csv = "lsoa_code,lsoa_name,year_month,burglary_count\n\
                   E01000001,City of London 001A,2024-03-01,2\n\
                   E01000002,City of London 001B,2024-03,1.5\n";
        let records = read_records(csv.as_bytes(), &burglary_columns()).unwrap();

        assert_eq!(records[0].period.as_str(), "2024-03");
        assert_eq!(records[1].period.as_str(), "2024-03");
        assert!((records[1].count - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn reports_missing_columns() {
        let csv = "code,year,count\nW1,2024,3\n";
        let err = read_records(csv.as_bytes(), &RecordColumns::default()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::MissingColumn { ref column, .. } if column == "unit_code"
        ));
    }

    #[test]
    fn rejects_negative_counts() {
        let csv = "unit_code,period,count\nW1,2024-01,3\nW2,2024-01,-1\n";
        let err = read_records(csv.as_bytes(), &RecordColumns::default()).unwrap_err();
        assert!(matches!(err, IngestError::InvalidCount { line: 3, .. }));
    }

    #[test]
    fn rejects_non_numeric_counts() {
        let csv = "unit_code,period,count\nW1,2024-01,many\n";
        let err = read_records(csv.as_bytes(), &RecordColumns::default()).unwrap_err();
        assert!(matches!(err, IngestError::InvalidCount { ref value, .. } if value == "many"));
    }

    #[test]
    fn empty_counts_are_zero_and_blank_units_skipped() {
        let csv = "unit_code,period,count\nW1,2024-01,\n,2024-01,4\n";
        let records = read_records(csv.as_bytes(), &RecordColumns::default()).unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].count.abs() < f64::EPSILON);
    }
}
