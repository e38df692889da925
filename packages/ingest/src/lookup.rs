//! Fine-to-coarse lookup tables (e.g. LSOA -> ward).

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use ward_patrol_aggregate::Containment;
use ward_patrol_allocation_models::UnitCode;

use crate::{IngestError, column_index};

/// Column names of a containment lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainmentColumns {
    /// Fine-grained unit column.
    pub fine: String,
    /// Containing coarse unit column.
    pub coarse: String,
}

impl Default for ContainmentColumns {
    fn default() -> Self {
        Self {
            fine: "fine_unit_code".to_string(),
            coarse: "coarse_unit_code".to_string(),
        }
    }
}

/// Reads a containment lookup table from CSV.
///
/// Rows with an empty coarse unit are treated as unmapped and left out, so
/// their fine unit falls under the aggregator's missing-containment policy.
/// Rows with only a coarse unit register a coarse unit without members.
///
/// # Errors
///
/// Returns [`IngestError`] if a column is missing, the CSV is malformed, or
/// a fine unit is mapped to two different coarse units.
pub fn read_containment<R: Read>(
    reader: R,
    columns: &ContainmentColumns,
) -> Result<Containment, IngestError> {
    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = csv.headers()?.clone();
    let fine_idx = column_index(&headers, &columns.fine)?;
    let coarse_idx = column_index(&headers, &columns.coarse)?;

    let mut pairs = Vec::new();
    let mut empty_coarse = Vec::new();
    for row in csv.records() {
        let row = row?;
        let fine = row.get(fine_idx).unwrap_or_default().trim();
        let coarse = row.get(coarse_idx).unwrap_or_default().trim();
        match (fine.is_empty(), coarse.is_empty()) {
            (false, false) => pairs.push((UnitCode::new(fine), UnitCode::new(coarse))),
            (true, false) => empty_coarse.push(UnitCode::new(coarse)),
            _ => {}
        }
    }

    Ok(Containment::from_pairs(pairs)?.with_coarse_units(empty_coarse))
}

/// Reads a containment lookup table from a CSV file.
///
/// # Errors
///
/// Same as [`read_containment`], plus [`IngestError::Io`] if the file cannot
/// be opened.
pub fn read_containment_file(
    path: &Path,
    columns: &ContainmentColumns,
) -> Result<Containment, IngestError> {
    let file = std::fs::File::open(path)?;
    let containment = read_containment(file, columns)?;
    log::info!(
        "Read {} containment pairs into {} coarse units from {}",
        containment.len(),
        containment.coarse_units().len(),
        path.display()
    );
    Ok(containment)
}

/// Writes a containment as a two-column CSV lookup table.
///
/// Coarse units that contain no fine unit are written with an empty fine
/// column so that they survive a round trip.
///
/// # Errors
///
/// Returns [`IngestError`] if writing fails.
pub fn write_containment<W: Write>(
    containment: &Containment,
    writer: W,
    columns: &ContainmentColumns,
) -> Result<(), IngestError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([columns.fine.as_str(), columns.coarse.as_str()])?;

    for (fine, coarse) in containment.pairs() {
        csv.write_record([fine.as_str(), coarse.as_str()])?;
    }

    let mut occupied = std::collections::BTreeSet::new();
    for (_, coarse) in containment.pairs() {
        occupied.insert(coarse);
    }
    for coarse in containment.coarse_units() {
        if !occupied.contains(coarse) {
            csv.write_record(["", coarse.as_str()])?;
        }
    }

    csv.flush()?;
    Ok(())
}
