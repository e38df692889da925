#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Validation and reporting of patrol-hour allocations.
//!
//! [`validate_and_format`] re-checks a solver result against the floor, cap,
//! and budget independently of how it was computed and turns it into rows
//! sorted by unit code. The [`writer`] module persists those rows as CSV
//! (overwriting, or appending under a run identifier) and writes a JSON
//! summary.

pub mod writer;

use thiserror::Error;
use ward_patrol_allocation_models::{
    Allocation, AllocationParams, AllocationSummary, ParamsError, RiskScores, UnitCode, UnitHours,
};

pub use ward_patrol_allocation_models::EPSILON;

pub use writer::{
    OutputMode, write_allocations, write_allocations_file, write_period_allocations,
    write_period_allocations_file, write_summary_file, write_summary_json,
};

/// An allocation invariant that does not hold.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstraintViolation {
    /// A unit received NaN or infinite hours.
    #[error("unit {unit} has non-finite hours {hours}")]
    NonFinite {
        /// The offending unit.
        unit: UnitCode,
        /// Its hours.
        hours: f64,
    },

    /// A unit received less than the floor.
    #[error("unit {unit} has {hours} hours, below the floor of {floor}")]
    BelowFloor {
        /// The offending unit.
        unit: UnitCode,
        /// Its hours.
        hours: f64,
        /// The configured floor.
        floor: f64,
    },

    /// A unit received more than the cap.
    #[error("unit {unit} has {hours} hours, above the cap of {cap}")]
    AboveCap {
        /// The offending unit.
        unit: UnitCode,
        /// Its hours.
        hours: f64,
        /// The configured cap.
        cap: f64,
    },

    /// The allocation spends more than the budget.
    #[error("allocated {total} hours, exceeding the budget of {budget}")]
    OverBudget {
        /// Total allocated hours.
        total: f64,
        /// The budget.
        budget: f64,
    },

    /// Budget was left unused although a unit could still take more hours.
    #[error("allocated only {total} of {budget} hours while unit {unit} is below the cap")]
    UnusedBudget {
        /// Total allocated hours.
        total: f64,
        /// The budget.
        budget: f64,
        /// A unit still below its cap.
        unit: UnitCode,
    },
}

/// Errors that can occur while validating or writing a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The allocation breaks an invariant. Never corrected silently.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(#[from] ConstraintViolation),

    /// Budget, floor, or cap is out of range.
    #[error("Invalid allocation parameters: {0}")]
    InvalidParameters(#[from] ParamsError),

    /// Writing CSV failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Writing JSON failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Checks `allocation` against `params` and returns rows sorted by unit
/// code.
///
/// # Errors
///
/// Returns [`ReportError::ConstraintViolation`] for the first broken
/// invariant, or [`ReportError::InvalidParameters`] if `params` itself is
/// invalid.
pub fn validate_and_format(
    allocation: &UnitHours,
    params: &AllocationParams,
) -> Result<Vec<Allocation>, ReportError> {
    params.validate()?;

    for (unit, &hours) in allocation {
        if !hours.is_finite() {
            return Err(ConstraintViolation::NonFinite {
                unit: unit.clone(),
                hours,
            }
            .into());
        }
        if hours < params.floor - EPSILON {
            return Err(ConstraintViolation::BelowFloor {
                unit: unit.clone(),
                hours,
                floor: params.floor,
            }
            .into());
        }
        if hours > params.cap + EPSILON {
            return Err(ConstraintViolation::AboveCap {
                unit: unit.clone(),
                hours,
                cap: params.cap,
            }
            .into());
        }
    }

    let total: f64 = allocation.values().sum();
    if total > params.total_budget + EPSILON {
        return Err(ConstraintViolation::OverBudget {
            total,
            budget: params.total_budget,
        }
        .into());
    }

    if total < params.total_budget - EPSILON
        && let Some((unit, _)) = allocation
            .iter()
            .find(|(_, hours)| **hours < params.cap - EPSILON)
    {
        return Err(ConstraintViolation::UnusedBudget {
            total,
            budget: params.total_budget,
            unit: unit.clone(),
        }
        .into());
    }

    // BTreeMap iteration is already ordered by unit code.
    Ok(allocation
        .iter()
        .map(|(unit, hours)| Allocation {
            unit_code: unit.clone(),
            allocated_hours: *hours,
        })
        .collect())
}

/// Computes run totals for validated rows.
#[must_use]
pub fn summarize(
    rows: &[Allocation],
    risk: &RiskScores,
    params: &AllocationParams,
) -> AllocationSummary {
    let total_allocated: f64 = rows.iter().map(|r| r.allocated_hours).sum();
    let objective = rows
        .iter()
        .map(|r| risk.get(&r.unit_code).copied().unwrap_or(0.0) * r.allocated_hours)
        .sum();

    AllocationSummary {
        units: rows.len(),
        total_budget: params.total_budget,
        total_allocated,
        unused_budget: (params.total_budget - total_allocated).max(0.0),
        objective,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(pairs: &[(&str, f64)]) -> UnitHours {
        pairs
            .iter()
            .map(|(code, h)| (UnitCode::new(code), *h))
            .collect()
    }

    fn params() -> AllocationParams {
        AllocationParams::new(130.0, 10.0, 100.0)
    }

    #[test]
    fn formats_valid_allocation_sorted_by_code() {
        let rows =
            validate_and_format(&hours(&[("C", 10.0), ("A", 100.0), ("B", 20.0)]), &params())
                .unwrap();

        let codes: Vec<&str> = rows.iter().map(|r| r.unit_code.as_str()).collect();
        assert_eq!(codes, ["A", "B", "C"]);
        assert!((rows[1].allocated_hours - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tolerates_drift_within_epsilon() {
        let drifted = hours(&[("A", 100.000_000_1), ("B", 20.0), ("C", 9.999_999_9)]);
        assert!(validate_and_format(&drifted, &params()).is_ok());
    }

    #[test]
    fn rejects_hours_below_floor() {
        let err = validate_and_format(&hours(&[("A", 100.0), ("B", 10.0), ("C", 5.0)]), &params())
            .unwrap_err();
        assert!(matches!(
            err,
            ReportError::ConstraintViolation(ConstraintViolation::BelowFloor { .. })
        ));
    }

    #[test]
    fn rejects_hours_above_cap() {
        let err = validate_and_format(&hours(&[("A", 110.0), ("B", 10.0), ("C", 10.0)]), &params())
            .unwrap_err();
        assert!(matches!(
            err,
            ReportError::ConstraintViolation(ConstraintViolation::AboveCap { .. })
        ));
    }

    #[test]
    fn rejects_over_budget() {
        let err = validate_and_format(&hours(&[("A", 100.0), ("B", 30.0), ("C", 10.0)]), &params())
            .unwrap_err();
        assert!(matches!(
            err,
            ReportError::ConstraintViolation(ConstraintViolation::OverBudget { .. })
        ));
    }

    #[test]
    fn rejects_unused_budget_below_cap() {
        let err = validate_and_format(&hours(&[("A", 100.0), ("B", 10.0), ("C", 10.0)]), &params())
            .unwrap_err();
        assert!(matches!(
            err,
            ReportError::ConstraintViolation(ConstraintViolation::UnusedBudget { ref unit, .. })
                if unit.as_str() == "B"
        ));
    }

    #[test]
    fn accepts_unused_budget_when_every_unit_is_capped() {
        let generous = AllocationParams::new(1_000.0, 10.0, 100.0);
        let rows =
            validate_and_format(&hours(&[("A", 100.0), ("B", 100.0)]), &generous).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn rejects_non_finite_hours() {
        let err = validate_and_format(&hours(&[("A", f64::NAN)]), &params()).unwrap_err();
        assert!(matches!(
            err,
            ReportError::ConstraintViolation(ConstraintViolation::NonFinite { .. })
        ));
    }

    #[test]
    fn summarizes_totals_and_objective() {
        let rows =
            validate_and_format(&hours(&[("A", 100.0), ("B", 20.0), ("C", 10.0)]), &params())
                .unwrap();
        let risk: RiskScores = [("A", 10.0), ("B", 5.0), ("C", 0.0)]
            .iter()
            .map(|(c, r)| (UnitCode::new(c), *r))
            .collect();

        let summary = summarize(&rows, &risk, &params());

        assert_eq!(summary.units, 3);
        assert!((summary.total_allocated - 130.0).abs() < EPSILON);
        assert!(summary.unused_budget.abs() < EPSILON);
        assert!((summary.objective - 1100.0).abs() < EPSILON);
    }
}
