#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data model for ward risk records and patrol-hour allocations.
//!
//! Every stage of the allocation pipeline (aggregation, solving, reporting)
//! speaks in terms of the types defined here. Unit codes and periods are
//! ordered string newtypes so that every map keyed by them iterates in a
//! deterministic order.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Minimum hours every ward receives when no floor is configured.
pub const DEFAULT_FLOOR_HOURS: f64 = 100.0;

/// Maximum hours any single ward may receive when no cap is configured.
pub const DEFAULT_CAP_HOURS: f64 = 800.0;

/// Fraction of the all-wards-at-cap total used as the budget by default.
pub const DEFAULT_BUDGET_CAP_FRACTION: f64 = 0.75;

/// Hours per ward per month used by the per-period split (800 weekly x 4).
pub const DEFAULT_MONTHLY_HOURS: f64 = 3200.0;

/// Numeric tolerance for comparing hours against the floor, cap, and budget.
pub const EPSILON: f64 = 1e-6;

/// Stable identifier of a ward, LSOA, or other spatial unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitCode(String);

impl UnitCode {
    /// Creates a unit code, trimming surrounding whitespace.
    #[must_use]
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_string())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UnitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UnitCode {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A discrete time bucket, usually a calendar month formatted `YYYY-MM`.
///
/// Periods compare lexicographically, which is chronological for ISO
/// formatted buckets (`2024`, `2024-03`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(String);

impl Period {
    /// Normalizes a raw period value.
    ///
    /// Full dates (`2024-03-15`) and datetimes (`2024-03-15T10:00:00`) are
    /// bucketed to their calendar month (`2024-03`). Anything else is kept
    /// verbatim after trimming.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let raw = raw.trim();

        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            return Self(dt.format("%Y-%m").to_string());
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Self(date.format("%Y-%m").to_string());
        }

        Self(raw.to_string())
    }

    /// Returns the period as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Period {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::normalize(s))
    }
}

impl From<&str> for Period {
    fn from(value: &str) -> Self {
        Self::normalize(value)
    }
}

/// A single risk observation: the incident count of one unit in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    /// Unit the observation belongs to.
    pub unit_code: UnitCode,
    /// Time bucket of the observation.
    pub period: Period,
    /// Incident count (observed or predicted). Non-negative and finite.
    pub count: f64,
}

impl RiskRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(unit_code: impl Into<UnitCode>, period: impl Into<Period>, count: f64) -> Self {
        Self {
            unit_code: unit_code.into(),
            period: period.into(),
            count,
        }
    }
}

/// Aggregated risk score per unit.
pub type RiskScores = BTreeMap<UnitCode, f64>;

/// Hours allocated per unit, as produced by the solver.
pub type UnitHours = BTreeMap<UnitCode, f64>;

/// Errors raised when allocation parameters are out of range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamsError {
    /// A parameter was NaN or infinite.
    #[error("{name} must be finite (got {value})")]
    NonFinite {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A parameter that must be non-negative was negative.
    #[error("{name} must be non-negative (got {value})")]
    Negative {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// The per-unit cap is below the per-unit floor.
    #[error("cap ({cap}) must be at least the floor ({floor})")]
    CapBelowFloor {
        /// Configured floor.
        floor: f64,
        /// Configured cap.
        cap: f64,
    },
}

/// Budget, floor, and cap of one allocation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationParams {
    /// Total hours available across all units.
    pub total_budget: f64,
    /// Minimum hours guaranteed to every unit.
    pub floor: f64,
    /// Maximum hours any single unit may receive.
    pub cap: f64,
}

impl AllocationParams {
    /// Creates a parameter set. Call [`Self::validate`] before use.
    #[must_use]
    pub const fn new(total_budget: f64, floor: f64, cap: f64) -> Self {
        Self {
            total_budget,
            floor,
            cap,
        }
    }

    /// Checks that every parameter is finite, non-negative, and that
    /// `cap >= floor`.
    ///
    /// # Errors
    ///
    /// Returns [`ParamsError`] describing the first offending parameter.
    pub fn validate(&self) -> Result<(), ParamsError> {
        for (name, value) in [
            ("total_budget", self.total_budget),
            ("floor", self.floor),
            ("cap", self.cap),
        ] {
            if !value.is_finite() {
                return Err(ParamsError::NonFinite { name, value });
            }
            if value < 0.0 {
                return Err(ParamsError::Negative { name, value });
            }
        }

        if self.cap < self.floor {
            return Err(ParamsError::CapBelowFloor {
                floor: self.floor,
                cap: self.cap,
            });
        }

        Ok(())
    }
}

/// How the total budget of a run is determined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetSpec {
    /// An absolute number of hours.
    Hours(f64),
    /// A fraction of `units * cap`, i.e. of the budget that would put every
    /// unit at its cap.
    CapFraction(f64),
}

impl Default for BudgetSpec {
    fn default() -> Self {
        Self::CapFraction(DEFAULT_BUDGET_CAP_FRACTION)
    }
}

impl BudgetSpec {
    /// Resolves the budget to a number of hours for `units` units.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn resolve(self, units: usize, cap: f64) -> f64 {
        match self {
            Self::Hours(hours) => hours,
            Self::CapFraction(fraction) => fraction * units as f64 * cap,
        }
    }
}

/// One output row: the hours allocated to a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Unit receiving the hours.
    pub unit_code: UnitCode,
    /// Allocated patrol hours (may be fractional).
    pub allocated_hours: f64,
}

/// One per-period output row: the hours allocated to a unit in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAllocation {
    /// Unit receiving the hours.
    pub unit_code: UnitCode,
    /// Period the hours apply to.
    pub period: Period,
    /// Allocated patrol hours (may be fractional).
    pub allocated_hours: f64,
}

/// Totals describing a completed allocation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSummary {
    /// Number of units allocated.
    pub units: usize,
    /// Budget available to the run.
    pub total_budget: f64,
    /// Hours actually allocated.
    pub total_allocated: f64,
    /// `total_budget - total_allocated`, never negative.
    pub unused_budget: f64,
    /// Risk-weighted allocated hours.
    pub objective: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dates_to_month_buckets() {
        assert_eq!(Period::normalize("2024-03-15").as_str(), "2024-03");
        assert_eq!(Period::normalize("2024-03-15T10:30:00").as_str(), "2024-03");
    }

    #[test]
    fn keeps_month_and_year_periods_verbatim() {
        assert_eq!(Period::normalize(" 2024-03 ").as_str(), "2024-03");
        assert_eq!(Period::normalize("2023").as_str(), "2023");
    }

    #[test]
    fn periods_order_chronologically() {
        let mut periods = vec![
            Period::from("2024-02"),
            Period::from("2023-12"),
            Period::from("2024-01"),
        ];
        periods.sort();
        let sorted: Vec<&str> = periods.iter().map(Period::as_str).collect();
        assert_eq!(sorted, ["2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn unit_codes_are_trimmed() {
        assert_eq!(UnitCode::new("  E05000026 ").as_str(), "E05000026");
    }

    #[test]
    fn validates_params() {
        assert!(AllocationParams::new(130.0, 10.0, 100.0).validate().is_ok());
        assert!(AllocationParams::new(130.0, 10.0, 10.0).validate().is_ok());
        assert_eq!(
            AllocationParams::new(130.0, 50.0, 10.0).validate(),
            Err(ParamsError::CapBelowFloor {
                floor: 50.0,
                cap: 10.0
            })
        );
        assert!(matches!(
            AllocationParams::new(-1.0, 0.0, 10.0).validate(),
            Err(ParamsError::Negative {
                name: "total_budget",
                ..
            })
        ));
        assert!(matches!(
            AllocationParams::new(f64::NAN, 0.0, 10.0).validate(),
            Err(ParamsError::NonFinite { .. })
        ));
    }

    #[test]
    fn resolves_budget_specs() {
        assert!((BudgetSpec::Hours(500.0).resolve(10, 800.0) - 500.0).abs() < f64::EPSILON);
        assert!((BudgetSpec::default().resolve(4, 800.0) - 2400.0).abs() < f64::EPSILON);
    }
}
