#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk-weighted allocation of patrol hours across wards.
//!
//! [`solve`] distributes a total budget of hours so that the sum of
//! `risk * hours` is maximised while every ward stays between a floor and a
//! cap. [`split_across_periods`] then spreads a ward's hours over the
//! periods of its forecast in proportion to the predicted risk.

pub mod solver;
pub mod split;

use thiserror::Error;
use ward_patrol_allocation_models::{ParamsError, UnitCode};

pub use solver::{objective, solve};
pub use split::{split_across_periods, uniform_hours};

/// Errors that can occur while allocating hours.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Budget, floor, or cap is out of range.
    #[error("Invalid allocation parameters: {0}")]
    InvalidParameters(#[from] ParamsError),

    /// A unit's risk score is negative or not finite.
    #[error("Invalid risk score {risk} for unit {unit}")]
    InvalidRisk {
        /// The offending unit.
        unit: UnitCode,
        /// The offending score.
        risk: f64,
    },

    /// The budget cannot cover the floor of every unit.
    #[error(
        "Infeasible allocation: flooring {units} units requires {required} hours but only {available} are available"
    )]
    Infeasible {
        /// `floor * units`.
        required: f64,
        /// The total budget.
        available: f64,
        /// Number of units to allocate.
        units: usize,
    },

    /// A unit has per-period risk but no hours to split.
    #[error("No hours available to split for unit {unit}")]
    MissingUnitHours {
        /// The unit without hours.
        unit: UnitCode,
    },
}
