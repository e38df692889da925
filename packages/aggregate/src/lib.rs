#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Risk aggregation from per-unit time-series records to one risk score per
//! ward.
//!
//! Records are filtered to a [`Window`] of periods and, for hierarchical
//! inputs, mapped from their fine-grained unit (LSOA) to the containing
//! coarse unit (ward) through a [`Containment`] before their counts are
//! summed. Every eligible unit appears in the output, with a score of zero
//! if it has no records in the window, so the solver never silently skips
//! a ward.

pub mod containment;
pub mod window;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use ward_patrol_allocation_models::{Period, RiskRecord, RiskScores, UnitCode};

pub use containment::Containment;
pub use window::Window;

/// Errors that can occur while aggregating risk.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// A fine-grained unit has no containing coarse unit and the policy is
    /// [`MissingContainmentPolicy::Fail`].
    #[error("Unit {unit} has no containing coarse unit")]
    MissingContainment {
        /// The fine-grained unit without a mapping.
        unit: UnitCode,
    },

    /// A fine-grained unit was mapped to two different coarse units.
    #[error("Unit {unit} is mapped to both {first} and {second}")]
    ConflictingContainment {
        /// The fine-grained unit.
        unit: UnitCode,
        /// The first coarse unit seen.
        first: UnitCode,
        /// The conflicting coarse unit.
        second: UnitCode,
    },
}

/// What to do with records whose unit has no containing coarse unit.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MissingContainmentPolicy {
    /// Drop the record, log a warning, and report the dropped count.
    #[default]
    Drop,
    /// Abort the aggregation with [`AggregateError::MissingContainment`].
    Fail,
}

/// Result of an aggregation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    /// Risk score per coarse unit.
    pub scores: RiskScores,
    /// Number of in-window records dropped for lack of a containing unit.
    pub dropped_records: usize,
    /// Distinct fine units whose records were dropped.
    pub dropped_units: BTreeSet<UnitCode>,
}

/// Per-period risk per coarse unit.
pub type PeriodRisk = BTreeMap<UnitCode, BTreeMap<Period, f64>>;

#[derive(Debug, Clone, Copy)]
enum Mode<'a> {
    Flat,
    Hierarchical {
        containment: &'a Containment,
        policy: MissingContainmentPolicy,
    },
}

#[derive(Debug, Default)]
struct Dropped {
    records: usize,
    units: BTreeSet<UnitCode>,
}

/// Reduces raw risk records to risk scores per unit.
#[derive(Debug, Clone, Copy)]
pub struct RiskAggregator<'a> {
    mode: Mode<'a>,
}

impl RiskAggregator<'static> {
    /// Aggregator for records that are already keyed by the coarse unit.
    ///
    /// Every unit appearing in any record is reported, even if none of its
    /// records fall inside the window.
    #[must_use]
    pub const fn flat() -> Self {
        Self { mode: Mode::Flat }
    }
}

impl<'a> RiskAggregator<'a> {
    /// Aggregator for fine-grained records that are rolled up to their
    /// coarse unit through `containment`.
    ///
    /// Every coarse unit of the containment is reported.
    #[must_use]
    pub const fn hierarchical(
        containment: &'a Containment,
        policy: MissingContainmentPolicy,
    ) -> Self {
        Self {
            mode: Mode::Hierarchical {
                containment,
                policy,
            },
        }
    }

    /// Sums record counts per unit over `window`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::MissingContainment`] if a record's unit has
    /// no coarse unit and the policy is [`MissingContainmentPolicy::Fail`].
    pub fn aggregate(
        &self,
        records: &[RiskRecord],
        window: &Window,
    ) -> Result<Aggregation, AggregateError> {
        let mut scores: RiskScores = self.universe(records).map(|u| (u, 0.0)).collect();

        let dropped = self.visit(records, window, |unit, record| {
            *scores.entry(unit.clone()).or_insert(0.0) += record.count;
        })?;

        log::info!(
            "Aggregated {} records into {} units over {window}",
            records.len(),
            scores.len()
        );

        Ok(Aggregation {
            scores,
            dropped_records: dropped.records,
            dropped_units: dropped.units,
        })
    }

    /// Sums record counts per unit and per period over `window`.
    ///
    /// Only periods with at least one in-window record appear under a unit;
    /// units with no such records map to an empty period set.
    ///
    /// # Errors
    ///
    /// Same as [`Self::aggregate`].
    pub fn aggregate_by_period(
        &self,
        records: &[RiskRecord],
        window: &Window,
    ) -> Result<PeriodRisk, AggregateError> {
        let mut risk: PeriodRisk = self
            .universe(records)
            .map(|u| (u, BTreeMap::new()))
            .collect();

        self.visit(records, window, |unit, record| {
            *risk
                .entry(unit.clone())
                .or_default()
                .entry(record.period.clone())
                .or_insert(0.0) += record.count;
        })?;

        Ok(risk)
    }

    /// Every unit that must appear in the output.
    fn universe<'r>(&'r self, records: &'r [RiskRecord]) -> Box<dyn Iterator<Item = UnitCode> + 'r> {
        match self.mode {
            Mode::Flat => Box::new(
                records
                    .iter()
                    .map(|r| &r.unit_code)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .cloned(),
            ),
            Mode::Hierarchical { containment, .. } => {
                Box::new(containment.coarse_units().iter().cloned())
            }
        }
    }

    /// Calls `f` with the coarse unit of every in-window record.
    fn visit<F>(
        &self,
        records: &[RiskRecord],
        window: &Window,
        mut f: F,
    ) -> Result<Dropped, AggregateError>
    where
        F: FnMut(&UnitCode, &RiskRecord),
    {
        let periods = window.resolve(records);
        let mut dropped = Dropped::default();

        for record in records {
            if let Some(periods) = &periods
                && !periods.contains(&record.period)
            {
                continue;
            }

            match self.mode {
                Mode::Flat => f(&record.unit_code, record),
                Mode::Hierarchical {
                    containment,
                    policy,
                } => match containment.coarse_of(&record.unit_code) {
                    Some(coarse) => f(coarse, record),
                    None => match policy {
                        MissingContainmentPolicy::Fail => {
                            return Err(AggregateError::MissingContainment {
                                unit: record.unit_code.clone(),
                            });
                        }
                        MissingContainmentPolicy::Drop => {
                            if dropped.units.insert(record.unit_code.clone()) {
                                log::warn!(
                                    "Dropping records for {}: no containing unit",
                                    record.unit_code
                                );
                            }
                            dropped.records += 1;
                        }
                    },
                },
            }
        }

        if dropped.records > 0 {
            log::warn!(
                "Dropped {} records from {} units without a containing unit",
                dropped.records,
                dropped.units.len()
            );
        }

        Ok(dropped)
    }
}
