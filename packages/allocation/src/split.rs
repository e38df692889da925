//! Per-period split of each unit's hours.
//!
//! A unit's hours are spread over its periods in proportion to the risk
//! predicted for each period. A unit whose periods all carry zero risk has
//! its hours split evenly.

use std::collections::BTreeMap;

use ward_patrol_allocation_models::{Period, PeriodAllocation, UnitCode, UnitHours};

use crate::AllocationError;

/// Gives every unit the same number of hours.
#[must_use]
pub fn uniform_hours<'a, I>(units: I, hours: f64) -> UnitHours
where
    I: IntoIterator<Item = &'a UnitCode>,
{
    units.into_iter().map(|u| (u.clone(), hours)).collect()
}

/// Splits each unit's hours across its periods proportionally to risk.
///
/// Rows are returned sorted by unit code, then period. Units without any
/// period produce no rows.
///
/// # Errors
///
/// Returns [`AllocationError::MissingUnitHours`] if a unit has periods but
/// no entry in `unit_hours`.
#[allow(clippy::cast_precision_loss)]
pub fn split_across_periods(
    unit_hours: &UnitHours,
    per_period_risk: &BTreeMap<UnitCode, BTreeMap<Period, f64>>,
) -> Result<Vec<PeriodAllocation>, AllocationError> {
    let mut rows = Vec::new();

    for (unit, periods) in per_period_risk {
        if periods.is_empty() {
            continue;
        }

        let hours = *unit_hours
            .get(unit)
            .ok_or_else(|| AllocationError::MissingUnitHours { unit: unit.clone() })?;
        let total: f64 = periods.values().sum();

        for (period, risk) in periods {
            let allocated_hours = if total > 0.0 {
                hours * (risk / total)
            } else {
                hours / periods.len() as f64
            };

            rows.push(PeriodAllocation {
                unit_code: unit.clone(),
                period: period.clone(),
                allocated_hours,
            });
        }
    }

    log::info!(
        "Split hours of {} units into {} period rows",
        per_period_risk.len(),
        rows.len()
    );

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use ward_patrol_allocation_models::DEFAULT_MONTHLY_HOURS;

    use super::*;

    fn periods(pairs: &[(&str, f64)]) -> BTreeMap<Period, f64> {
        pairs.iter().map(|(p, r)| (Period::from(*p), *r)).collect()
    }

    #[test]
    fn splits_proportionally_to_risk() {
        let unit = UnitCode::new("W1");
        let risk = BTreeMap::from([(
            unit.clone(),
            periods(&[("2024-01", 1.0), ("2024-02", 3.0)]),
        )]);
        let hours = uniform_hours([&unit], DEFAULT_MONTHLY_HOURS);

        let rows = split_across_periods(&hours, &risk).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].period.as_str(), "2024-01");
        assert!((rows[0].allocated_hours - 800.0).abs() < 1e-9);
        assert!((rows[1].allocated_hours - 2400.0).abs() < 1e-9);
    }

    #[test]
    fn zero_risk_units_split_evenly() {
        let unit = UnitCode::new("W1");
        let risk = BTreeMap::from([(
            unit.clone(),
            periods(&[("2024-01", 0.0), ("2024-02", 0.0), ("2024-03", 0.0)]),
        )]);
        let hours = uniform_hours([&unit], 300.0);

        let rows = split_across_periods(&hours, &risk).unwrap();

        assert_eq!(rows.len(), 3);
        for row in rows {
            assert!((row.allocated_hours - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn units_without_periods_produce_no_rows() {
        let risk = BTreeMap::from([(UnitCode::new("W1"), BTreeMap::new())]);
        let rows = split_across_periods(&UnitHours::new(), &risk).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn missing_hours_is_an_error() {
        let risk = BTreeMap::from([(UnitCode::new("W1"), periods(&[("2024-01", 1.0)]))]);
        let err = split_across_periods(&UnitHours::new(), &risk).unwrap_err();
        assert!(matches!(err, AllocationError::MissingUnitHours { .. }));
    }
}
