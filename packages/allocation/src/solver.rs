//! Greedy solver for the single-budget allocation linear program.
//!
//! The program
//!
//! ```text
//! maximise   sum_u risk[u] * hours[u]
//! subject to floor <= hours[u] <= cap      for every unit u
//!            sum_u hours[u] <= total_budget
//! ```
//!
//! is separable with a single coupling constraint, so its optimum is
//! reached by flooring every unit and then raising units to their cap in
//! descending order of risk until the budget runs out. Ties in risk are
//! broken by ascending unit code so that the output is reproducible.

use ward_patrol_allocation_models::{AllocationParams, EPSILON, RiskScores, UnitCode, UnitHours};

use crate::AllocationError;

/// Allocates `params.total_budget` hours across the units of `risk`.
///
/// # Errors
///
/// * [`AllocationError::InvalidParameters`] if the parameters are out of
///   range.
/// * [`AllocationError::InvalidRisk`] if a risk score is negative or not
///   finite.
/// * [`AllocationError::Infeasible`] if `floor * units` exceeds
///   `total_budget` by more than [`EPSILON`]. No partial allocation is
///   returned in that case.
#[allow(clippy::cast_precision_loss)]
pub fn solve(risk: &RiskScores, params: &AllocationParams) -> Result<UnitHours, AllocationError> {
    params.validate()?;

    if let Some((unit, &score)) = risk.iter().find(|(_, r)| !r.is_finite() || **r < 0.0) {
        return Err(AllocationError::InvalidRisk {
            unit: unit.clone(),
            risk: score,
        });
    }

    let units = risk.len();
    let required = params.floor * units as f64;
    if required > params.total_budget + EPSILON {
        return Err(AllocationError::Infeasible {
            required,
            available: params.total_budget,
            units,
        });
    }

    let mut hours: UnitHours = risk.keys().map(|u| (u.clone(), params.floor)).collect();
    let headroom = params.cap - params.floor;
    let mut remaining = (params.total_budget - required).max(0.0);

    let mut order: Vec<(&UnitCode, f64)> = risk.iter().map(|(u, r)| (u, *r)).collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    for (unit, score) in order {
        if remaining <= 0.0 {
            break;
        }

        let extra = headroom.min(remaining);
        if let Some(allocated) = hours.get_mut(unit) {
            // Snap to the cap itself so floor + headroom never drifts past it.
            *allocated = if extra >= headroom {
                params.cap
            } else {
                params.floor + extra
            };
        }
        remaining -= extra;

        log::debug!("Raised {unit} (risk {score}) by {extra} hours, {remaining} remaining");
    }

    log::info!(
        "Allocated {} of {} hours across {units} units ({} unused)",
        params.total_budget - remaining,
        params.total_budget,
        remaining
    );

    Ok(hours)
}

/// Risk-weighted hours of an allocation: `sum_u risk[u] * hours[u]`.
///
/// Units missing from `risk` contribute nothing.
#[must_use]
pub fn objective(risk: &RiskScores, allocation: &UnitHours) -> f64 {
    allocation
        .iter()
        .map(|(unit, hours)| risk.get(unit).copied().unwrap_or(0.0) * hours)
        .sum()
}
