//! Selection of the periods that contribute to one aggregation run.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ward_patrol_allocation_models::{Period, RiskRecord};

/// The set of periods an aggregation run sums over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    /// Every period present in the records.
    #[default]
    All,
    /// An explicit set of periods.
    Periods(BTreeSet<Period>),
    /// The `n` most recent distinct periods present in the records.
    Latest(usize),
}

impl Window {
    /// Resolves the window against a set of records.
    ///
    /// Returns `None` for [`Window::All`], meaning no period filter applies.
    #[must_use]
    pub fn resolve(&self, records: &[RiskRecord]) -> Option<BTreeSet<Period>> {
        match self {
            Self::All => None,
            Self::Periods(periods) => Some(periods.clone()),
            Self::Latest(n) => {
                let distinct: BTreeSet<&Period> = records.iter().map(|r| &r.period).collect();
                Some(distinct.into_iter().rev().take(*n).cloned().collect())
            }
        }
    }

    /// Builds an explicit window from anything yielding periods.
    #[must_use]
    pub fn periods<I, P>(periods: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Period>,
    {
        Self::Periods(periods.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all periods"),
            Self::Periods(periods) => {
                let list: Vec<&str> = periods.iter().map(Period::as_str).collect();
                write!(f, "periods [{}]", list.join(", "))
            }
            Self::Latest(n) => write!(f, "latest {n} periods"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<RiskRecord> {
        vec![
            RiskRecord::new("W1", "2024-01", 1.0),
            RiskRecord::new("W1", "2024-03", 1.0),
            RiskRecord::new("W2", "2024-02", 1.0),
            RiskRecord::new("W2", "2024-04", 1.0),
            RiskRecord::new("W3", "2024-04", 1.0),
        ]
    }

    #[test]
    fn all_has_no_filter() {
        assert!(Window::All.resolve(&records()).is_none());
    }

    #[test]
    fn latest_picks_most_recent_distinct_periods() {
        let resolved = Window::Latest(3).resolve(&records()).unwrap();
        let periods: Vec<&str> = resolved.iter().map(Period::as_str).collect();
        assert_eq!(periods, ["2024-02", "2024-03", "2024-04"]);
    }

    #[test]
    fn latest_larger_than_history_keeps_everything() {
        let resolved = Window::Latest(12).resolve(&records()).unwrap();
        assert_eq!(resolved.len(), 4);
    }

    #[test]
    fn explicit_periods_are_normalized() {
        let window = Window::periods(["2024-01-15", "2024-02"]);
        let resolved = window.resolve(&records()).unwrap();
        let periods: Vec<&str> = resolved.iter().map(Period::as_str).collect();
        assert_eq!(periods, ["2024-01", "2024-02"]);
    }
}
