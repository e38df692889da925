//! Fine-to-coarse unit containment (e.g. LSOA -> ward).
//!
//! The mapping is built once, typically from a lookup table or a spatial
//! join, and then shared read-only across every aggregation run.

use std::collections::{BTreeMap, BTreeSet};

use ward_patrol_allocation_models::UnitCode;

use crate::AggregateError;

/// Immutable many-to-one lookup from fine-grained units to the coarse unit
/// that contains them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Containment {
    parents: BTreeMap<UnitCode, UnitCode>,
    /// Every coarse unit, including ones that contain no fine unit.
    coarse: BTreeSet<UnitCode>,
}

impl Containment {
    /// Builds a containment from `(fine, coarse)` pairs.
    ///
    /// Repeating an identical pair is allowed; mapping one fine unit to two
    /// different coarse units is not.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::ConflictingContainment`] if a fine unit is
    /// mapped to more than one coarse unit.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, AggregateError>
    where
        I: IntoIterator<Item = (UnitCode, UnitCode)>,
    {
        let mut parents: BTreeMap<UnitCode, UnitCode> = BTreeMap::new();
        let mut coarse = BTreeSet::new();

        for (fine, parent) in pairs {
            if let Some(existing) = parents.get(&fine) {
                if *existing != parent {
                    return Err(AggregateError::ConflictingContainment {
                        unit: fine,
                        first: existing.clone(),
                        second: parent,
                    });
                }
                continue;
            }
            coarse.insert(parent.clone());
            parents.insert(fine, parent);
        }

        Ok(Self { parents, coarse })
    }

    /// Registers additional coarse units so that they are reported (with
    /// zero risk) even when no fine unit maps to them.
    #[must_use]
    pub fn with_coarse_units<I>(mut self, units: I) -> Self
    where
        I: IntoIterator<Item = UnitCode>,
    {
        self.coarse.extend(units);
        self
    }

    /// Returns the coarse unit containing `fine`, if any.
    #[must_use]
    pub fn coarse_of(&self, fine: &UnitCode) -> Option<&UnitCode> {
        self.parents.get(fine)
    }

    /// Returns every coarse unit, sorted by code.
    #[must_use]
    pub const fn coarse_units(&self) -> &BTreeSet<UnitCode> {
        &self.coarse
    }

    /// Iterates `(fine, coarse)` pairs sorted by fine unit code.
    pub fn pairs(&self) -> impl Iterator<Item = (&UnitCode, &UnitCode)> {
        self.parents.iter()
    }

    /// Number of fine units with a known coarse unit.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Returns `true` if no fine unit is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(fine: &str, coarse: &str) -> (UnitCode, UnitCode) {
        (UnitCode::new(fine), UnitCode::new(coarse))
    }

    #[test]
    fn builds_lookup_from_pairs() {
        let containment =
            Containment::from_pairs([pair("L1", "W1"), pair("L2", "W1"), pair("L3", "W2")])
                .unwrap();

        assert_eq!(containment.len(), 3);
        assert_eq!(
            containment.coarse_of(&UnitCode::new("L2")),
            Some(&UnitCode::new("W1"))
        );
        assert!(containment.coarse_of(&UnitCode::new("L9")).is_none());
        assert_eq!(containment.coarse_units().len(), 2);
    }

    #[test]
    fn tolerates_repeated_identical_pairs() {
        let containment = Containment::from_pairs([pair("L1", "W1"), pair("L1", "W1")]).unwrap();
        assert_eq!(containment.len(), 1);
    }

    #[test]
    fn rejects_conflicting_pairs() {
        let err = Containment::from_pairs([pair("L1", "W1"), pair("L1", "W2")]).unwrap_err();
        assert!(matches!(
            err,
            AggregateError::ConflictingContainment { ref unit, .. } if unit.as_str() == "L1"
        ));
    }

    #[test]
    fn registers_coarse_units_without_members() {
        let containment = Containment::from_pairs([pair("L1", "W1")])
            .unwrap()
            .with_coarse_units([UnitCode::new("W2")]);

        let coarse: Vec<&str> = containment
            .coarse_units()
            .iter()
            .map(UnitCode::as_str)
            .collect();
        assert_eq!(coarse, ["W1", "W2"]);
    }
}
