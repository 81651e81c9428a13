//! Incremental merge for additive ("add roles") requests.
//!
//! New roles are validated together with the identity's existing roles in
//! every top-level unit the request touches, because isolation and exclusion
//! are defined over that whole scope.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use rolegate_core::{IdentityId, RoleKey, TopLevelUnit};

use crate::validator::{ConstraintValidator, UnitRegistry};
use crate::violation::{ViolationReport, parse_keys};

/// An identity's current roles, indexed by top-level unit.
///
/// Looking up a unit's run is a map lookup; the run itself is kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentRoles {
    by_top_level: BTreeMap<TopLevelUnit, BTreeSet<RoleKey>>,
}

impl CurrentRoles {
    pub fn new(keys: impl IntoIterator<Item = RoleKey>) -> Self {
        let mut by_top_level: BTreeMap<TopLevelUnit, BTreeSet<RoleKey>> = BTreeMap::new();
        for key in keys {
            by_top_level
                .entry(key.top_level().clone())
                .or_default()
                .insert(key);
        }
        Self { by_top_level }
    }

    /// Existing roles under one top-level unit, in key order.
    pub fn in_top_level(&self, top_level: &TopLevelUnit) -> impl Iterator<Item = &RoleKey> {
        self.by_top_level
            .get(top_level)
            .into_iter()
            .flat_map(BTreeSet::iter)
    }

    pub fn contains(&self, key: &RoleKey) -> bool {
        self.by_top_level
            .get(key.top_level())
            .is_some_and(|run| run.contains(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleKey> {
        self.by_top_level.values().flat_map(BTreeSet::iter)
    }

    pub fn len(&self) -> usize {
        self.by_top_level.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_top_level.is_empty()
    }
}

impl FromIterator<RoleKey> for CurrentRoles {
    fn from_iter<T: IntoIterator<Item = RoleKey>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Result of [`IncrementalMerger::merge_and_validate`]. The caller's current
/// role set is never modified, whatever the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub expanded: Vec<RoleKey>,
    pub report: ViolationReport,
}

impl MergeOutcome {
    pub fn is_valid(&self) -> bool {
        self.report.is_valid()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IncrementalMerger<'a> {
    validator: ConstraintValidator<'a>,
}

impl<'a> IncrementalMerger<'a> {
    pub fn new(validator: ConstraintValidator<'a>) -> Self {
        Self { validator }
    }

    /// Union of `requested` with the current roles of every touched top-level
    /// unit. Existing roles come first (per unit, in key order), then the
    /// requested ones in request order; duplicates are dropped.
    pub fn merge(&self, requested: &[RoleKey], current: &CurrentRoles) -> Vec<RoleKey> {
        let touched: BTreeSet<&TopLevelUnit> = requested.iter().map(RoleKey::top_level).collect();

        let mut seen: HashSet<&RoleKey> = HashSet::new();
        let mut expanded = Vec::with_capacity(requested.len());

        for top_level in touched {
            for key in current.in_top_level(top_level) {
                if seen.insert(key) {
                    expanded.push(key.clone());
                }
            }
        }
        for key in requested {
            if seen.insert(key) {
                expanded.push(key.clone());
            }
        }

        expanded
    }

    /// Parse the requested keys, merge and validate the union.
    ///
    /// Malformed keys are rejected before merging and never matched against
    /// any unit.
    pub fn merge_and_validate<S: AsRef<str>>(
        &self,
        identity: &IdentityId,
        requested: &[S],
        current: &CurrentRoles,
        units: &impl UnitRegistry,
    ) -> MergeOutcome {
        let (keys, malformed) = parse_keys(requested);
        self.merge_keys_and_validate(identity, &keys, malformed, current, units)
    }

    /// Same as [`merge_and_validate`](Self::merge_and_validate) for already
    /// structured keys.
    pub fn merge_and_validate_keys(
        &self,
        identity: &IdentityId,
        requested: &[RoleKey],
        current: &CurrentRoles,
        units: &impl UnitRegistry,
    ) -> MergeOutcome {
        self.merge_keys_and_validate(identity, requested, Vec::new(), current, units)
    }

    fn merge_keys_and_validate(
        &self,
        identity: &IdentityId,
        requested: &[RoleKey],
        malformed: Vec<crate::violation::Violation>,
        current: &CurrentRoles,
        units: &impl UnitRegistry,
    ) -> MergeOutcome {
        let expanded = self.merge(requested, current);
        tracing::debug!(
            identity = %identity,
            requested = requested.len(),
            expanded = expanded.len(),
            "merged requested roles with current roles"
        );

        let mut report = ViolationReport::new(identity.clone());
        for violation in malformed {
            report.push(violation);
        }
        self.validator.check_into(&mut report, &expanded, units);

        if !report.is_valid() {
            tracing::warn!(
                identity = %identity,
                violations = report.len(),
                "additive role request rejected"
            );
        }

        MergeOutcome { expanded, report }
    }
}
