//! Constraint validation of one identity's role set.
//!
//! Rules, all scoped per top-level unit (the sub-unit is only where a role is
//! exercised):
//! - every role must exist in the catalog,
//! - every referenced organizational unit must exist,
//! - all roles share one division,
//! - no configured exclusive pair is held together.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rolegate_core::{IdentityId, OrgUnit, RoleKey, TopLevelUnit};

use crate::catalog::{CatalogRole, Division, RoleCatalog};
use crate::violation::{Violation, ViolationReport, parse_keys};

/// Existence lookup for organizational units, resolved by the caller.
pub trait UnitRegistry {
    fn contains_unit(&self, unit: &OrgUnit) -> bool;
}

/// Snapshot of units known to exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownUnits(BTreeSet<OrgUnit>);

impl KnownUnits {
    pub fn new(units: impl IntoIterator<Item = OrgUnit>) -> Self {
        Self(units.into_iter().collect())
    }

    pub fn insert(&mut self, unit: OrgUnit) {
        self.0.insert(unit);
    }
}

impl UnitRegistry for KnownUnits {
    fn contains_unit(&self, unit: &OrgUnit) -> bool {
        self.0.contains(unit)
    }
}

/// Treats every unit as existing; for callers that checked units upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyUnit;

impl UnitRegistry for AnyUnit {
    fn contains_unit(&self, _unit: &OrgUnit) -> bool {
        true
    }
}

/// Per top-level unit accumulator, folded once over the unit's roles.
#[derive(Debug, Default)]
struct UnitScan<'c> {
    division: Option<&'c Division>,
    conflicts: Vec<&'c CatalogRole>,
    present: HashSet<&'c str>,
}

impl<'c> UnitScan<'c> {
    fn observe(mut self, role: &'c CatalogRole) -> Self {
        if !self.present.insert(role.name.as_str()) {
            return self;
        }
        match self.division {
            None => self.division = Some(&role.division),
            Some(adopted) if *adopted != role.division => self.conflicts.push(role),
            Some(_) => {}
        }
        self
    }

    fn report(self, top_level: &TopLevelUnit, catalog: &RoleCatalog, out: &mut ViolationReport) {
        if let Some(expected) = self.division {
            for role in &self.conflicts {
                out.push(Violation::DivisionConflict {
                    top_level: top_level.clone(),
                    expected: expected.clone(),
                    found: role.division.clone(),
                    role: role.name.clone(),
                });
            }
        }

        for pair in catalog.exclusive_pairs() {
            if self.present.contains(pair.first()) && self.present.contains(pair.second()) {
                out.push(Violation::MutualExclusionConflict {
                    top_level: top_level.clone(),
                    first: pair.first().to_string(),
                    second: pair.second().to_string(),
                });
            }
        }
    }
}

/// Checks proposed role sets against a [`RoleCatalog`].
///
/// Stateless beyond the borrowed catalog; cheap to construct per request.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintValidator<'a> {
    catalog: &'a RoleCatalog,
}

impl<'a> ConstraintValidator<'a> {
    pub fn new(catalog: &'a RoleCatalog) -> Self {
        Self { catalog }
    }

    /// Validate structured assignments. An empty set is always valid.
    pub fn validate(
        &self,
        identity: &IdentityId,
        assignments: &[RoleKey],
        units: &impl UnitRegistry,
    ) -> ViolationReport {
        let mut report = ViolationReport::new(identity.clone());
        self.check_into(&mut report, assignments, units);
        log_outcome(&report);
        report
    }

    /// Validate textual `top:sub:role` keys. Malformed entries are reported and
    /// excluded from every further check.
    pub fn validate_raw<S: AsRef<str>>(
        &self,
        identity: &IdentityId,
        raw: &[S],
        units: &impl UnitRegistry,
    ) -> ViolationReport {
        let (keys, malformed) = parse_keys(raw);
        let mut report = ViolationReport::new(identity.clone());
        for violation in malformed {
            report.push(violation);
        }
        self.check_into(&mut report, &keys, units);
        log_outcome(&report);
        report
    }

    /// Reference checks only: units exist and roles are catalogued. Used where
    /// the set is not a role set to be held (e.g. a removal request).
    pub fn validate_references(
        &self,
        identity: &IdentityId,
        assignments: &[RoleKey],
        units: &impl UnitRegistry,
    ) -> ViolationReport {
        let mut report = ViolationReport::new(identity.clone());
        self.resolve(&mut report, assignments, units);
        log_outcome(&report);
        report
    }

    pub(crate) fn check_into(
        &self,
        report: &mut ViolationReport,
        assignments: &[RoleKey],
        units: &impl UnitRegistry,
    ) {
        for (top_level, roles) in self.resolve(report, assignments, units) {
            roles
                .into_iter()
                .fold(UnitScan::default(), UnitScan::observe)
                .report(top_level, self.catalog, report);
        }
    }

    /// Report unknown units and roles; group the remaining catalogued roles by
    /// top-level unit, in first-appearance order.
    fn resolve<'k>(
        &self,
        report: &mut ViolationReport,
        assignments: &'k [RoleKey],
        units: &impl UnitRegistry,
    ) -> BTreeMap<&'k TopLevelUnit, Vec<&'a CatalogRole>> {
        let mut seen: HashSet<&RoleKey> = HashSet::new();
        let distinct: Vec<&RoleKey> = assignments.iter().filter(|k| seen.insert(*k)).collect();

        // Unknown units suppress every other check for the roles inside them.
        let missing: BTreeSet<&OrgUnit> = distinct
            .iter()
            .map(|k| &k.unit)
            .filter(|u| !units.contains_unit(u))
            .collect();
        for unit in &missing {
            report.push(Violation::UnknownOrgUnit { unit: (*unit).clone() });
        }

        let mut unknown: Vec<(&str, Vec<OrgUnit>)> = Vec::new();
        let mut groups: BTreeMap<&TopLevelUnit, Vec<&CatalogRole>> = BTreeMap::new();

        for key in distinct.iter().filter(|k| !missing.contains(&k.unit)) {
            match self.catalog.get(key.role()) {
                Some(role) => groups.entry(key.top_level()).or_default().push(role),
                None => match unknown.iter_mut().find(|(name, _)| *name == key.role()) {
                    Some((_, seen_in)) => seen_in.push(key.unit.clone()),
                    None => unknown.push((key.role(), vec![key.unit.clone()])),
                },
            }
        }

        for (role, seen_in) in unknown {
            tracing::debug!(role, "role not found in catalog");
            report.push(Violation::UnknownRole {
                role: role.to_string(),
                units: seen_in,
            });
        }

        groups
    }
}

fn log_outcome(report: &ViolationReport) {
    if report.is_valid() {
        tracing::debug!(identity = %report.identity, "role set valid");
    } else {
        tracing::warn!(
            identity = %report.identity,
            violations = report.len(),
            "role set rejected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{catalog, keys, unit};
    use crate::violation::ViolationKind;

    fn identity() -> IdentityId {
        IdentityId::new("auth0|tester").unwrap()
    }

    fn check(raw: &[&str]) -> ViolationReport {
        let catalog = catalog();
        ConstraintValidator::new(&catalog).validate(&identity(), &keys(raw), &AnyUnit)
    }

    #[test]
    fn empty_set_is_valid() {
        assert!(check(&[]).is_valid());
    }

    #[test]
    fn single_division_is_valid() {
        let report = check(&["a:a1:Admin PPE", "a:a1:Admin Agency", "a:a2:Helpdesk"]);
        assert!(report.is_valid(), "{:?}", report.messages());
    }

    #[test]
    fn procurement_roles_across_units_are_valid() {
        let report = check(&[
            "a:a2:PPK",
            "b:b2:KUPBJ",
            "b:b2:Anggota Pokmil",
            "b:b3:PP",
            "b:b3:KUPBJ",
        ]);
        assert!(report.is_valid(), "{:?}", report.messages());
    }

    #[test]
    fn pp_and_ppk_in_different_sub_units_conflict() {
        let report = check(&["a:a1:PP", "a:a2:PPK"]);
        assert_eq!(
            report.violations,
            vec![Violation::MutualExclusionConflict {
                top_level: TopLevelUnit::new("a").unwrap(),
                first: "PP".to_string(),
                second: "PPK".to_string(),
            }]
        );
    }

    #[test]
    fn pp_and_ppk_in_different_top_level_units_are_fine() {
        assert!(check(&["a:a1:PP", "b:b1:PPK"]).is_valid());
    }

    #[test]
    fn cross_division_names_both_divisions() {
        let report = check(&["b:b2:PPK", "b:b2:KUPBJ", "b:b2:Admin PPE"]);
        assert_eq!(
            report.violations,
            vec![Violation::DivisionConflict {
                top_level: TopLevelUnit::new("b").unwrap(),
                expected: Division::new("ProcurementActors"),
                found: Division::new("Management"),
                role: "Admin PPE".to_string(),
            }]
        );
    }

    #[test]
    fn division_is_checked_per_top_level_unit_only() {
        let report = check(&["a:a1:Admin PPE", "b:b3:Helpdesk", "b:b3:Auditor"]);
        assert_eq!(report.count(ViolationKind::DivisionConflict), 1);
        assert!(report.messages()[0].contains("roles in b"));
    }

    #[test]
    fn division_and_exclusion_checks_are_independent() {
        let report = check(&["a:a1:PP", "a:a1:Auditor", "a:a2:PPK"]);
        assert_eq!(report.count(ViolationKind::DivisionConflict), 1);
        assert_eq!(report.count(ViolationKind::MutualExclusionConflict), 1);
    }

    #[test]
    fn unknown_roles_reported_once_each_and_skip_other_checks() {
        let report = check(&["a:a1:Bendahara", "a:a2:Bendahara", "b:b1:Kasir"]);
        assert_eq!(
            report.violations,
            vec![
                Violation::UnknownRole {
                    role: "Bendahara".to_string(),
                    units: vec![unit("a", "a1"), unit("a", "a2")],
                },
                Violation::UnknownRole {
                    role: "Kasir".to_string(),
                    units: vec![unit("b", "b1")],
                },
            ]
        );
    }

    #[test]
    fn unknown_org_unit_suppresses_its_roles() {
        let catalog = catalog();
        let units = KnownUnits::new([unit("a", "a1"), unit("a", "a2")]);
        let report = ConstraintValidator::new(&catalog).validate(
            &identity(),
            &keys(&["c:c9:PP", "c:c9:PPK", "c:c9:Auditor", "c:c9:Nope"]),
            &units,
        );
        assert_eq!(
            report.violations,
            vec![Violation::UnknownOrgUnit { unit: unit("c", "c9") }]
        );
    }

    #[test]
    fn unknown_org_unit_does_not_hide_other_units() {
        let catalog = catalog();
        let units = KnownUnits::new([unit("a", "a1")]);
        let report = ConstraintValidator::new(&catalog).validate(
            &identity(),
            &keys(&["a:a1:PP", "a:a9:PPK"]),
            &units,
        );
        assert_eq!(report.count(ViolationKind::UnknownOrgUnit), 1);
        assert_eq!(report.count(ViolationKind::MutualExclusionConflict), 0);
    }

    #[test]
    fn duplicate_assignments_count_once() {
        let report = check(&["b:b1:Auditor", "b:b1:Auditor", "b:b1:PP", "b:b2:PP"]);
        assert_eq!(report.count(ViolationKind::DivisionConflict), 1);
    }

    #[test]
    fn validate_raw_reports_malformed_and_keeps_checking() {
        let catalog = catalog();
        let report = ConstraintValidator::new(&catalog).validate_raw(
            &identity(),
            &["A1:PP", "a:a1:PP", "a:a2:PPK"],
            &AnyUnit,
        );
        assert_eq!(report.count(ViolationKind::MalformedRole), 1);
        assert_eq!(report.count(ViolationKind::MutualExclusionConflict), 1);
    }

    #[test]
    fn reference_check_ignores_division_rules() {
        let catalog = catalog();
        let report = ConstraintValidator::new(&catalog).validate_references(
            &identity(),
            &keys(&["a:a1:PP", "a:a1:PPK", "a:a1:Auditor", "a:a1:Kasir"]),
            &AnyUnit,
        );
        assert_eq!(report.count(ViolationKind::UnknownRole), 1);
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn auditor_across_sub_units_is_valid() {
        assert!(check(&["b:b1:Auditor", "b:b2:Auditor", "b:b3:Auditor"]).is_valid());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        const ROLES: [&str; 9] = [
            "Admin PPE",
            "Admin Agency",
            "Verifikator",
            "Helpdesk",
            "PPK",
            "KUPBJ",
            "Anggota Pokmil",
            "PP",
            "Auditor",
        ];

        fn assignment() -> impl Strategy<Value = RoleKey> {
            (0..3usize, 1..4usize, prop::sample::select(ROLES.to_vec())).prop_map(
                |(top, sub, role)| {
                    let top = ["a", "b", "c"][top];
                    RoleKey::from_parts(top, &format!("{top}{sub}"), role).unwrap()
                },
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: every distinct unknown role yields exactly one UnknownRole violation.
            #[test]
            fn one_unknown_role_violation_per_distinct_name(
                known in prop::collection::vec(assignment(), 0..8),
                unknown in prop::collection::vec(
                    (prop::sample::select(vec!["Bendahara", "Kasir", "Operator"]), 1..4usize),
                    1..10
                )
            ) {
                let catalog = catalog();
                let mut all = known;
                for (role, sub) in &unknown {
                    all.push(RoleKey::from_parts("a", &format!("a{sub}"), role).unwrap());
                }
                let distinct: BTreeSet<&str> = unknown.iter().map(|(r, _)| *r).collect();

                let report = ConstraintValidator::new(&catalog).validate(&identity(), &all, &AnyUnit);
                prop_assert_eq!(report.count(ViolationKind::UnknownRole), distinct.len());
            }

            /// Property: a top-level unit whose roles share a division and avoid PP+PPK is clean.
            #[test]
            fn single_division_units_contribute_nothing(
                division in 0..3usize,
                subs in prop::collection::vec((1..4usize, 0..4usize), 1..12)
            ) {
                let catalog = catalog();
                let pool: Vec<&str> = match division {
                    0 => vec!["Admin PPE", "Admin Agency", "Verifikator", "Helpdesk"],
                    1 => vec!["PPK", "KUPBJ", "Anggota Pokmil", "KUPBJ"],
                    _ => vec!["Auditor"],
                };
                let assignments: Vec<RoleKey> = subs
                    .iter()
                    .map(|(sub, idx)| {
                        RoleKey::from_parts("a", &format!("a{sub}"), pool[idx % pool.len()]).unwrap()
                    })
                    .collect();

                let report = ConstraintValidator::new(&catalog).validate(&identity(), &assignments, &AnyUnit);
                prop_assert!(report.is_valid(), "{:?}", report.messages());
            }

            /// Property: PP and PPK under one top-level unit give exactly one exclusion violation.
            #[test]
            fn pp_ppk_gives_exactly_one_conflict(
                pp_sub in 1..4usize,
                ppk_sub in 1..4usize,
                extra in prop::collection::vec((1..4usize, prop::sample::select(vec!["KUPBJ", "Anggota Pokmil", "PP", "PPK"])), 0..8)
            ) {
                let catalog = catalog();
                let mut assignments = vec![
                    RoleKey::from_parts("a", &format!("a{pp_sub}"), "PP").unwrap(),
                    RoleKey::from_parts("a", &format!("a{ppk_sub}"), "PPK").unwrap(),
                ];
                for (sub, role) in extra {
                    assignments.push(RoleKey::from_parts("a", &format!("a{sub}"), role).unwrap());
                }

                let report = ConstraintValidator::new(&catalog).validate(&identity(), &assignments, &AnyUnit);
                prop_assert_eq!(report.count(ViolationKind::MutualExclusionConflict), 1);
                prop_assert_eq!(report.len(), 1);
            }

            /// Property: validation never depends on anything but its inputs.
            #[test]
            fn validation_is_deterministic(assignments in prop::collection::vec(assignment(), 0..16)) {
                let catalog = catalog();
                let validator = ConstraintValidator::new(&catalog);
                let first = validator.validate(&identity(), &assignments, &AnyUnit);
                let second = validator.validate(&identity(), &assignments, &AnyUnit);
                prop_assert_eq!(first, second);
            }
        }
    }
}
