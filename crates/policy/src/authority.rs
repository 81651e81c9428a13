//! Authority delegation: may an assigner grant a role in a unit?
//!
//! - No IO
//! - No panics
//! - Decisions are scoped to the assigner's roles in the target unit, unless
//!   the assigner carries the superuser marker.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use rolegate_core::{OrgUnit, RoleKey};

use crate::catalog::RoleCatalog;
use crate::config::{AuthorityConfig, GrantRule};

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorityError {
    /// The assigner has no membership record in the unit and is not a superuser.
    #[error("user has no administrator access in {unit}")]
    NoAdministrativeAccess { unit: OrgUnit },

    /// The assigner's roles in the unit do not permit granting the role.
    #[error("assigning {role} in {unit} is not allowed")]
    Denied { unit: OrgUnit, role: String },
}

/// What the directory knows about an assigner: the superuser marker plus the
/// roles held per unit. A unit absent from `memberships` means the directory
/// reported no membership there; a present unit may still hold no roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignerRoles {
    pub superuser: bool,
    memberships: BTreeMap<OrgUnit, BTreeSet<String>>,
}

impl AssignerRoles {
    pub fn new(superuser: bool) -> Self {
        Self {
            superuser,
            memberships: BTreeMap::new(),
        }
    }

    /// Build from held role keys; each unit mentioned counts as a membership.
    pub fn from_keys(superuser: bool, keys: impl IntoIterator<Item = RoleKey>) -> Self {
        let mut assigner = Self::new(superuser);
        for key in keys {
            assigner
                .memberships
                .entry(key.unit)
                .or_default()
                .insert(key.role);
        }
        assigner
    }

    /// Record a membership (possibly without roles) in `unit`.
    pub fn with_membership(
        mut self,
        unit: OrgUnit,
        roles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.memberships
            .entry(unit)
            .or_default()
            .extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn is_member(&self, unit: &OrgUnit) -> bool {
        self.memberships.contains_key(unit)
    }

    pub fn roles_in(&self, unit: &OrgUnit) -> impl Iterator<Item = &str> {
        self.memberships
            .get(unit)
            .into_iter()
            .flat_map(|roles| roles.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuthorityEngine<'a> {
    catalog: &'a RoleCatalog,
    config: &'a AuthorityConfig,
}

impl<'a> AuthorityEngine<'a> {
    pub fn new(catalog: &'a RoleCatalog, config: &'a AuthorityConfig) -> Self {
        Self { catalog, config }
    }

    /// The identity-level role that marks a superuser.
    pub fn superuser_role(&self) -> &'a str {
        &self.config.superuser_role
    }

    /// First rule whose holder the assigner has in `unit`.
    fn governing_rule(&self, assigner: &AssignerRoles, unit: &OrgUnit) -> Option<&'a GrantRule> {
        let held: BTreeSet<&str> = assigner.roles_in(unit).collect();
        self.config
            .rules
            .iter()
            .find(|rule| held.contains(rule.holder.as_str()))
    }

    /// Single-grant decision. Unknown target roles are never assignable.
    pub fn can_assign(&self, assigner: &AssignerRoles, unit: &OrgUnit, target_role: &str) -> bool {
        if !self.catalog.contains(target_role) {
            return false;
        }

        if assigner.superuser {
            return self.config.rules.iter().any(|rule| rule.permits(target_role));
        }

        self.governing_rule(assigner, unit)
            .is_some_and(|rule| rule.permits(target_role))
    }

    /// Batch decision over a proposed assignment set. Fails closed on the first
    /// disallowed entry.
    pub fn authorize_all(
        &self,
        assigner: &AssignerRoles,
        proposed: &[RoleKey],
    ) -> Result<(), AuthorityError> {
        for key in proposed {
            if !assigner.superuser && !assigner.is_member(&key.unit) {
                tracing::warn!(unit = %key.unit, "assigner has no membership in unit");
                return Err(AuthorityError::NoAdministrativeAccess {
                    unit: key.unit.clone(),
                });
            }

            if !self.can_assign(assigner, &key.unit, key.role()) {
                tracing::warn!(unit = %key.unit, role = key.role(), "assignment not allowed");
                return Err(AuthorityError::Denied {
                    unit: key.unit.clone(),
                    role: key.role.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::testing::{catalog, keys, unit};

    fn with_engine(f: impl FnOnce(AuthorityEngine<'_>)) {
        let catalog = catalog();
        let config = PolicyConfig::default();
        f(AuthorityEngine::new(&catalog, &config.authority));
    }

    fn admin_ppe_in_a1() -> AssignerRoles {
        AssignerRoles::from_keys(false, keys(&["a:a1:Admin PPE"]))
    }

    #[test]
    fn admin_ppe_may_assign_admin_agency() {
        with_engine(|engine| {
            assert!(engine.can_assign(&admin_ppe_in_a1(), &unit("a", "a1"), "Admin Agency"));
        });
    }

    #[test]
    fn admin_ppe_may_not_assign_auditor_or_itself() {
        with_engine(|engine| {
            let assigner = admin_ppe_in_a1();
            assert!(!engine.can_assign(&assigner, &unit("a", "a1"), "Auditor"));
            assert!(!engine.can_assign(&assigner, &unit("a", "a1"), "Admin PPE"));
        });
    }

    #[test]
    fn admin_agency_may_not_assign_admin_roles() {
        with_engine(|engine| {
            let assigner = AssignerRoles::from_keys(false, keys(&["a:a1:Admin Agency"]));
            let a1 = unit("a", "a1");
            assert!(engine.can_assign(&assigner, &a1, "PPK"));
            assert!(engine.can_assign(&assigner, &a1, "Helpdesk"));
            assert!(!engine.can_assign(&assigner, &a1, "Admin Agency"));
            assert!(!engine.can_assign(&assigner, &a1, "Admin PPE"));
            assert!(!engine.can_assign(&assigner, &a1, "Auditor"));
        });
    }

    #[test]
    fn admin_ppe_takes_precedence_over_admin_agency() {
        with_engine(|engine| {
            let assigner =
                AssignerRoles::from_keys(false, keys(&["a:a1:Admin Agency", "a:a1:Admin PPE"]));
            assert!(engine.can_assign(&assigner, &unit("a", "a1"), "Admin Agency"));
        });
    }

    #[test]
    fn roles_do_not_leak_across_units() {
        with_engine(|engine| {
            assert!(!engine.can_assign(&admin_ppe_in_a1(), &unit("a", "a2"), "PP"));
        });
    }

    #[test]
    fn non_admin_roles_grant_nothing() {
        with_engine(|engine| {
            let assigner = AssignerRoles::from_keys(false, keys(&["a:a1:Helpdesk", "a:a1:PPK"]));
            assert!(!engine.can_assign(&assigner, &unit("a", "a1"), "Verifikator"));
        });
    }

    #[test]
    fn superuser_gets_union_of_rules_everywhere() {
        with_engine(|engine| {
            let assigner = AssignerRoles::new(true);
            let c3 = unit("c", "c3");
            assert!(engine.can_assign(&assigner, &c3, "Admin Agency"));
            assert!(engine.can_assign(&assigner, &c3, "PP"));
            assert!(!engine.can_assign(&assigner, &c3, "Admin PPE"));
            assert!(!engine.can_assign(&assigner, &c3, "Auditor"));
        });
    }

    #[test]
    fn unknown_target_role_is_denied() {
        with_engine(|engine| {
            assert!(!engine.can_assign(&AssignerRoles::new(true), &unit("a", "a1"), "Bendahara"));
        });
    }

    #[test]
    fn batch_reports_missing_membership() {
        with_engine(|engine| {
            let err = engine
                .authorize_all(&admin_ppe_in_a1(), &keys(&["a:a1:PP", "b:b1:PP"]))
                .unwrap_err();
            assert_eq!(err, AuthorityError::NoAdministrativeAccess { unit: unit("b", "b1") });
            assert_eq!(err.to_string(), "user has no administrator access in b-b1");
        });
    }

    #[test]
    fn batch_fails_closed_on_first_denied_entry() {
        with_engine(|engine| {
            let err = engine
                .authorize_all(
                    &admin_ppe_in_a1(),
                    &keys(&["a:a1:PP", "a:a1:Auditor", "a:a1:Admin PPE"]),
                )
                .unwrap_err();
            assert_eq!(
                err,
                AuthorityError::Denied {
                    unit: unit("a", "a1"),
                    role: "Auditor".to_string(),
                }
            );
        });
    }

    #[test]
    fn membership_without_roles_is_denied_not_missing() {
        with_engine(|engine| {
            let assigner = AssignerRoles::new(false).with_membership(unit("a", "a1"), Vec::<String>::new());
            let err = engine.authorize_all(&assigner, &keys(&["a:a1:PP"])).unwrap_err();
            assert!(matches!(err, AuthorityError::Denied { .. }));
        });
    }

    #[test]
    fn superuser_needs_no_membership() {
        with_engine(|engine| {
            let assigner = AssignerRoles::new(true);
            engine
                .authorize_all(&assigner, &keys(&["b:b2:KUPBJ", "c:c1:Helpdesk"]))
                .unwrap();
        });
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        const ROLES: [&str; 10] = [
            "Admin PPE",
            "Admin Agency",
            "Verifikator",
            "Helpdesk",
            "PPK",
            "KUPBJ",
            "Anggota Pokmil",
            "PP",
            "Auditor",
            "Bendahara",
        ];

        proptest! {
            /// Property: if an Admin PPE is denied a grant, an assigner with no roles is too.
            #[test]
            fn denial_is_monotonic_in_privilege(
                target in prop::sample::select(ROLES.to_vec()),
                extra in prop::collection::vec(prop::sample::select(ROLES.to_vec()), 0..4)
            ) {
                let catalog = catalog();
                let config = PolicyConfig::default();
                let engine = AuthorityEngine::new(&catalog, &config.authority);
                let a1 = unit("a", "a1");

                let privileged = AssignerRoles::new(false)
                    .with_membership(a1.clone(), std::iter::once("Admin PPE").chain(extra));
                let bare = AssignerRoles::new(false).with_membership(a1.clone(), Vec::<String>::new());
                let absent = AssignerRoles::new(false);

                if !engine.can_assign(&privileged, &a1, target) {
                    prop_assert!(!engine.can_assign(&bare, &a1, target));
                    prop_assert!(!engine.can_assign(&absent, &a1, target));
                }
                prop_assert!(!engine.can_assign(&bare, &a1, target));
            }
        }
    }
}
