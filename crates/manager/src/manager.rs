//! Request orchestration: authority, then validation, then directory writes.
//!
//! Every operation resolves its inputs from the directory first and applies
//! nothing unless all checks pass. A directory failure is reported as such,
//! never as a validation verdict.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;

use rolegate_core::{ExternalRoleId, IdentityId, OrgUnit, RoleKey};
use rolegate_directory::{Directory, DirectoryError};
use rolegate_policy::{
    AssignerRoles, AuthorityEngine, CatalogError, ConstraintValidator, CurrentRoles,
    IncrementalMerger, KnownUnits, LiveRole, PolicyConfig, RoleCatalog, UnitRegistry,
    ViolationReport,
};

use crate::context::RequestContext;
use crate::error::ManagerError;
use crate::request::AssignmentRequest;

/// What an accepted operation changed for the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedChange {
    pub identity: IdentityId,
    pub added: Vec<RoleKey>,
    pub removed: Vec<RoleKey>,
}

impl AppliedChange {
    fn new(identity: &IdentityId) -> Self {
        Self {
            identity: identity.clone(),
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct RoleManager<D> {
    directory: D,
    config: PolicyConfig,
    catalog: Arc<RoleCatalog>,
}

impl<D: Directory> RoleManager<D> {
    /// Validate the policy and build the catalog from the directory's roles.
    pub fn new(directory: D, config: PolicyConfig) -> Result<Self, ManagerError> {
        config.validate()?;
        let catalog = load_catalog(&directory, &config)?;
        Ok(Self {
            directory,
            config,
            catalog: Arc::new(catalog),
        })
    }

    /// Rebuild the catalog. The current one stays in place on failure.
    pub fn reload_catalog(&mut self) -> Result<(), ManagerError> {
        let catalog = load_catalog(&self.directory, &self.config)?;
        self.catalog = Arc::new(catalog);
        tracing::info!(roles = self.catalog.len(), "role catalog reloaded");
        Ok(())
    }

    pub fn catalog(&self) -> Arc<RoleCatalog> {
        Arc::clone(&self.catalog)
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Validate a requested role set on its own. Read-only.
    pub fn validate(
        &self,
        identity: &IdentityId,
        request: &AssignmentRequest,
    ) -> Result<ViolationReport, ManagerError> {
        let raw = request.raw_keys();
        let (keys, _) = request.flatten();
        let units = self.resolve_units(&keys)?;
        Ok(ConstraintValidator::new(&self.catalog).validate_raw(identity, &raw, &units))
    }

    /// Add roles on top of what the identity already holds.
    ///
    /// The request is validated together with the identity's current roles in
    /// every top-level unit it touches. Only roles not already held are
    /// written.
    pub fn add_roles(
        &self,
        ctx: &RequestContext,
        request: &AssignmentRequest,
    ) -> Result<AppliedChange, ManagerError> {
        let catalog = self.catalog();
        let identity = ctx.identity();
        let (keys, _) = request.flatten();

        let mut units = self.resolve_units(&keys)?;
        self.authorize(&catalog, ctx.actor(), &keys, &units)?;

        let current: CurrentRoles = self.held_roles(&catalog, identity)?.into_iter().collect();
        for key in current.iter() {
            units.insert(key.unit.clone());
        }

        let merger = IncrementalMerger::new(ConstraintValidator::new(&catalog));
        let outcome = merger.merge_and_validate(identity, &request.raw_keys(), &current, &units);
        if !outcome.is_valid() {
            return Err(ManagerError::Rejected(outcome.report));
        }

        let added: Vec<RoleKey> = distinct(&keys)
            .filter(|key| !current.contains(key))
            .cloned()
            .collect();

        let mut change = AppliedChange::new(identity);
        self.apply(&catalog, &mut change, &[], &added)?;
        tracing::info!(
            actor = %ctx.actor(),
            identity = %identity,
            added = change.added.len(),
            "roles added"
        );
        Ok(change)
    }

    /// Replace every role the identity holds with the requested set.
    ///
    /// The requested set is validated alone since nothing else survives. The
    /// actor needs authority over every requested role and every held role
    /// that would be removed.
    pub fn replace_roles(
        &self,
        ctx: &RequestContext,
        request: &AssignmentRequest,
    ) -> Result<AppliedChange, ManagerError> {
        let catalog = self.catalog();
        let identity = ctx.identity();
        let (keys, _) = request.flatten();

        let mut units = self.resolve_units(&keys)?;
        let current = self.held_roles(&catalog, identity)?;
        let requested: HashSet<&RoleKey> = keys.iter().collect();
        let held: HashSet<&RoleKey> = current.iter().collect();

        let removed: Vec<RoleKey> = current
            .iter()
            .filter(|key| !requested.contains(key))
            .cloned()
            .collect();
        for key in &removed {
            units.insert(key.unit.clone());
        }

        let touched: Vec<RoleKey> = keys.iter().chain(&removed).cloned().collect();
        self.authorize(&catalog, ctx.actor(), &touched, &units)?;

        let report =
            ConstraintValidator::new(&catalog).validate_raw(identity, &request.raw_keys(), &units);
        if !report.is_valid() {
            return Err(ManagerError::Rejected(report));
        }

        let added: Vec<RoleKey> = distinct(&keys)
            .filter(|key| !held.contains(key))
            .cloned()
            .collect();

        let mut change = AppliedChange::new(identity);
        self.apply(&catalog, &mut change, &removed, &added)?;
        tracing::info!(
            actor = %ctx.actor(),
            identity = %identity,
            added = change.added.len(),
            removed = change.removed.len(),
            "roles replaced"
        );
        Ok(change)
    }

    /// Remove the requested roles. Roles the identity does not hold are
    /// ignored.
    ///
    /// Removal cannot break isolation or exclusion, so only references are
    /// checked: key syntax, role existence, and unit existence.
    pub fn remove_roles(
        &self,
        ctx: &RequestContext,
        request: &AssignmentRequest,
    ) -> Result<AppliedChange, ManagerError> {
        let catalog = self.catalog();
        let identity = ctx.identity();
        let (keys, malformed) = request.flatten();

        let units = self.resolve_units(&keys)?;
        self.authorize(&catalog, ctx.actor(), &keys, &units)?;

        let references = ConstraintValidator::new(&catalog).validate_references(identity, &keys, &units);
        if !malformed.is_empty() || !references.is_valid() {
            let mut report = ViolationReport::new(identity.clone());
            for violation in malformed.into_iter().chain(references.violations) {
                report.push(violation);
            }
            tracing::warn!(identity = %identity, violations = report.len(), "role removal rejected");
            return Err(ManagerError::Rejected(report));
        }

        let current: CurrentRoles = self.directory.identity_roles(identity)?.into_iter().collect();
        let mut removed = Vec::new();
        for key in distinct(&keys) {
            if current.contains(key) {
                removed.push(key.clone());
            } else {
                tracing::debug!(identity = %identity, key = %key, "role not held; ignored");
            }
        }

        let mut change = AppliedChange::new(identity);
        self.apply(&catalog, &mut change, &removed, &[])?;
        tracing::info!(
            actor = %ctx.actor(),
            identity = %identity,
            removed = change.removed.len(),
            "roles removed"
        );
        Ok(change)
    }

    /// The identity's roles that name a catalogued role. Anything else it
    /// holds is left untouched.
    fn held_roles(
        &self,
        catalog: &RoleCatalog,
        identity: &IdentityId,
    ) -> Result<Vec<RoleKey>, ManagerError> {
        let mut held = self.directory.identity_roles(identity)?;
        held.retain(|key| {
            let known = catalog.contains(key.role());
            if !known {
                tracing::warn!(identity = %identity, key = %key, "held role outside the catalog left in place");
            }
            known
        });
        Ok(held)
    }

    /// Existence of every distinct unit the keys reference.
    fn resolve_units(&self, keys: &[RoleKey]) -> Result<KnownUnits, ManagerError> {
        let distinct: BTreeSet<&OrgUnit> = keys.iter().map(|k| &k.unit).collect();
        let mut known = KnownUnits::default();
        for unit in distinct {
            if self.directory.org_unit_exists(unit)? {
                known.insert(unit.clone());
            } else {
                tracing::debug!(unit = %unit, "organization unit not found");
            }
        }
        Ok(known)
    }

    /// Batch authority check over the keys that name a catalogued role in an
    /// existing unit. The rest never pass validation.
    fn authorize(
        &self,
        catalog: &RoleCatalog,
        actor: &IdentityId,
        keys: &[RoleKey],
        units: &KnownUnits,
    ) -> Result<(), ManagerError> {
        let checked: Vec<RoleKey> = keys
            .iter()
            .filter(|k| units.contains_unit(&k.unit) && catalog.contains(k.role()))
            .cloned()
            .collect();

        let engine = AuthorityEngine::new(catalog, &self.config.authority);
        let assigner = self.resolve_assigner(&engine, actor, &checked)?;
        engine.authorize_all(&assigner, &checked)?;
        Ok(())
    }

    fn resolve_assigner(
        &self,
        engine: &AuthorityEngine<'_>,
        actor: &IdentityId,
        keys: &[RoleKey],
    ) -> Result<AssignerRoles, ManagerError> {
        let superuser_role = engine.superuser_role();
        let superuser = match self.directory.global_roles(actor) {
            Ok(roles) => roles.iter().any(|r| r == superuser_role),
            Err(DirectoryError::NotFound(_)) => false,
            Err(err) => return Err(err.into()),
        };

        let mut assigner = AssignerRoles::new(superuser);
        if superuser {
            return Ok(assigner);
        }

        let units: BTreeSet<&OrgUnit> = keys.iter().map(|k| &k.unit).collect();
        for unit in units {
            match self.directory.member_roles(unit, actor) {
                Ok(Some(roles)) => assigner = assigner.with_membership(unit.clone(), roles),
                Ok(None) | Err(DirectoryError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(assigner)
    }

    /// Remove, then add, unit by unit. `change` records each unit as the
    /// directory accepts it, so a failure midway reports what went through.
    fn apply(
        &self,
        catalog: &RoleCatalog,
        change: &mut AppliedChange,
        removed: &[RoleKey],
        added: &[RoleKey],
    ) -> Result<(), ManagerError> {
        let result = self
            .unassign(catalog, &change.identity, removed, &mut change.removed)
            .and_then(|()| self.assign(catalog, &change.identity, added, &mut change.added));

        match result {
            Ok(()) => Ok(()),
            Err(err) if change.is_noop() => Err(err),
            Err(err) => {
                tracing::error!(
                    identity = %change.identity,
                    added = change.added.len(),
                    removed = change.removed.len(),
                    error = %err,
                    "directory write failed after partial application"
                );
                Err(ManagerError::PartiallyApplied {
                    applied: change.clone(),
                    source: Box::new(err),
                })
            }
        }
    }

    fn assign(
        &self,
        catalog: &RoleCatalog,
        identity: &IdentityId,
        keys: &[RoleKey],
        done: &mut Vec<RoleKey>,
    ) -> Result<(), ManagerError> {
        for (unit, group) in by_unit(keys) {
            let ids = external_ids(catalog, &group)?;
            self.directory.add_member(unit, identity)?;
            self.directory.assign_member_roles(unit, identity, &ids)?;
            done.extend(group.into_iter().cloned());
        }
        Ok(())
    }

    fn unassign(
        &self,
        catalog: &RoleCatalog,
        identity: &IdentityId,
        keys: &[RoleKey],
        done: &mut Vec<RoleKey>,
    ) -> Result<(), ManagerError> {
        for (unit, group) in by_unit(keys) {
            let ids = external_ids(catalog, &group)?;
            self.directory.remove_member_roles(unit, identity, &ids)?;
            done.extend(group.into_iter().cloned());
        }
        Ok(())
    }
}

fn load_catalog<D: Directory>(directory: &D, config: &PolicyConfig) -> Result<RoleCatalog, CatalogError> {
    RoleCatalog::load(config, || {
        directory.list_all_roles().map(|roles| {
            roles
                .into_iter()
                .map(|r| LiveRole {
                    name: r.name,
                    external_id: r.external_id,
                })
                .collect()
        })
    })
}

fn distinct(keys: &[RoleKey]) -> impl Iterator<Item = &RoleKey> {
    let mut seen: HashSet<&RoleKey> = HashSet::new();
    keys.iter().filter(move |k| seen.insert(*k))
}

fn by_unit(keys: &[RoleKey]) -> BTreeMap<&OrgUnit, Vec<&RoleKey>> {
    let mut grouped: BTreeMap<&OrgUnit, Vec<&RoleKey>> = BTreeMap::new();
    for key in keys {
        grouped.entry(&key.unit).or_default().push(key);
    }
    grouped
}

fn external_ids(catalog: &RoleCatalog, keys: &[&RoleKey]) -> Result<Vec<ExternalRoleId>, ManagerError> {
    keys.iter()
        .map(|key| {
            catalog
                .external_id_of(key.role())
                .cloned()
                .ok_or_else(|| ManagerError::Catalog(CatalogError::MissingInDirectory(key.role().to_string())))
        })
        .collect()
}
