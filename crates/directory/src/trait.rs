use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rolegate_core::{ExternalRoleId, IdentityId, OrgUnit, RoleKey};

/// A role as the directory knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRole {
    pub name: String,
    pub external_id: ExternalRoleId,
}

/// Directory operation error.
///
/// `Unavailable` is the only retryable condition; callers must never treat it
/// as a validation outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown role id: {0}")]
    UnknownRoleId(ExternalRoleId),

    #[error("invalid directory data: {0}")]
    Invalid(String),
}

impl DirectoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DirectoryError::Unavailable(_))
    }
}

/// Identity directory (org units, roles, memberships).
///
/// Reads are what the policy engine's callers need to resolve inputs; writes
/// apply an already-accepted change. Implementations own their timeout/retry
/// policy and report an unreachable backend as [`DirectoryError::Unavailable`].
///
/// ## Ordering
///
/// - `list_all_roles` returns roles sorted by name.
/// - `identity_roles` returns keys sorted by key order (top-level unit first).
pub trait Directory: Send + Sync {
    /// Every role defined in the directory.
    fn list_all_roles(&self) -> Result<Vec<DirectoryRole>, DirectoryError>;

    /// Whether the organizational unit exists.
    fn org_unit_exists(&self, unit: &OrgUnit) -> Result<bool, DirectoryError>;

    /// All unit-scoped roles of an identity.
    fn identity_roles(&self, identity: &IdentityId) -> Result<Vec<RoleKey>, DirectoryError>;

    /// Role names held in one unit; `None` when the identity is not a member.
    fn member_roles(
        &self,
        unit: &OrgUnit,
        identity: &IdentityId,
    ) -> Result<Option<Vec<String>>, DirectoryError>;

    /// Identity-level roles, not scoped to any unit.
    fn global_roles(&self, identity: &IdentityId) -> Result<Vec<String>, DirectoryError>;

    /// Make the identity a member of the unit. Idempotent.
    fn add_member(&self, unit: &OrgUnit, identity: &IdentityId) -> Result<(), DirectoryError>;

    fn assign_member_roles(
        &self,
        unit: &OrgUnit,
        identity: &IdentityId,
        roles: &[ExternalRoleId],
    ) -> Result<(), DirectoryError>;

    fn remove_member_roles(
        &self,
        unit: &OrgUnit,
        identity: &IdentityId,
        roles: &[ExternalRoleId],
    ) -> Result<(), DirectoryError>;
}

impl<D> Directory for Arc<D>
where
    D: Directory + ?Sized,
{
    fn list_all_roles(&self) -> Result<Vec<DirectoryRole>, DirectoryError> {
        (**self).list_all_roles()
    }

    fn org_unit_exists(&self, unit: &OrgUnit) -> Result<bool, DirectoryError> {
        (**self).org_unit_exists(unit)
    }

    fn identity_roles(&self, identity: &IdentityId) -> Result<Vec<RoleKey>, DirectoryError> {
        (**self).identity_roles(identity)
    }

    fn member_roles(
        &self,
        unit: &OrgUnit,
        identity: &IdentityId,
    ) -> Result<Option<Vec<String>>, DirectoryError> {
        (**self).member_roles(unit, identity)
    }

    fn global_roles(&self, identity: &IdentityId) -> Result<Vec<String>, DirectoryError> {
        (**self).global_roles(identity)
    }

    fn add_member(&self, unit: &OrgUnit, identity: &IdentityId) -> Result<(), DirectoryError> {
        (**self).add_member(unit, identity)
    }

    fn assign_member_roles(
        &self,
        unit: &OrgUnit,
        identity: &IdentityId,
        roles: &[ExternalRoleId],
    ) -> Result<(), DirectoryError> {
        (**self).assign_member_roles(unit, identity, roles)
    }

    fn remove_member_roles(
        &self,
        unit: &OrgUnit,
        identity: &IdentityId,
        roles: &[ExternalRoleId],
    ) -> Result<(), DirectoryError> {
        (**self).remove_member_roles(unit, identity, roles)
    }
}
