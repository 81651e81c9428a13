use thiserror::Error;

use rolegate_directory::DirectoryError;
use rolegate_policy::{AuthorityError, CatalogError, ConfigError, ViolationReport};

use crate::manager::AppliedChange;

/// Request-level outcome of a failed operation. Nothing was applied unless
/// the error is `PartiallyApplied`.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("role assignment rejected with {} violation(s)", .0.len())]
    Rejected(ViolationReport),

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("directory error: {0}")]
    Directory(DirectoryError),

    #[error(transparent)]
    Catalog(CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A directory write failed after earlier writes of the same operation
    /// went through. `applied` lists exactly what the directory now reflects.
    #[error("change partially applied: {source}")]
    PartiallyApplied {
        applied: AppliedChange,
        #[source]
        source: Box<ManagerError>,
    },
}

impl ManagerError {
    /// Only an unreachable directory is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ManagerError::DirectoryUnavailable(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ManagerError::Rejected(_) => "rejected",
            ManagerError::Authority(AuthorityError::NoAdministrativeAccess { .. }) => {
                "no_administrative_access"
            }
            ManagerError::Authority(AuthorityError::Denied { .. }) => "not_allowed",
            ManagerError::DirectoryUnavailable(_) => "directory_unavailable",
            ManagerError::Directory(_) => "directory_error",
            ManagerError::Catalog(_) => "catalog_error",
            ManagerError::Config(_) => "config_error",
            ManagerError::InvalidRequest(_) => "invalid_request",
            ManagerError::PartiallyApplied { .. } => "partially_applied",
        }
    }
}

impl From<DirectoryError> for ManagerError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unavailable(msg) => ManagerError::DirectoryUnavailable(msg),
            other => ManagerError::Directory(other),
        }
    }
}

impl From<CatalogError> for ManagerError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::DirectoryUnavailable(msg) => ManagerError::DirectoryUnavailable(msg),
            other => ManagerError::Catalog(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolegate_core::OrgUnit;

    #[test]
    fn only_unavailability_is_retryable() {
        let unavailable: ManagerError = DirectoryError::Unavailable("timeout".to_string()).into();
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.code(), "directory_unavailable");

        let from_catalog: ManagerError = CatalogError::DirectoryUnavailable("down".to_string()).into();
        assert!(from_catalog.is_retryable());

        let not_found: ManagerError = DirectoryError::NotFound("identity x".to_string()).into();
        assert!(!not_found.is_retryable());

        let denied: ManagerError = AuthorityError::NoAdministrativeAccess {
            unit: OrgUnit::parse("a", "a1").unwrap(),
        }
        .into();
        assert!(!denied.is_retryable());
        assert_eq!(denied.code(), "no_administrative_access");
        assert_eq!(denied.to_string(), "user has no administrator access in a-a1");
    }

    #[test]
    fn partial_application_keeps_the_cause_and_the_applied_change() {
        let key: rolegate_core::RoleKey = "a:a1:Helpdesk".parse().unwrap();
        let err = ManagerError::PartiallyApplied {
            applied: AppliedChange {
                identity: rolegate_core::IdentityId::new("u1").unwrap(),
                added: Vec::new(),
                removed: vec![key],
            },
            source: Box::new(DirectoryError::Unavailable("timeout".to_string()).into()),
        };

        assert_eq!(err.code(), "partially_applied");
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "change partially applied: directory unavailable: timeout"
        );
    }
}
