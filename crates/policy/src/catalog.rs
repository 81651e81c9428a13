//! Read-only role catalog: role name → (division, external id).
//!
//! Built once from the policy hierarchy plus the directory's live role list,
//! then shared by reference. Reload means building a new catalog.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rolegate_core::ExternalRoleId;

use crate::config::{ExclusivePair, PolicyConfig};

/// Coarse functional category of a role. Only the names declared by the
/// hierarchy table exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Division(Cow<'static, str>);

impl Division {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Division {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A role as reported by the directory. The directory's own notion of
/// division (if any) is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRole {
    pub name: String,
    pub external_id: ExternalRoleId,
}

/// A catalogued role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRole {
    pub name: String,
    pub division: Division,
    pub external_id: ExternalRoleId,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("role directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("role '{0}' is declared in the hierarchy but missing from the directory")]
    MissingInDirectory(String),
}

#[derive(Debug, Clone)]
pub struct RoleCatalog {
    roles: HashMap<String, CatalogRole>,
    exclusive_pairs: Vec<ExclusivePair>,
}

impl RoleCatalog {
    /// Build the catalog from an already-validated config and the directory's
    /// live role list.
    ///
    /// Live roles the hierarchy does not mention (e.g. the identity-level
    /// superuser marker) are not catalogued.
    pub fn build(
        config: &PolicyConfig,
        live: impl IntoIterator<Item = LiveRole>,
    ) -> Result<Self, CatalogError> {
        let external_ids: HashMap<String, ExternalRoleId> = live
            .into_iter()
            .map(|r| (r.name, r.external_id))
            .collect();

        let mut roles = HashMap::new();

        for spec in &config.divisions {
            let division = Division::new(spec.name.clone());
            for name in &spec.roles {
                let external_id = external_ids
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CatalogError::MissingInDirectory(name.clone()))?;
                roles.insert(
                    name.clone(),
                    CatalogRole {
                        name: name.clone(),
                        division: division.clone(),
                        external_id,
                    },
                );
            }
        }

        for name in external_ids.keys().filter(|n| !roles.contains_key(*n)) {
            tracing::debug!(role = %name, "directory role outside the hierarchy; not catalogued");
        }

        tracing::info!(
            roles = roles.len(),
            divisions = config.divisions.len(),
            "role catalog built"
        );

        Ok(Self {
            roles,
            exclusive_pairs: config.exclusive_pairs.clone(),
        })
    }

    /// Fetch the live role list and build. A fetch failure is fatal for the
    /// caller: there is no catalog without the directory.
    pub fn load<F, E>(config: &PolicyConfig, fetch: F) -> Result<Self, CatalogError>
    where
        F: FnOnce() -> Result<Vec<LiveRole>, E>,
        E: Display,
    {
        let live = fetch().map_err(|e| CatalogError::DirectoryUnavailable(e.to_string()))?;
        Self::build(config, live)
    }

    pub fn get(&self, role: &str) -> Option<&CatalogRole> {
        self.roles.get(role)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    pub fn division_of(&self, role: &str) -> Option<&Division> {
        self.roles.get(role).map(|r| &r.division)
    }

    pub fn external_id_of(&self, role: &str) -> Option<&ExternalRoleId> {
        self.roles.get(role).map(|r| &r.external_id)
    }

    pub fn exclusive_pairs(&self) -> &[ExclusivePair] {
        &self.exclusive_pairs
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
