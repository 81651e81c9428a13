use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use rolegate_core::{ExternalRoleId, IdentityId, OrgUnit, RoleKey};

use super::r#trait::{Directory, DirectoryError, DirectoryRole};

/// Serializable directory contents, used to seed an [`InMemoryDirectory`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub roles: Vec<DirectoryRole>,
    #[serde(default)]
    pub org_units: Vec<OrgUnit>,
    #[serde(default)]
    pub identities: Vec<IdentitySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub id: IdentityId,
    #[serde(default)]
    pub global_roles: Vec<String>,
    #[serde(default)]
    pub roles: Vec<RoleKey>,
}

#[derive(Debug, Default, Clone)]
struct IdentityRecord {
    global_roles: BTreeSet<String>,
    memberships: BTreeMap<OrgUnit, BTreeSet<ExternalRoleId>>,
}

#[derive(Debug, Default)]
struct State {
    roles: BTreeMap<String, ExternalRoleId>,
    role_names: HashMap<ExternalRoleId, String>,
    units: BTreeSet<OrgUnit>,
    identities: HashMap<IdentityId, IdentityRecord>,
}

impl State {
    fn identity(&self, identity: &IdentityId) -> Result<&IdentityRecord, DirectoryError> {
        self.identities
            .get(identity)
            .ok_or_else(|| DirectoryError::NotFound(format!("identity {identity}")))
    }

    fn identity_mut(&mut self, identity: &IdentityId) -> Result<&mut IdentityRecord, DirectoryError> {
        self.identities
            .get_mut(identity)
            .ok_or_else(|| DirectoryError::NotFound(format!("identity {identity}")))
    }

    fn require_unit(&self, unit: &OrgUnit) -> Result<(), DirectoryError> {
        if self.units.contains(unit) {
            Ok(())
        } else {
            Err(DirectoryError::NotFound(format!("organization {unit}")))
        }
    }

    fn role_name(&self, id: &ExternalRoleId) -> Result<&str, DirectoryError> {
        self.role_names
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| DirectoryError::UnknownRoleId(id.clone()))
    }
}

/// In-memory identity directory.
///
/// Intended for tests/dev. Reachability can be toggled to exercise the
/// directory-unavailable path.
#[derive(Debug)]
pub struct InMemoryDirectory {
    state: RwLock<State>,
    available: AtomicBool,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self {
            state: RwLock::new(State::default()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a directory from a snapshot. Every identity role must reference an
    /// existing unit and role.
    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Result<Self, DirectoryError> {
        let directory = Self::new();
        for role in snapshot.roles {
            directory.insert_role(role.name, role.external_id)?;
        }
        for unit in snapshot.org_units {
            directory.insert_org_unit(unit)?;
        }
        for identity in snapshot.identities {
            directory.insert_identity(identity.id.clone(), identity.global_roles)?;
            for key in identity.roles {
                let id = directory
                    .read()?
                    .roles
                    .get(key.role())
                    .cloned()
                    .ok_or_else(|| {
                        DirectoryError::Invalid(format!("identity {} holds unknown role {key}", identity.id))
                    })?;
                directory.add_member(&key.unit, &identity.id)?;
                directory.assign_member_roles(&key.unit, &identity.id, &[id])?;
            }
        }
        Ok(directory)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, DirectoryError> {
        let snapshot: DirectorySnapshot =
            serde_json::from_str(raw).map_err(|e| DirectoryError::Invalid(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    /// Export the current contents.
    pub fn snapshot(&self) -> Result<DirectorySnapshot, DirectoryError> {
        let state = self.read()?;
        let roles = state
            .roles
            .iter()
            .map(|(name, id)| DirectoryRole {
                name: name.clone(),
                external_id: id.clone(),
            })
            .collect();

        let mut identities = Vec::with_capacity(state.identities.len());
        for (id, record) in &state.identities {
            identities.push(IdentitySnapshot {
                id: id.clone(),
                global_roles: record.global_roles.iter().cloned().collect(),
                roles: Self::keys_of(&state, record)?,
            });
        }
        identities.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(DirectorySnapshot {
            roles,
            org_units: state.units.iter().cloned().collect(),
            identities,
        })
    }

    /// Simulate the directory going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn insert_role(
        &self,
        name: impl Into<String>,
        id: ExternalRoleId,
    ) -> Result<(), DirectoryError> {
        let name = name.into();
        let mut state = self.write()?;
        if let Some(existing) = state.role_names.get(&id) {
            if *existing != name {
                return Err(DirectoryError::Invalid(format!(
                    "role id {id} already used by {existing}"
                )));
            }
        }
        state.role_names.insert(id.clone(), name.clone());
        if let Some(previous) = state.roles.insert(name, id.clone()) {
            if previous != id {
                state.role_names.remove(&previous);
            }
        }
        Ok(())
    }

    pub fn insert_org_unit(&self, unit: OrgUnit) -> Result<(), DirectoryError> {
        self.write()?.units.insert(unit);
        Ok(())
    }

    pub fn insert_identity(
        &self,
        identity: IdentityId,
        global_roles: impl IntoIterator<Item = String>,
    ) -> Result<(), DirectoryError> {
        let mut state = self.write()?;
        let record = state.identities.entry(identity).or_default();
        record.global_roles.extend(global_roles);
        Ok(())
    }

    fn ensure_available(&self) -> Result<(), DirectoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DirectoryError::Unavailable("directory is not reachable".to_string()))
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, DirectoryError> {
        self.ensure_available()?;
        self.state
            .read()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, DirectoryError> {
        self.ensure_available()?;
        self.state
            .write()
            .map_err(|_| DirectoryError::Unavailable("lock poisoned".to_string()))
    }

    fn keys_of(state: &State, record: &IdentityRecord) -> Result<Vec<RoleKey>, DirectoryError> {
        let mut keys = Vec::new();
        for (unit, ids) in &record.memberships {
            for id in ids {
                let key = RoleKey::new(unit.clone(), state.role_name(id)?)
                    .map_err(|e| DirectoryError::Invalid(e.to_string()))?;
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl Directory for InMemoryDirectory {
    fn list_all_roles(&self) -> Result<Vec<DirectoryRole>, DirectoryError> {
        let state = self.read()?;
        Ok(state
            .roles
            .iter()
            .map(|(name, id)| DirectoryRole {
                name: name.clone(),
                external_id: id.clone(),
            })
            .collect())
    }

    fn org_unit_exists(&self, unit: &OrgUnit) -> Result<bool, DirectoryError> {
        Ok(self.read()?.units.contains(unit))
    }

    fn identity_roles(&self, identity: &IdentityId) -> Result<Vec<RoleKey>, DirectoryError> {
        let state = self.read()?;
        let record = state.identity(identity)?;
        Self::keys_of(&state, record)
    }

    fn member_roles(
        &self,
        unit: &OrgUnit,
        identity: &IdentityId,
    ) -> Result<Option<Vec<String>>, DirectoryError> {
        let state = self.read()?;
        state.require_unit(unit)?;
        let Some(ids) = state.identity(identity)?.memberships.get(unit) else {
            return Ok(None);
        };
        let mut names = Vec::with_capacity(ids.len());
        for id in ids {
            names.push(state.role_name(id)?.to_string());
        }
        names.sort();
        Ok(Some(names))
    }

    fn global_roles(&self, identity: &IdentityId) -> Result<Vec<String>, DirectoryError> {
        let state = self.read()?;
        Ok(state.identity(identity)?.global_roles.iter().cloned().collect())
    }

    fn add_member(&self, unit: &OrgUnit, identity: &IdentityId) -> Result<(), DirectoryError> {
        let mut state = self.write()?;
        state.require_unit(unit)?;
        state
            .identity_mut(identity)?
            .memberships
            .entry(unit.clone())
            .or_default();
        Ok(())
    }

    fn assign_member_roles(
        &self,
        unit: &OrgUnit,
        identity: &IdentityId,
        roles: &[ExternalRoleId],
    ) -> Result<(), DirectoryError> {
        let mut state = self.write()?;
        state.require_unit(unit)?;
        for id in roles {
            state.role_name(id)?;
        }
        let membership = state
            .identity_mut(identity)?
            .memberships
            .get_mut(unit)
            .ok_or_else(|| DirectoryError::NotFound(format!("membership of {identity} in {unit}")))?;
        membership.extend(roles.iter().cloned());
        tracing::debug!(%unit, %identity, count = roles.len(), "member roles assigned");
        Ok(())
    }

    fn remove_member_roles(
        &self,
        unit: &OrgUnit,
        identity: &IdentityId,
        roles: &[ExternalRoleId],
    ) -> Result<(), DirectoryError> {
        let mut state = self.write()?;
        state.require_unit(unit)?;
        if let Some(membership) = state.identity_mut(identity)?.memberships.get_mut(unit) {
            for id in roles {
                membership.remove(id);
            }
        }
        tracing::debug!(%unit, %identity, count = roles.len(), "member roles removed");
        Ok(())
    }
}
