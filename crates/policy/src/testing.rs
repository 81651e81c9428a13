//! Shared fixtures for unit tests.

use rolegate_core::{ExternalRoleId, OrgUnit, RoleKey};

use crate::catalog::{LiveRole, RoleCatalog};
use crate::config::PolicyConfig;

pub fn live_roles() -> Vec<LiveRole> {
    PolicyConfig::default()
        .divisions
        .iter()
        .flat_map(|d| d.roles.iter())
        .map(|name| LiveRole {
            name: name.clone(),
            external_id: ExternalRoleId::new(format!("rol_{name}")).unwrap(),
        })
        .collect()
}

pub fn catalog() -> RoleCatalog {
    RoleCatalog::build(&PolicyConfig::default(), live_roles()).unwrap()
}

pub fn key(raw: &str) -> RoleKey {
    raw.parse().unwrap()
}

pub fn keys(raw: &[&str]) -> Vec<RoleKey> {
    raw.iter().map(|r| key(r)).collect()
}

pub fn unit(top: &str, sub: &str) -> OrgUnit {
    OrgUnit::parse(top, sub).unwrap()
}
