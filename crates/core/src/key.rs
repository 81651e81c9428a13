//! Structured role key: "identity holds `role` in `unit`".
//!
//! The textual form `top:sub:role` (e.g. `a:a1:Admin PPE`) is only ever produced
//! and consumed here.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::KeyError;
use crate::org::{OrgUnit, SubUnit, TopLevelUnit};

pub(crate) const SEPARATOR: char = ':';

/// A role held (or requested) in one organizational unit.
///
/// Ordered by unit then role name; since [`OrgUnit`] orders by top-level unit
/// first, every key of one top-level unit sits in one contiguous run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleKey {
    pub unit: OrgUnit,
    pub role: String,
}

impl RoleKey {
    pub fn new(unit: OrgUnit, role: impl Into<String>) -> Result<Self, KeyError> {
        let role = role.into();
        if role.is_empty() {
            return Err(KeyError::empty("role"));
        }
        if role.contains(SEPARATOR) {
            return Err(KeyError::malformed(role));
        }
        Ok(Self { unit, role })
    }

    /// Build from three raw segments.
    pub fn from_parts(top_level: &str, sub_unit: &str, role: &str) -> Result<Self, KeyError> {
        Self::new(OrgUnit::parse(top_level, sub_unit)?, role)
    }

    pub fn top_level(&self) -> &TopLevelUnit {
        &self.unit.top_level
    }

    pub fn sub_unit(&self) -> &SubUnit {
        &self.unit.sub_unit
    }

    pub fn role(&self) -> &str {
        &self.role
    }
}

impl FromStr for RoleKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(SEPARATOR);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(top), Some(sub), Some(role), None)
                if !top.is_empty() && !sub.is_empty() && !role.is_empty() =>
            {
                Self::from_parts(top, sub, role)
            }
            _ => Err(KeyError::malformed(s)),
        }
    }
}

impl core::fmt::Display for RoleKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.unit.top_level, self.unit.sub_unit, self.role
        )
    }
}

impl TryFrom<String> for RoleKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoleKey> for String {
    fn from(value: RoleKey) -> Self {
        value.to_string()
    }
}
