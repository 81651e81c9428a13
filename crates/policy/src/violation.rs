//! Validation report model.
//!
//! Violations are collected, never short-circuited: a caller sees every
//! problem with a proposed role set in one report.

use serde::Serialize;
use thiserror::Error;

use rolegate_core::{IdentityId, KeyError, OrgUnit, RoleKey, TopLevelUnit};

use crate::catalog::Division;

/// One rejected entry (or combination of entries) of a proposed role set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("role {raw} is not in the expected top:sub:role format")]
    MalformedRole { raw: String },

    #[error("role function not found: {role}")]
    UnknownRole { role: String, units: Vec<OrgUnit> },

    #[error("organizational unit {unit} does not exist")]
    UnknownOrgUnit { unit: OrgUnit },

    #[error("roles in {top_level} may not cross-function different divisions: {expected}, {found} (role {role})")]
    DivisionConflict {
        top_level: TopLevelUnit,
        expected: Division,
        found: Division,
        role: String,
    },

    #[error("roles in {top_level} may not contain {first} and {second} at the same time")]
    MutualExclusionConflict {
        top_level: TopLevelUnit,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MalformedRole,
    UnknownRole,
    UnknownOrgUnit,
    DivisionConflict,
    MutualExclusionConflict,
}

impl Violation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::MalformedRole { .. } => ViolationKind::MalformedRole,
            Violation::UnknownRole { .. } => ViolationKind::UnknownRole,
            Violation::UnknownOrgUnit { .. } => ViolationKind::UnknownOrgUnit,
            Violation::DivisionConflict { .. } => ViolationKind::DivisionConflict,
            Violation::MutualExclusionConflict { .. } => ViolationKind::MutualExclusionConflict,
        }
    }
}

/// All violations found for one identity's proposed role set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationReport {
    pub identity: IdentityId,
    pub violations: Vec<Violation>,
}

impl ViolationReport {
    pub fn new(identity: IdentityId) -> Self {
        Self {
            identity,
            violations: Vec::new(),
        }
    }

    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind() == kind).count()
    }

    /// Human-readable messages, one per violation.
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

/// Parse textual `top:sub:role` keys, turning each unparsable entry into a
/// [`Violation::MalformedRole`].
pub fn parse_keys<S: AsRef<str>>(raw: &[S]) -> (Vec<RoleKey>, Vec<Violation>) {
    let mut keys = Vec::with_capacity(raw.len());
    let mut malformed = Vec::new();

    for entry in raw {
        let entry = entry.as_ref();
        match entry.parse::<RoleKey>() {
            Ok(key) => keys.push(key),
            Err(KeyError::Malformed(_) | KeyError::Empty { .. }) => {
                malformed.push(Violation::MalformedRole {
                    raw: entry.to_string(),
                });
            }
        }
    }

    (keys, malformed)
}
