//! Nested request body: top-level units, their sub-units, and role names.

use serde::{Deserialize, Serialize};

use rolegate_core::RoleKey;
use rolegate_policy::{Violation, parse_keys};

use crate::error::ManagerError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    #[serde(default)]
    pub klpd: Vec<TopLevelRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopLevelRequest {
    pub name: String,
    #[serde(rename = "satuan-kerja", default)]
    pub sub_units: Vec<SubUnitRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubUnitRequest {
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl AssignmentRequest {
    pub fn from_json_str(raw: &str) -> Result<Self, ManagerError> {
        serde_json::from_str(raw).map_err(|e| ManagerError::InvalidRequest(e.to_string()))
    }

    /// Add one role, reusing existing unit entries.
    pub fn with_role(mut self, top_level: &str, sub_unit: &str, role: &str) -> Self {
        let top = match self.klpd.iter().position(|t| t.name == top_level) {
            Some(i) => &mut self.klpd[i],
            None => {
                self.klpd.push(TopLevelRequest {
                    name: top_level.to_string(),
                    sub_units: Vec::new(),
                });
                let last = self.klpd.len() - 1;
                &mut self.klpd[last]
            }
        };
        match top.sub_units.iter_mut().find(|s| s.name == sub_unit) {
            Some(sub) => sub.roles.push(role.to_string()),
            None => top.sub_units.push(SubUnitRequest {
                name: sub_unit.to_string(),
                roles: vec![role.to_string()],
            }),
        }
        self
    }

    /// Textual `top:sub:role` keys in request order.
    pub fn raw_keys(&self) -> Vec<String> {
        self.klpd
            .iter()
            .flat_map(|top| {
                top.sub_units.iter().flat_map(move |sub| {
                    sub.roles
                        .iter()
                        .map(move |role| format!("{}:{}:{}", top.name, sub.name, role))
                })
            })
            .collect()
    }

    /// Structured keys in request order, plus a `MalformedRole` for every
    /// entry whose names do not form a valid key.
    pub fn flatten(&self) -> (Vec<RoleKey>, Vec<Violation>) {
        parse_keys(&self.raw_keys())
    }

    pub fn is_empty(&self) -> bool {
        self.klpd
            .iter()
            .flat_map(|top| &top.sub_units)
            .all(|sub| sub.roles.is_empty())
    }
}

impl<'a> FromIterator<&'a RoleKey> for AssignmentRequest {
    fn from_iter<T: IntoIterator<Item = &'a RoleKey>>(iter: T) -> Self {
        iter.into_iter().fold(Self::default(), |request, key| {
            request.with_role(key.top_level().as_str(), key.sub_unit().as_str(), key.role())
        })
    }
}
