//! Policy configuration: the division hierarchy, mutually-exclusive role pairs
//! and the authority delegation table.
//!
//! Loaded once at startup (JSON). The built-in [`PolicyConfig::default`]
//! reproduces the stock procurement taxonomy.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read policy config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("division name cannot be empty")]
    EmptyDivision,

    #[error("division '{0}' is declared more than once")]
    DuplicateDivision(String),

    #[error("role name '{0}' is invalid (empty or contains ':')")]
    InvalidRoleName(String),

    #[error("role '{role}' belongs to both '{first}' and '{second}'")]
    DuplicateRole {
        role: String,
        first: String,
        second: String,
    },

    #[error("{context} references unknown role '{role}'")]
    UnknownRole { context: &'static str, role: String },

    #[error("exclusive pair must name two different roles, got '{0}' twice")]
    DegeneratePair(String),

    #[error("superuser marker '{0}' must not be a unit-scoped role")]
    SuperuserInHierarchy(String),
}

/// One division and the ordered role names it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionSpec {
    pub name: String,
    pub roles: Vec<String>,
}

/// Two roles that one identity may never hold together inside one top-level unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusivePair(pub String, pub String);

impl ExclusivePair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self(first.into(), second.into())
    }

    pub fn first(&self) -> &str {
        &self.0
    }

    pub fn second(&self) -> &str {
        &self.1
    }
}

/// "Holders of `holder` in a unit may assign any role there except `except`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRule {
    pub holder: String,
    #[serde(default)]
    pub except: Vec<String>,
}

impl GrantRule {
    pub fn permits(&self, target_role: &str) -> bool {
        !self.except.iter().any(|r| r == target_role)
    }
}

/// Authority delegation table. Rules are evaluated in order; the first rule
/// whose holder the assigner has in the target unit decides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Identity-level role that lifts unit scoping.
    pub superuser_role: String,
    pub rules: Vec<GrantRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub divisions: Vec<DivisionSpec>,
    #[serde(default)]
    pub exclusive_pairs: Vec<ExclusivePair>,
    pub authority: AuthorityConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        fn names(roles: &[&str]) -> Vec<String> {
            roles.iter().map(|r| r.to_string()).collect()
        }

        Self {
            divisions: vec![
                DivisionSpec {
                    name: "Management".to_string(),
                    roles: names(&["Admin PPE", "Admin Agency", "Verifikator", "Helpdesk"]),
                },
                DivisionSpec {
                    name: "ProcurementActors".to_string(),
                    roles: names(&["PPK", "KUPBJ", "Anggota Pokmil", "PP"]),
                },
                DivisionSpec {
                    name: "Auditor".to_string(),
                    roles: names(&["Auditor"]),
                },
            ],
            exclusive_pairs: vec![ExclusivePair::new("PP", "PPK")],
            authority: AuthorityConfig {
                superuser_role: "Super Admin".to_string(),
                rules: vec![
                    GrantRule {
                        holder: "Admin PPE".to_string(),
                        except: names(&["Admin PPE", "Auditor"]),
                    },
                    GrantRule {
                        holder: "Admin Agency".to_string(),
                        except: names(&["Admin PPE", "Auditor", "Admin Agency"]),
                    },
                ],
            },
        }
    }
}

impl PolicyConfig {
    /// Parse and validate a JSON policy document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON policy file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Check structural consistency of the table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_divisions: HashSet<&str> = HashSet::new();
        let mut owner: HashMap<&str, &str> = HashMap::new();

        for division in &self.divisions {
            if division.name.trim().is_empty() {
                return Err(ConfigError::EmptyDivision);
            }
            if !seen_divisions.insert(division.name.as_str()) {
                return Err(ConfigError::DuplicateDivision(division.name.clone()));
            }
            for role in &division.roles {
                if role.is_empty() || role.contains(':') {
                    return Err(ConfigError::InvalidRoleName(role.clone()));
                }
                if let Some(first) = owner.insert(role.as_str(), division.name.as_str()) {
                    return Err(ConfigError::DuplicateRole {
                        role: role.clone(),
                        first: first.to_string(),
                        second: division.name.clone(),
                    });
                }
            }
        }

        let known = |context: &'static str, role: &str| {
            if owner.contains_key(role) {
                Ok(())
            } else {
                Err(ConfigError::UnknownRole {
                    context,
                    role: role.to_string(),
                })
            }
        };

        for pair in &self.exclusive_pairs {
            known("exclusive pair", pair.first())?;
            known("exclusive pair", pair.second())?;
            if pair.first() == pair.second() {
                return Err(ConfigError::DegeneratePair(pair.0.clone()));
            }
        }

        if owner.contains_key(self.authority.superuser_role.as_str()) {
            return Err(ConfigError::SuperuserInHierarchy(
                self.authority.superuser_role.clone(),
            ));
        }
        for rule in &self.authority.rules {
            known("authority rule holder", rule.holder.as_str())?;
            for role in &rule.except {
                known("authority rule exception", role.as_str())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        PolicyConfig::default().validate().unwrap();
    }

    #[test]
    fn parses_json_document() {
        let raw = r#"{
            "divisions": [
                {"name": "Ops", "roles": ["Lead", "Member"]},
                {"name": "Review", "roles": ["Reviewer"]}
            ],
            "exclusive_pairs": [["Lead", "Member"]],
            "authority": {
                "superuser_role": "Root",
                "rules": [{"holder": "Lead", "except": ["Lead"]}]
            }
        }"#;
        let config = PolicyConfig::from_json_str(raw).unwrap();
        assert_eq!(config.divisions.len(), 2);
        assert_eq!(config.exclusive_pairs[0], ExclusivePair::new("Lead", "Member"));
        assert!(config.authority.rules[0].permits("Member"));
        assert!(!config.authority.rules[0].permits("Lead"));
    }

    #[test]
    fn rejects_role_in_two_divisions() {
        let mut config = PolicyConfig::default();
        config.divisions[2].roles.push("PP".to_string());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRole { ref role, .. } if role == "PP"));
    }

    #[test]
    fn rejects_pair_with_unknown_role() {
        let mut config = PolicyConfig::default();
        config.exclusive_pairs.push(ExclusivePair::new("PP", "Ghost"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownRole { role, .. }) if role == "Ghost"
        ));
    }

    #[test]
    fn rejects_superuser_marker_inside_hierarchy() {
        let mut config = PolicyConfig::default();
        config.authority.superuser_role = "Helpdesk".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::SuperuserInHierarchy(_))));
    }

    #[test]
    fn rejects_role_name_with_separator() {
        let mut config = PolicyConfig::default();
        config.divisions[0].roles.push("a:b".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRoleName(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = PolicyConfig::from_path("/nonexistent/rolegate-policy.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
