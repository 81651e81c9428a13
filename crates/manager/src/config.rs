use std::path::PathBuf;

use rolegate_policy::{ConfigError, PolicyConfig};

/// Policy document path. Unset means the built-in taxonomy.
pub const POLICY_PATH_VAR: &str = "ROLEGATE_POLICY_PATH";

/// JSON snapshot seeding the in-memory directory.
pub const DIRECTORY_SNAPSHOT_VAR: &str = "ROLEGATE_DIRECTORY_SNAPSHOT";

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub policy: PolicyConfig,
    pub directory_snapshot: Option<PathBuf>,
}

impl ManagerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let policy = match lookup(POLICY_PATH_VAR).filter(|p| !p.trim().is_empty()) {
            Some(path) => {
                tracing::info!(path = %path, "loading policy configuration");
                PolicyConfig::from_path(path)?
            }
            None => {
                tracing::warn!("{POLICY_PATH_VAR} not set; using built-in role taxonomy");
                PolicyConfig::default()
            }
        };

        let directory_snapshot = lookup(DIRECTORY_SNAPSHOT_VAR)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            policy,
            directory_snapshot,
        })
    }
}
