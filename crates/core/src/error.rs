//! Key parsing errors.

use thiserror::Error;

/// Failure to decompose a textual key into its structured parts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key does not have the expected `top:sub:role` shape.
    #[error("role '{0}' is not in the expected top:sub:role format")]
    Malformed(String),

    /// A segment that must carry a value is empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
}

impl KeyError {
    pub fn malformed(raw: impl Into<String>) -> Self {
        Self::Malformed(raw.into())
    }

    pub fn empty(field: &'static str) -> Self {
        Self::Empty { field }
    }
}
