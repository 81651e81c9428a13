//! Opaque identifiers handed out by the identity directory.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Identifier of an identity (the directory's subject, e.g. `auth0|64b0...`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

/// Directory-side handle of a role. Only meaningful when talking to the directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalRoleId(String);

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a raw identifier, rejecting empty values.
            pub fn new(raw: impl Into<String>) -> Result<Self, KeyError> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    return Err(KeyError::empty($name));
                }
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = KeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_newtype!(IdentityId, "IdentityId");
impl_string_newtype!(ExternalRoleId, "ExternalRoleId");
