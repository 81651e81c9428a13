//! Organizational units: a top-level unit (agency/institution) and the sub-unit
//! inside it where roles are exercised.

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Joins the two segments in a unit's directory name (`top-sub`).
const UNIT_SEPARATOR: char = '-';

/// Outermost organizational grouping. Isolation rules are scoped here.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopLevelUnit(String);

/// Subdivision of a top-level unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubUnit(String);

macro_rules! impl_segment {
    ($t:ty, $field:literal) => {
        impl $t {
            /// Segments may not be empty and may not contain the key separator
            /// or the unit name separator.
            pub fn new(raw: impl Into<String>) -> Result<Self, KeyError> {
                let raw = raw.into();
                if raw.is_empty() {
                    return Err(KeyError::empty($field));
                }
                if raw.contains(crate::key::SEPARATOR) || raw.contains(UNIT_SEPARATOR) {
                    return Err(KeyError::malformed(raw));
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

        impl TryFrom<String> for $t {
            type Error = KeyError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_segment!(TopLevelUnit, "top-level unit");
impl_segment!(SubUnit, "sub-unit");

/// Composite key `(top-level unit, sub-unit)`. Purely a key; no behavior.
///
/// Ordering is by top-level unit first, so all sub-units of one top-level unit
/// form a contiguous range in any ordered container.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrgUnit {
    pub top_level: TopLevelUnit,
    pub sub_unit: SubUnit,
}

impl OrgUnit {
    pub fn new(top_level: TopLevelUnit, sub_unit: SubUnit) -> Self {
        Self {
            top_level,
            sub_unit,
        }
    }

    /// Build from raw segment strings.
    pub fn parse(top_level: &str, sub_unit: &str) -> Result<Self, KeyError> {
        Ok(Self::new(TopLevelUnit::new(top_level)?, SubUnit::new(sub_unit)?))
    }
}

/// The directory name of the unit. Unambiguous since segments never contain
/// the separator.
impl core::fmt::Display for OrgUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{UNIT_SEPARATOR}{}", self.top_level, self.sub_unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_top_level_first() {
        let a9 = OrgUnit::parse("a", "a9").unwrap();
        let b1 = OrgUnit::parse("b", "b1").unwrap();
        assert!(a9 < b1);
    }

    #[test]
    fn segment_rejects_separator() {
        assert!(matches!(TopLevelUnit::new("a:b"), Err(KeyError::Malformed(_))));
        assert_eq!(SubUnit::new(""), Err(KeyError::empty("sub-unit")));
    }

    #[test]
    fn display_joins_with_dash() {
        assert_eq!(OrgUnit::parse("a", "a1").unwrap().to_string(), "a-a1");
    }

    #[test]
    fn segment_rejects_unit_separator() {
        assert!(matches!(TopLevelUnit::new("a-b"), Err(KeyError::Malformed(_))));
        assert!(matches!(SubUnit::new("b-c"), Err(KeyError::Malformed(_))));
        assert!(OrgUnit::parse("a-b", "c").is_err());
        assert!(OrgUnit::parse("a", "b-c").is_err());
    }

    #[test]
    fn deserialize_validates_segments() {
        let ok: OrgUnit = serde_json::from_str(r#"{"top_level":"a","sub_unit":"a1"}"#).unwrap();
        assert_eq!(ok, OrgUnit::parse("a", "a1").unwrap());

        let bad = serde_json::from_str::<OrgUnit>(r#"{"top_level":"","sub_unit":"a1"}"#);
        assert!(bad.is_err());
    }
}
