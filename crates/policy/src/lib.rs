//! Role-assignment policy engine.
//!
//! Given an organizational taxonomy and a read-only [`RoleCatalog`], this crate
//! decides whether a proposed set of role assignments is internally consistent
//! ([`ConstraintValidator`], [`IncrementalMerger`]) and whether an assigner may
//! grant it ([`AuthorityEngine`]).
//!
//! This crate is intentionally decoupled from transport and storage: callers
//! hand in already-resolved role sets and unit lookups.

pub mod authority;
pub mod catalog;
pub mod config;
pub mod merger;
pub mod validator;
pub mod violation;

pub use authority::{AssignerRoles, AuthorityEngine, AuthorityError};
pub use catalog::{CatalogError, CatalogRole, Division, LiveRole, RoleCatalog};
pub use config::{AuthorityConfig, ConfigError, DivisionSpec, ExclusivePair, GrantRule, PolicyConfig};
pub use merger::{CurrentRoles, IncrementalMerger, MergeOutcome};
pub use validator::{AnyUnit, ConstraintValidator, KnownUnits, UnitRegistry};
pub use violation::{Violation, ViolationKind, ViolationReport, parse_keys};

#[cfg(test)]
pub(crate) mod testing;
