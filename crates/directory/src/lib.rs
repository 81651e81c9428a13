//! Identity directory boundary: the external collaborator that owns org units,
//! roles and memberships.
//!
//! The policy engine never talks to the directory; callers read from it,
//! hand resolved inputs to the engine and write back accepted changes.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{DirectorySnapshot, IdentitySnapshot, InMemoryDirectory};
pub use r#trait::{Directory, DirectoryError, DirectoryRole};
