//! Domain primitives shared by the policy engine and its collaborators.
//!
//! Pure data: no IO, no policy decisions.

pub mod error;
pub mod id;
pub mod key;
pub mod org;

pub use error::KeyError;
pub use id::{ExternalRoleId, IdentityId};
pub use key::RoleKey;
pub use org::{OrgUnit, SubUnit, TopLevelUnit};
