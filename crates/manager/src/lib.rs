//! Role management: authority, validation and directory writes for one request.

pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod request;

pub use config::ManagerConfig;
pub use context::RequestContext;
pub use error::ManagerError;
pub use manager::{AppliedChange, RoleManager};
pub use request::{AssignmentRequest, SubUnitRequest, TopLevelRequest};
