//! Authentication and authorization in front of every collection operation.

pub mod auth;
pub mod gate;
pub mod policy;
pub mod user;

pub use auth::{AnonymousAuthenticator, ApiKey, ApiKeyAuthenticator, Authenticator};
pub use gate::{SecurityError, SecurityGate};
pub use policy::{AccessPolicy, AllowAllPolicy, PermissionPolicy};
pub use user::{Permission, User};

/// Resource name used to authorize uploads, which may create collections.
pub const SYSTEM_RESOURCE: &str = "system";
