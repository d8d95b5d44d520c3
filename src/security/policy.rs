use super::gate::SecurityError;
use super::user::{Permission, User};
use async_trait::async_trait;

/// Decides whether `user` may perform `action` on `resource` (a collection
/// name or [`SYSTEM_RESOURCE`](super::SYSTEM_RESOURCE)).
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn authorize(
        &self,
        user: &User,
        action: Permission,
        resource: &str,
    ) -> Result<(), SecurityError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

#[async_trait]
impl AccessPolicy for AllowAllPolicy {
    async fn authorize(&self, _: &User, _: Permission, _: &str) -> Result<(), SecurityError> {
        Ok(())
    }
}

/// Grants an action when the user holds the matching permission (or admin).
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionPolicy;

#[async_trait]
impl AccessPolicy for PermissionPolicy {
    async fn authorize(
        &self,
        user: &User,
        action: Permission,
        resource: &str,
    ) -> Result<(), SecurityError> {
        if user.has_permission(action) {
            return Ok(());
        }
        Err(SecurityError::Forbidden {
            user: user.username().to_string(),
            action,
            resource: resource.to_string(),
        })
    }
}
