use super::auth::{AnonymousAuthenticator, Authenticator};
use super::policy::{AccessPolicy, AllowAllPolicy};
use super::user::{Permission, User};
use axum::http::HeaderMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("User '{user}' may not {action} '{resource}'")]
    Forbidden {
        user: String,
        action: Permission,
        resource: String,
    },

    #[error("Invalid security configuration: {0}")]
    Configuration(String),
}

/// Authenticator plus access policy, consulted before every operation.
#[derive(Clone)]
pub struct SecurityGate {
    authenticator: Arc<dyn Authenticator>,
    policy: Arc<dyn AccessPolicy>,
}

impl SecurityGate {
    pub fn new(authenticator: Arc<dyn Authenticator>, policy: Arc<dyn AccessPolicy>) -> Self {
        Self {
            authenticator,
            policy,
        }
    }

    /// Anonymous callers, everything allowed.
    pub fn allow_all() -> Self {
        Self::new(Arc::new(AnonymousAuthenticator), Arc::new(AllowAllPolicy))
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User, SecurityError> {
        self.authenticator.authenticate(headers).await.inspect_err(|err| {
            warn!(error = %err, "authentication rejected");
        })
    }

    pub async fn authorize_read(&self, user: &User, resource: &str) -> Result<(), SecurityError> {
        self.authorize(user, Permission::Read, resource).await
    }

    pub async fn authorize_write(&self, user: &User, resource: &str) -> Result<(), SecurityError> {
        self.authorize(user, Permission::Write, resource).await
    }

    pub async fn authorize_delete(&self, user: &User, resource: &str) -> Result<(), SecurityError> {
        self.authorize(user, Permission::Delete, resource).await
    }

    async fn authorize(
        &self,
        user: &User,
        action: Permission,
        resource: &str,
    ) -> Result<(), SecurityError> {
        self.policy
            .authorize(user, action, resource)
            .await
            .inspect_err(|err| {
                warn!(user = user.username(), %action, resource, error = %err, "access denied");
            })
    }
}

impl Default for SecurityGate {
    fn default() -> Self {
        Self::allow_all()
    }
}
