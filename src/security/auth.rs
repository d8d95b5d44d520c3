use super::gate::SecurityError;
use super::user::{Permission, User};
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Resolves the caller of a request from its headers.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<User, SecurityError>;
}

/// Every request is made by [`User::anonymous`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    async fn authenticate(&self, _: &HeaderMap) -> Result<User, SecurityError> {
        Ok(User::anonymous())
    }
}

/// Plaintext API key as configured: `name:key`, optionally followed by
/// `:perm+perm` (defaults to read, write and delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub name: String,
    pub key: String,
    pub permissions: Vec<Permission>,
}

impl ApiKey {
    pub fn new(name: impl Into<String>, key: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            permissions,
        }
    }
}

impl FromStr for ApiKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');
        let name = parts.next().unwrap_or_default().trim();
        let key = parts.next().unwrap_or_default().trim();
        if name.is_empty() || key.is_empty() {
            return Err(format!("API key '{s}' must look like name:key"));
        }

        let permissions = match parts.next() {
            Some(list) => list
                .split('+')
                .map(str::parse)
                .collect::<Result<Vec<Permission>, _>>()?,
            None => vec![Permission::Read, Permission::Write, Permission::Delete],
        };

        Ok(Self::new(name, key, permissions))
    }
}

type KeyDigest = [u8; 32];

fn digest(key: &str) -> KeyDigest {
    Sha256::digest(key.as_bytes()).into()
}

struct StoredKey {
    hash: String,
    user: User,
}

/// Authenticates `Authorization: Bearer <key>` or `X-Api-Key: <key>` against
/// the configured keys. Plaintext keys are not retained.
///
/// A SHA-256 digest of the presented key selects the candidate. Its bcrypt
/// hash is verified once, on the blocking thread pool, the first time the key
/// is presented; later requests with the same key skip bcrypt.
pub struct ApiKeyAuthenticator {
    keys: HashMap<KeyDigest, StoredKey>,
    verified: RwLock<HashSet<KeyDigest>>,
}

impl ApiKeyAuthenticator {
    pub fn new(keys: Vec<ApiKey>) -> Result<Self, SecurityError> {
        Self::with_cost(keys, bcrypt::DEFAULT_COST)
    }

    /// Hashes keys with the given bcrypt cost (4..=31).
    pub fn with_cost(keys: Vec<ApiKey>, cost: u32) -> Result<Self, SecurityError> {
        let mut stored = HashMap::with_capacity(keys.len());
        for api_key in keys {
            let hash = bcrypt::hash(&api_key.key, cost).map_err(|e| {
                SecurityError::Configuration(format!(
                    "Failed to hash API key '{}': {}",
                    api_key.name, e
                ))
            })?;
            let previous = stored.insert(
                digest(&api_key.key),
                StoredKey {
                    hash,
                    user: User::new(api_key.name.clone(), api_key.permissions),
                },
            );
            if previous.is_some() {
                return Err(SecurityError::Configuration(format!(
                    "API key of '{}' is configured twice",
                    api_key.name
                )));
            }
        }
        Ok(Self {
            keys: stored,
            verified: RwLock::new(HashSet::new()),
        })
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn is_verified(&self, key: &KeyDigest) -> Result<bool, SecurityError> {
        Ok(self.verified.read().map_err(lock_error)?.contains(key))
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<User, SecurityError> {
        let presented = presented_key(headers)
            .ok_or_else(|| SecurityError::Unauthenticated("missing API key".to_string()))?;
        let key_digest = digest(presented);
        let stored = self
            .keys
            .get(&key_digest)
            .ok_or_else(|| SecurityError::Unauthenticated("invalid API key".to_string()))?;

        if !self.is_verified(&key_digest)? {
            let presented = presented.to_string();
            let hash = stored.hash.clone();
            let valid = tokio::task::spawn_blocking(move || bcrypt::verify(presented, &hash))
                .await
                .map_err(|e| SecurityError::Configuration(format!("API key verification failed: {e}")))?
                .unwrap_or(false);
            if !valid {
                return Err(SecurityError::Unauthenticated("invalid API key".to_string()));
            }
            self.verified.write().map_err(lock_error)?.insert(key_digest);
        }

        debug!(user = stored.user.username(), "authenticated API key");
        Ok(stored.user.clone())
    }
}

fn lock_error<T>(err: PoisonError<T>) -> SecurityError {
    SecurityError::Configuration(format!("API key cache lock poisoned: {err}"))
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    let header = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);
    bearer.or(header).filter(|key| !key.is_empty())
}
