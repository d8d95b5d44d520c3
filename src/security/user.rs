use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// User permission level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// List and fetch records
    Read,
    /// Upload, insert and update records
    Write,
    /// Delete records
    Delete,
    /// Everything above
    Admin,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "delete" => Ok(Self::Delete),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown permission '{other}'")),
        }
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    username: String,
    permissions: Vec<Permission>,
}

impl User {
    pub fn new(username: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            username: username.into(),
            permissions,
        }
    }

    /// Caller of a gate without authentication. Holds no permissions.
    pub fn anonymous() -> Self {
        Self::new("anonymous", Vec::new())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Admin implies every other permission.
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&Permission::Admin) || self.permissions.contains(&permission)
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.permissions.contains(&Permission::Admin)
    }
}
