use crate::security::ApiKey;
use crate::storage::DurabilityMode;
use crate::web::ListLimits;
use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("default list limit {default} exceeds maximum {max}")]
    LimitOutOfRange { default: usize, max: usize },

    #[error("maximum list limit must be greater than zero")]
    ZeroMaxLimit,

    #[error("bcrypt cost {0} is outside 4..=31")]
    BcryptCost(u32),
}

/// Server configuration. Every option can also be set through its
/// `AUTORESTDB_*` environment variable.
#[derive(Debug, Clone, Parser)]
#[command(name = "autorestdb")]
#[command(about = "Infers schemas from JSON documents and serves them as REST collections")]
pub struct AppConfig {
    #[arg(long, env = "AUTORESTDB_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "AUTORESTDB_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory for the WAL and snapshot; data stays in memory when absent
    #[arg(long, env = "AUTORESTDB_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// sync, async or none
    #[arg(long, env = "AUTORESTDB_DURABILITY", default_value = "async")]
    pub durability: DurabilityMode,

    /// WAL entries between automatic checkpoints, 0 disables them
    #[arg(long, env = "AUTORESTDB_CHECKPOINT_THRESHOLD", default_value_t = 1000)]
    pub checkpoint_threshold: usize,

    #[arg(long, env = "AUTORESTDB_DEFAULT_LIMIT", default_value_t = 100)]
    pub default_limit: usize,

    #[arg(long, env = "AUTORESTDB_MAX_LIMIT", default_value_t = 1000)]
    pub max_limit: usize,

    /// Comma separated `name:key[:perm+perm]`; anonymous access when empty
    #[arg(long = "api-key", env = "AUTORESTDB_API_KEYS", value_delimiter = ',')]
    pub api_keys: Vec<ApiKey>,

    #[arg(long, env = "AUTORESTDB_BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_limit == 0 {
            return Err(ConfigError::ZeroMaxLimit);
        }
        if self.default_limit > self.max_limit {
            return Err(ConfigError::LimitOutOfRange {
                default: self.default_limit,
                max: self.max_limit,
            });
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::BcryptCost(self.bcrypt_cost));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn list_limits(&self) -> ListLimits {
        ListLimits {
            default: self.default_limit,
            max: self.max_limit,
        }
    }
}
