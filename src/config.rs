// # Server Configuration
//
// Environment-driven configuration. Every variable is optional and falls
// back to a development default.

use crate::error::{Result, SyncError};
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_REDIS_ADDR: &str = "redis://127.0.0.1:6379";
const DEFAULT_JWT_SECRET: &str = "deltasync-dev-secret";

/// How many tenant stores the manager keeps open at once.
pub const DEFAULT_STORE_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,

    /// Directory holding the identity database and one store file per tenant
    pub data_dir: PathBuf,

    /// Coordination service endpoint (full URL)
    pub redis_url: String,

    /// HS256 key for bearer token verification
    pub jwt_secret: String,

    /// Optional static asset root
    pub static_dir: Option<PathBuf>,

    /// Capacity of the tenant store LRU cache
    pub store_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            redis_url: DEFAULT_REDIS_ADDR.to_string(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            static_dir: None,
            store_cache_capacity: DEFAULT_STORE_CACHE_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| SyncError::Config(format!("PORT is not a valid port: {raw}")))?,
            Err(_) => DEFAULT_PORT,
        };

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        let redis_url = std::env::var("REDIS_ADDR")
            .map(|addr| normalize_redis_addr(&addr))
            .unwrap_or_else(|_| DEFAULT_REDIS_ADDR.to_string());

        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set, using development default");
                DEFAULT_JWT_SECRET.to_string()
            }
        };

        let static_dir = std::env::var("STATIC_DIR").ok().map(PathBuf::from);

        let config = Self {
            port,
            data_dir,
            redis_url,
            jwt_secret,
            static_dir,
            store_cache_capacity: DEFAULT_STORE_CACHE_CAPACITY,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.store_cache_capacity == 0 {
            return Err(SyncError::Config(
                "store_cache_capacity must be greater than 0".to_string(),
            ));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(SyncError::Config("DATA_DIR must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Accept either a bare `host:port` or a full URL for the coordination
/// service address.
fn normalize_redis_addr(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_port_gets_scheme() {
        assert_eq!(normalize_redis_addr("localhost:6379"), "redis://localhost:6379");
    }

    #[test]
    fn full_url_passes_through() {
        assert_eq!(
            normalize_redis_addr("rediss://cache.internal:6380"),
            "rediss://cache.internal:6380"
        );
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_cache_capacity_rejected() {
        let config = Config {
            store_cache_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
