//! Configuration management

use serde::{Deserialize, Serialize};
use std::env;

use crate::acquire::catalogue::DEFAULT_DATASETS_BASE_URL;
use crate::acquire::{ExtractConfig, FetchConfig};
use crate::storage::StorageConfig;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default CORS allowed origin.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "*";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    pub extract: ExtractConfig,
    pub datasets_base_url: String,
    pub cors: CorsConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Read `key`, falling back to `default` when unset; a malformed value is an error
pub(crate) fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("PORT", DEFAULT_SERVER_PORT)?,
                shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS)?,
            },
            storage: StorageConfig::from_env()?,
            fetch: FetchConfig::from_env()?,
            extract: ExtractConfig::from_env()?,
            datasets_base_url: env::var("DATASETS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATASETS_BASE_URL.to_string()),
            cors: CorsConfig {
                allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", false)?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        self.storage.validate()?;
        self.fetch.validate()?;
        self.extract.validate()?;

        if self.datasets_base_url.is_empty() {
            anyhow::bail!("DATASETS_BASE_URL cannot be empty");
        }

        // Browsers reject credentialed requests to a wildcard origin
        if self.cors.allow_credentials && self.cors.allows_any_origin() {
            anyhow::bail!("CORS_ALLOW_CREDENTIALS requires explicit CORS_ALLOWED_ORIGINS");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            storage: StorageConfig::local(crate::storage::config::DEFAULT_DOWNLOAD_DIR),
            fetch: FetchConfig::default(),
            extract: ExtractConfig::default(),
            datasets_base_url: DEFAULT_DATASETS_BASE_URL.to_string(),
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: false,
            },
        }
    }
}
