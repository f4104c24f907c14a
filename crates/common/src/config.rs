//! Application configuration.

use serde::Deserialize;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token verification configuration.
    pub auth: AuthConfig,
    /// Vote intake tuning.
    #[serde(default)]
    pub voting: VotingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL. Polls are kept in memory when unset.
    #[serde(default)]
    pub url: Option<String>,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Bearer token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider.
    pub jwt_secret: String,
}

/// Vote intake configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VotingConfig {
    /// How long a vote may wait for its poll's critical section.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Extra attempts made after a transient failure.
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,
    /// Base delay between attempts, multiplied by the attempt number.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl VotingConfig {
    /// Lock acquisition timeout.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Base retry backoff.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            transient_retries: default_transient_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    5000
}

const fn default_max_connections() -> u32 {
    20
}

const fn default_min_connections() -> u32 {
    2
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}

const fn default_transient_retries() -> u32 {
    2
}

const fn default_retry_backoff_ms() -> u64 {
    50
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (via dotenvy, if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `LIVEPOLL_ENV`)
    /// 4. Environment variables with `LIVEPOLL__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("LIVEPOLL_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("LIVEPOLL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                "[auth]\njwt_secret = \"s3cret\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 5000);
        assert!(config.database.url.is_none());
        assert_eq!(config.voting.transient_retries, 2);
        assert_eq!(config.voting.lock_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_voting_overrides() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                "[auth]\njwt_secret = \"x\"\n[voting]\nlock_timeout_ms = 250\nretry_backoff_ms = 10\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.voting.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.voting.retry_backoff(), Duration::from_millis(10));
        assert_eq!(config.voting.transient_retries, 2);
    }
}
