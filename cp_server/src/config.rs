//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use coup::server::{DEFAULT_BIND, DEFAULT_MAX_CONNECTIONS, ServerConfig};

/// Complete server configuration loaded from flags and environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `HOST:PORT` to listen on
    pub bind: String,
    /// Connections accepted at once
    pub max_connections: usize,
}

impl Config {
    /// Load configuration, preferring CLI overrides over `COUP_BIND` and
    /// `COUP_MAX_CONNECTIONS`, falling back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the loaded values are invalid
    pub fn from_env(
        bind_override: Option<String>,
        max_connections_override: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override
            .or_else(|| std::env::var("COUP_BIND").ok())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let max_connections = max_connections_override
            .unwrap_or_else(|| parse_env_or("COUP_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS));
        let config = Self {
            bind,
            max_connections,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Returns error if the bind address has no numeric port or no
    /// connections are allowed
    pub fn validate(&self) -> Result<(), ConfigError> {
        let port = self
            .bind
            .rsplit_once(':')
            .map(|(host, port)| (host, port.parse::<u16>()));
        if !matches!(port, Some((host, Ok(_))) if !host.is_empty()) {
            return Err(ConfigError::Invalid {
                var: "COUP_BIND".to_string(),
                reason: format!("Expected HOST:PORT, got `{}`", self.bind),
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "COUP_MAX_CONNECTIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind.clone(),
            max_connections: self.max_connections,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
