//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use std::net::SocketAddr;
use std::str::FromStr;
use team_bracket::{BracketConfig, db::DatabaseConfig, tournament::DEFAULT_MIN_TEAMS};

/// Default period of the overdue-deadline sweep
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Bracket policy
    pub bracket: BracketConfig,
    /// Seconds between overdue-deadline sweeps
    pub sweep_interval_secs: u64,
    /// Prometheus scrape address, metrics disabled when unset
    pub metrics_bind: Option<SocketAddr>,
}

/// Values given on the command line, taking priority over the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub database_url: Option<String>,
    pub min_teams: Option<usize>,
    pub sweep_interval_secs: Option<u64>,
    pub metrics_bind: Option<SocketAddr>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `overrides` - Values from CLI args
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but cannot be parsed
    pub fn from_env(overrides: CliOverrides) -> Result<Self, ConfigError> {
        // Database configuration, same variables and defaults as the library
        let defaults = DatabaseConfig::development();
        let database_url = overrides
            .database_url
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or(defaults.database_url);

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", defaults.min_connections)?,
            connection_timeout_secs: parse_env_or(
                "DB_CONNECTION_TIMEOUT_SECS",
                defaults.connection_timeout_secs,
            )?,
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", defaults.max_lifetime_secs)?,
        };

        // Bracket policy
        let min_teams = match overrides.min_teams {
            Some(min_teams) => min_teams,
            None => parse_env_or("BRACKET_MIN_TEAMS", DEFAULT_MIN_TEAMS)?,
        };
        let bracket = BracketConfig { min_teams };

        let sweep_interval_secs = match overrides.sweep_interval_secs {
            Some(secs) => secs,
            None => parse_env_or("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?,
        };

        // Metrics exporter (optional)
        let metrics_bind = match overrides.metrics_bind {
            Some(addr) => Some(addr),
            None => parse_value("METRICS_BIND", std::env::var("METRICS_BIND").ok())?,
        };

        Ok(ServerConfig {
            database,
            bracket,
            sweep_interval_secs,
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.database_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "e.g. postgres://postgres@localhost/bracket_db".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        self.bracket
            .validate()
            .map_err(|reason| ConfigError::Invalid {
                var: "BRACKET_MIN_TEAMS".to_string(),
                reason,
            })?;

        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "SWEEP_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback.
///
/// Unset uses `default`; set but unparseable is an error.
fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_value(key, std::env::var(key).ok())?.unwrap_or(default))
}

fn parse_value<T: FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    match raw {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                var: key.to_string(),
                reason: format!("'{raw}' cannot be parsed"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServerConfig {
        ServerConfig {
            database: DatabaseConfig {
                database_url: "postgres://localhost/test".to_string(),
                max_connections: 10,
                min_connections: 1,
                connection_timeout_secs: 5,
                idle_timeout_secs: 300,
                max_lifetime_secs: 1800,
            },
            bracket: BracketConfig::default(),
            sweep_interval_secs: 30,
            metrics_bind: None,
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid {
            var: "SWEEP_INTERVAL_SECS".to_string(),
            reason: "Must be greater than 0".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SWEEP_INTERVAL_SECS"));
        assert!(msg.contains("greater than 0"));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_min_teams_too_small() {
        let mut config = valid_config();
        config.bracket.min_teams = 1;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "BRACKET_MIN_TEAMS"));
    }

    #[test]
    fn test_config_validation_zero_sweep_interval() {
        let mut config = valid_config();
        config.sweep_interval_secs = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { .. }
        ));
    }

    #[test]
    fn test_config_validation_pool_bounds() {
        let mut config = valid_config();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_take_priority() {
        let config = ServerConfig::from_env(CliOverrides {
            database_url: Some("postgres://override/db".to_string()),
            min_teams: Some(8),
            sweep_interval_secs: Some(5),
            metrics_bind: Some("127.0.0.1:9100".parse().unwrap()),
        })
        .unwrap();

        assert_eq!(config.database.database_url, "postgres://override/db");
        assert_eq!(config.bracket.min_teams, 8);
        assert_eq!(config.sweep_interval_secs, 5);
        assert_eq!(config.metrics_bind, Some("127.0.0.1:9100".parse().unwrap()));
    }

    #[test]
    fn test_parse_env_or_falls_back() {
        assert_eq!(
            parse_env_or("TB_SERVER_SURELY_UNSET_VARIABLE", 7u64).unwrap(),
            7
        );
    }

    #[test]
    fn test_unparseable_value_is_rejected() {
        let err = parse_value::<u64>("SWEEP_INTERVAL_SECS", Some("soon".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "SWEEP_INTERVAL_SECS"));

        let err =
            parse_value::<SocketAddr>("METRICS_BIND", Some("localhost".to_string())).unwrap_err();
        assert!(err.to_string().contains("'localhost'"));

        assert_eq!(
            parse_value::<u32>("DB_MAX_CONNECTIONS", Some(" 25 ".to_string())).unwrap(),
            Some(25)
        );
    }

    #[test]
    fn test_database_defaults_match_library() {
        let config = ServerConfig::from_env(CliOverrides {
            database_url: Some("postgres://override/db".to_string()),
            ..CliOverrides::default()
        })
        .unwrap();
        let library = DatabaseConfig::development();

        assert_eq!(
            config.database.connection_timeout_secs,
            library.connection_timeout_secs
        );
        assert_eq!(config.database.idle_timeout_secs, library.idle_timeout_secs);
        assert_eq!(config.database.max_lifetime_secs, library.max_lifetime_secs);
    }
}
