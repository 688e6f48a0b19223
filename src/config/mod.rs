//! Configuration management
//!
//! This module handles loading and parsing configuration for the Atesta
//! authentication backend. Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Server and database settings fall back to sensible defaults. The `jwt`
//! section does not: both signing secrets and both expiry durations must be
//! present (file or environment) or startup fails validation.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },

    /// A required value is missing or malformed
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token signing configuration (required, validated at startup)
    #[serde(default)]
    pub jwt: JwtConfig,
    /// Session reaper configuration
    #[serde(default)]
    pub reaper: ReaperConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/atesta.db".to_string()
}

/// Token signing configuration.
///
/// Defaults are empty placeholders so that an absent section still parses;
/// `validate()` rejects them before the server starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret for signing access tokens
    #[serde(default)]
    pub secret: String,
    /// Secret for signing refresh tokens (independent of `secret`)
    #[serde(default)]
    pub refresh_secret: String,
    /// Access token lifetime, e.g. "15m"
    #[serde(default)]
    pub access_token_expires_in: String,
    /// Refresh token lifetime, e.g. "7d"
    #[serde(default)]
    pub refresh_token_expires_in: String,
}

impl JwtConfig {
    /// Parsed access token lifetime
    pub fn access_token_ttl(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.access_token_expires_in)
    }

    /// Parsed refresh token lifetime
    pub fn refresh_token_ttl(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.refresh_token_expires_in)
    }
}

/// Session reaper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Seconds between expired-session sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Seconds between read-only session reports
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Days an expired session row is retained before physical deletion
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            report_interval_secs: default_report_interval(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    3600 // hourly
}

fn default_report_interval() -> u64 {
    24 * 3600 // daily
}

fn default_retention_days() -> i64 {
    30
}

impl Config {
    /// Load configuration from file.
    ///
    /// If the file doesn't exist or is empty, returns default configuration
    /// (the required `jwt` values may still arrive via environment overrides;
    /// `validate()` is the gate).
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides.
    ///
    /// Environment variables follow the pattern:
    /// - ATESTA_SERVER_HOST
    /// - ATESTA_SERVER_PORT
    /// - ATESTA_SERVER_CORS_ORIGIN
    /// - ATESTA_DATABASE_URL
    /// - ATESTA_JWT_SECRET
    /// - ATESTA_JWT_REFRESH_SECRET
    /// - ATESTA_JWT_ACCESS_TOKEN_EXPIRES_IN
    /// - ATESTA_JWT_REFRESH_TOKEN_EXPIRES_IN
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ATESTA_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ATESTA_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("ATESTA_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(url) = std::env::var("ATESTA_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(secret) = std::env::var("ATESTA_JWT_SECRET") {
            self.jwt.secret = secret;
        }
        if let Ok(secret) = std::env::var("ATESTA_JWT_REFRESH_SECRET") {
            self.jwt.refresh_secret = secret;
        }
        if let Ok(ttl) = std::env::var("ATESTA_JWT_ACCESS_TOKEN_EXPIRES_IN") {
            self.jwt.access_token_expires_in = ttl;
        }
        if let Ok(ttl) = std::env::var("ATESTA_JWT_REFRESH_TOKEN_EXPIRES_IN") {
            self.jwt.refresh_token_expires_in = ttl;
        }
    }

    /// Validate the configuration before the server starts.
    ///
    /// Missing signing secrets or unparsable durations are fatal here rather
    /// than at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "jwt.secret is required (set ATESTA_JWT_SECRET)".to_string(),
            ));
        }
        if self.jwt.refresh_secret.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "jwt.refresh_secret is required (set ATESTA_JWT_REFRESH_SECRET)".to_string(),
            ));
        }
        if self.jwt.secret == self.jwt.refresh_secret {
            return Err(ConfigError::Invalid(
                "jwt.secret and jwt.refresh_secret must differ".to_string(),
            ));
        }
        self.jwt.access_token_ttl()?;
        self.jwt.refresh_token_ttl()?;
        // tokio panics on a zero-period interval, so reject it up front
        if self.reaper.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reaper.sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.reaper.report_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reaper.report_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a relative duration string such as "15m" or "7d".
///
/// Supported suffixes: `s`, `m`, `h`, `d`. A bare number is taken as seconds.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Invalid(
            "duration must not be empty".to_string(),
        ));
    }

    let (digits, unit) = match value.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&value[..value.len() - 1], Some(c)),
        _ => (value, None),
    };

    let count: i64 = digits.parse().map_err(|_| {
        ConfigError::Invalid(format!("Invalid duration '{}': expected <number>[smhd]", value))
    })?;
    if count <= 0 {
        return Err(ConfigError::Invalid(format!(
            "Invalid duration '{}': must be positive",
            value
        )));
    }

    let duration = match unit {
        None | Some('s') => Duration::seconds(count),
        Some('m') => Duration::minutes(count),
        Some('h') => Duration::hours(count),
        Some('d') => Duration::days(count),
        Some(other) => {
            return Err(ConfigError::Invalid(format!(
                "Invalid duration unit '{}' in '{}'",
                other, value
            )))
        }
    };

    Ok(duration)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any positive count with a supported suffix parses to the expected
        /// number of seconds.
        #[test]
        fn property_duration_parsing_matches_unit(
            count in 1i64..10_000,
            unit in prop::sample::select(vec!['s', 'm', 'h', 'd'])
        ) {
            let parsed = parse_duration(&format!("{}{}", count, unit)).unwrap();
            let expected = match unit {
                's' => count,
                'm' => count * 60,
                'h' => count * 3600,
                'd' => count * 86_400,
                _ => unreachable!(),
            };
            prop_assert_eq!(parsed.num_seconds(), expected);
        }
    }
}
