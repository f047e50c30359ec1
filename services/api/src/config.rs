//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Fallback timezone for users without a configured one.
    pub default_time_zone: chrono_tz::Tz,
    /// Daily word goal used when preferences carry none.
    pub default_daily_goal: i32,
    /// Recognition score at which a word counts as learned.
    pub mastery_ceiling: i32,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Progress Engine Settings ---
        let default_time_zone_str = std::env::var("DEFAULT_TIME_ZONE")
            .unwrap_or_else(|_| vocab_core::streak::DEFAULT_TIME_ZONE.to_string());
        let default_time_zone = default_time_zone_str.parse::<chrono_tz::Tz>().map_err(|_| {
            ConfigError::InvalidValue(
                "DEFAULT_TIME_ZONE".to_string(),
                format!("'{}' is not an IANA timezone", default_time_zone_str),
            )
        })?;

        let default_daily_goal = parse_positive_int("DEFAULT_DAILY_GOAL", 5)?;
        let mastery_ceiling = parse_positive_int(
            "MASTERY_CEILING",
            vocab_core::mastery::DEFAULT_MASTERY_CEILING,
        )?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            default_time_zone,
            default_daily_goal,
            mastery_ceiling,
        })
    }
}

fn parse_positive_int(var: &str, default: i32) -> Result<i32, ConfigError> {
    match std::env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.parse::<i32>() {
            Ok(v) if v >= 1 => Ok(v),
            _ => Err(ConfigError::InvalidValue(
                var.to_string(),
                format!("'{}' is not a positive integer", raw),
            )),
        },
    }
}
