// Configuration
//
// Environment-driven settings for the booking core and the sweep runner.
// `.env` is loaded first when present; every value has a default except the
// database URL, which only the binary needs.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::booking::points::PointPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub snapshot_cache_ttl: Duration,
    pub point_accrual_rate_percent: i64,
    pub auth_code_length: usize,
    pub auth_code_grace_hours: i64,
    pub sweep_interval: Duration,
    pub archive_retention_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 5,
            snapshot_cache_ttl: Duration::from_secs(60),
            point_accrual_rate_percent: 1,
            auth_code_length: 8,
            auth_code_grace_hours: 24,
            sweep_interval: Duration::from_secs(300),
            archive_retention_days: 30,
        }
    }
}

impl Config {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            snapshot_cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "SNAPSHOT_CACHE_TTL_SECS",
                defaults.snapshot_cache_ttl.as_secs(),
            )?),
            point_accrual_rate_percent: parse_or(
                &lookup,
                "POINT_ACCRUAL_RATE_PERCENT",
                defaults.point_accrual_rate_percent,
            )?,
            auth_code_length: parse_or(&lookup, "AUTH_CODE_LENGTH", defaults.auth_code_length)?,
            auth_code_grace_hours: parse_or(
                &lookup,
                "AUTH_CODE_GRACE_HOURS",
                defaults.auth_code_grace_hours,
            )?,
            sweep_interval: Duration::from_secs(parse_or(
                &lookup,
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
            archive_retention_days: parse_or(
                &lookup,
                "ARCHIVE_RETENTION_DAYS",
                defaults.archive_retention_days,
            )?,
        };

        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, value: String| Err(ConfigError::Invalid { key, value });

        if self.db_max_connections == 0 {
            return invalid("DB_MAX_CONNECTIONS", "0".to_string());
        }
        if self.point_accrual_rate_percent < 0 {
            return invalid(
                "POINT_ACCRUAL_RATE_PERCENT",
                self.point_accrual_rate_percent.to_string(),
            );
        }
        if self.auth_code_length < 4 {
            return invalid("AUTH_CODE_LENGTH", self.auth_code_length.to_string());
        }
        if self.auth_code_grace_hours < 0 {
            return invalid("AUTH_CODE_GRACE_HOURS", self.auth_code_grace_hours.to_string());
        }
        if self.sweep_interval.is_zero() {
            return invalid("SWEEP_INTERVAL_SECS", "0".to_string());
        }
        if self.archive_retention_days < 0 {
            return invalid(
                "ARCHIVE_RETENTION_DAYS",
                self.archive_retention_days.to_string(),
            );
        }
        Ok(())
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    pub fn point_policy(&self) -> PointPolicy {
        PointPolicy {
            accrual_rate_percent: self.point_accrual_rate_percent,
            auth_code_length: self.auth_code_length,
            auth_code_grace: chrono::Duration::hours(self.auth_code_grace_hours),
        }
    }

    pub fn archive_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.archive_retention_days)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}
