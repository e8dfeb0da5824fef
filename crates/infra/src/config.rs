//! Configuration loading from the process environment.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use keystone_auth::{AuthConfig, JwtSecret};

pub const JWT_SECRET: &str = "KEYSTONE_JWT_SECRET";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const ACCESS_TTL_SECS: &str = "KEYSTONE_ACCESS_TTL_SECS";
pub const REFRESH_TTL_SECS: &str = "KEYSTONE_REFRESH_TTL_SECS";
pub const STORE_TIMEOUT_MS: &str = "KEYSTONE_STORE_TIMEOUT_MS";
pub const SWEEP_INTERVAL_SECS: &str = "KEYSTONE_SWEEP_INTERVAL_SECS";
pub const DB_MAX_CONNECTIONS: &str = "KEYSTONE_DB_MAX_CONNECTIONS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key}='{value}' is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub auth: AuthConfig,
    pub database_url: Option<String>,
    pub sweep_interval: Duration,
    pub db_max_connections: u32,
}

impl Settings {
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
    pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Unset and empty values
    /// fall back to defaults; only the JWT secret is required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let secret = get(JWT_SECRET).ok_or(ConfigError::Missing(JWT_SECRET))?;

        let access_ttl = match parse::<u64>(ACCESS_TTL_SECS, get(ACCESS_TTL_SECS))? {
            Some(secs) => positive(ACCESS_TTL_SECS, secs).map(Duration::from_secs)?,
            None => AuthConfig::DEFAULT_ACCESS_TOKEN_TTL,
        };
        let refresh_ttl = match parse::<u64>(REFRESH_TTL_SECS, get(REFRESH_TTL_SECS))? {
            Some(secs) => positive(REFRESH_TTL_SECS, secs).map(Duration::from_secs)?,
            None => AuthConfig::DEFAULT_REFRESH_TOKEN_TTL,
        };
        let mut auth = AuthConfig::new(JwtSecret::new(secret)).with_token_ttls(access_ttl, refresh_ttl);
        if let Some(ms) = parse::<u64>(STORE_TIMEOUT_MS, get(STORE_TIMEOUT_MS))? {
            auth = auth.with_store_timeout(positive(STORE_TIMEOUT_MS, ms).map(Duration::from_millis)?);
        }

        let sweep_interval = match parse::<u64>(SWEEP_INTERVAL_SECS, get(SWEEP_INTERVAL_SECS))? {
            Some(secs) => positive(SWEEP_INTERVAL_SECS, secs).map(Duration::from_secs)?,
            None => Self::DEFAULT_SWEEP_INTERVAL,
        };

        Ok(Self {
            auth,
            database_url: get(DATABASE_URL),
            sweep_interval,
            db_max_connections: parse(DB_MAX_CONNECTIONS, get(DB_MAX_CONNECTIONS))?
                .unwrap_or(Self::DEFAULT_DB_MAX_CONNECTIONS),
        })
    }
}

fn parse<T>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value: raw,
            })
        })
        .transpose()
}

fn positive(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
