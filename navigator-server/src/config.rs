//! Server configuration read from the environment

use sql_navigator::PoolSettings;
use std::net::SocketAddr;
use thiserror::Error;

pub const BIND_VARIABLE: &str = "NAVIGATOR_BIND";
pub const MAX_CONNECTIONS_VARIABLE: &str = "NAVIGATOR_MAX_CONNECTIONS";
pub const ACQUIRE_TIMEOUT_VARIABLE: &str = "NAVIGATOR_ACQUIRE_TIMEOUT";

const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[derive(Debug, Error)]
#[error("invalid value {value:?} for {variable}")]
pub struct ConfigError {
    variable: &'static str,
    value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub pool: PoolSettings,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|variable| std::env::var(variable).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = PoolSettings::default();

        let bind = parse(&lookup, BIND_VARIABLE)?
            .map_or_else(|| DEFAULT_BIND.parse(), Ok)
            .map_err(|_| ConfigError {
                variable: BIND_VARIABLE,
                value: DEFAULT_BIND.to_string(),
            })?;

        Ok(Self {
            bind,
            pool: PoolSettings {
                max_connections: parse(&lookup, MAX_CONNECTIONS_VARIABLE)?
                    .unwrap_or(defaults.max_connections),
                acquire_timeout_seconds: parse(&lookup, ACQUIRE_TIMEOUT_VARIABLE)?
                    .unwrap_or(defaults.acquire_timeout_seconds),
            },
        })
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    variable: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(variable) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError { variable, value }),
        _ => Ok(None),
    }
}
