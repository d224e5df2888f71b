//! Process configuration.
//!
//! Every value has a default, so an empty environment yields a working
//! single-node setup (in-memory cache, no cross-process bus).

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use gatehouse_auth::AuthzSettings;
use gatehouse_auth::settings::{DEFAULT_CACHE_TTL, DEFAULT_KEY_PREFIX};
use gatehouse_auth::{DEFAULT_ROLE, ROOT_ROLE};

pub const DEFAULT_CACHE_CAPACITY: u64 = 100_000;
pub const DEFAULT_BACKGROUND_QUEUE: usize = 1024;
pub const DEFAULT_INVALIDATION_CHANNEL: &str = "gatehouse:authz:invalidation";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatehouseConfig {
    /// `None` selects the in-memory key-value store.
    pub redis_url: Option<String>,
    pub authz: AuthzSettings,
    /// Entry bound of the in-memory store.
    pub cache_capacity: u64,
    /// Capacity of the best-effort background queue.
    pub background_queue: usize,
    /// Pub/sub channel carrying authz events between instances.
    pub invalidation_channel: String,
}

impl Default for GatehouseConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            authz: AuthzSettings::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            background_queue: DEFAULT_BACKGROUND_QUEUE,
            invalidation_channel: DEFAULT_INVALIDATION_CHANNEL.to_string(),
        }
    }
}

impl GatehouseConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let ttl_secs: u64 = parse(&get, "GATEHOUSE_CACHE_TTL_SECS", DEFAULT_CACHE_TTL.as_secs())?;
        if ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "GATEHOUSE_CACHE_TTL_SECS",
                message: "must be greater than zero".into(),
            });
        }

        let authz = AuthzSettings {
            root_username: get("GATEHOUSE_ROOT_USERNAME").unwrap_or_else(|| ROOT_ROLE.to_string()),
            default_role: get("GATEHOUSE_DEFAULT_ROLE").unwrap_or_else(|| DEFAULT_ROLE.to_string()),
            cache_ttl: Duration::from_secs(ttl_secs),
            key_prefix: get("GATEHOUSE_CACHE_PREFIX").unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
        };

        Ok(Self {
            redis_url: get("GATEHOUSE_REDIS_URL"),
            authz,
            cache_capacity: parse(&get, "GATEHOUSE_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?,
            background_queue: parse(&get, "GATEHOUSE_BACKGROUND_QUEUE", DEFAULT_BACKGROUND_QUEUE)?,
            invalidation_channel: get("GATEHOUSE_INVALIDATION_CHANNEL")
                .unwrap_or_else(|| DEFAULT_INVALIDATION_CHANNEL.to_string()),
        })
    }
}

fn parse<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            message: format!("{raw:?}: {e}"),
        }),
    }
}
