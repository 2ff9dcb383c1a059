//! # Server Configuration
//!
//! HTTP server and record store settings loaded from environment variables.

use super::ConfigError;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

/// Store server configuration
///
/// All optional settings have sensible defaults and can be overridden via environment variables.
#[derive(Clone)]
pub struct ServerConfig {
    /// Listen address (`ADDR`)
    pub addr: SocketAddr,
    /// Operator identity accepted by the credential check (`ADMIN_ID`)
    pub admin_id: String,
    /// bcrypt hash of the operator secret (`ADMIN_SECRET`)
    pub admin_secret: String,
    /// Record file location (`DB_PATH`)
    pub db_path: PathBuf,
    /// `Access-Control-Allow-Origin` value (`CORS_ORIGIN`)
    pub cors_origin: String,
    /// Debug logging (`DEBUG`)
    pub debug: bool,
    /// bcrypt cost for stored passwords (`HASH_COST`)
    pub hash_cost: u32,
    /// Server startup timeout (seconds)
    /// How long to wait for server to be ready before giving up
    pub startup_timeout_secs: u64,
    /// Server readiness poll interval (milliseconds)
    pub poll_interval_ms: u64,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("addr", &self.addr)
            .field("admin_id", &self.admin_id)
            .field("db_path", &self.db_path)
            .field("cors_origin", &self.cors_origin)
            .field("debug", &self.debug)
            .field("hash_cost", &self.hash_cost)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    ///
    /// Fails when a required variable is missing or a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Fails when a required variable is missing or a value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;

        let config = Self {
            addr: listen_addr(&lookup, DEFAULT_PORT)?,
            admin_id: required(&lookup, "ADMIN_ID")?,
            admin_secret: required(&lookup, "ADMIN_SECRET")?,
            db_path: lookup("DB_PATH")
                .filter(|v| !v.trim().is_empty())
                .map_or_else(|| PathBuf::from(DEFAULT_DB_PATH), PathBuf::from),
            cors_origin: lookup("CORS_ORIGIN")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string()),
            debug: flag(&lookup, "DEBUG")?,
            hash_cost: parse_or_default(&lookup, "HASH_COST", DEFAULT_HASH_COST)?,
            startup_timeout_secs: parse_or_default(
                &lookup,
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            )?,
            poll_interval_ms: parse_or_default(
                &lookup,
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        use crate::constants::{MAX_HASH_COST, MIN_HASH_COST};

        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.hash_cost) {
            return Err(ConfigError::Invalid {
                key: "HASH_COST",
                reason: format!("must be between {MIN_HASH_COST} and {MAX_HASH_COST}"),
            });
        }
        if !self.admin_secret.starts_with("$2") {
            return Err(ConfigError::Invalid {
                key: "ADMIN_SECRET",
                reason: "expected a bcrypt hash, not a plaintext secret".to_string(),
            });
        }
        Ok(())
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

/// `ADDR` as `host:port`, or `:port` for every interface
fn listen_addr<F>(lookup: &F, default_port: u16) -> Result<SocketAddr, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup("ADDR").filter(|v| !v.trim().is_empty()) else {
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, default_port)));
    };
    let raw = raw.trim();
    let invalid = |e: &dyn std::fmt::Display| ConfigError::Invalid {
        key: "ADDR",
        reason: format!("'{raw}': {e}"),
    };
    match raw.strip_prefix(':') {
        Some(port) => port
            .parse::<u16>()
            .map(|port| SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
            .map_err(|e| invalid(&e)),
        None => raw.parse().map_err(|e: std::net::AddrParseError| invalid(&e)),
    }
}

/// Boolean switch: `1`/`true`/`yes`/`on` or `0`/`false`/`no`/`off`, absent = off
fn flag<F>(lookup: &F, key: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("'{other}' is not a boolean"),
        }),
    }
}

/// Read a variable or return the default; a present but unparsable value is an error
fn parse_or_default<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
            key,
            reason: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}
