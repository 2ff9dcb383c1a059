//! # Store Server Configuration
//!
//! Server-level configuration loaded from environment variables.
//!
//! Required settings (`ADMIN_ID`, `ADMIN_SECRET`) have no default and fail fast;
//! everything else falls back to the values in [`crate::constants`].

mod server;

pub use server::ServerConfig;

use thiserror::Error;

/// Configuration loading/validation failure
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is absent or empty
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    /// A variable is present but cannot be used
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Load the store server configuration from the process environment
///
/// # Errors
///
/// Returns a [`ConfigError`] naming the first missing or invalid variable.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
    ServerConfig::from_env()
}
