//! # Constants
//!
//! Defaults shared by the store server, the issuer and `squidctl`.

/// Default listen port for the store server (all interfaces)
pub const DEFAULT_PORT: u16 = 8080;

/// Default location of the user record file
pub const DEFAULT_DB_PATH: &str = "/etc/squid-vault.json";

/// Default `Access-Control-Allow-Origin` value
pub const DEFAULT_CORS_ORIGIN: &str = "*";

/// Default bcrypt cost for stored user passwords
pub const DEFAULT_HASH_COST: u32 = 14;

/// Lowest bcrypt cost accepted by the hash primitive
pub const MIN_HASH_COST: u32 = 4;

/// Highest bcrypt cost accepted by the hash primitive
pub const MAX_HASH_COST: u32 = 31;

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Connect timeout used by the issuer when the host config has none
pub const DEFAULT_CONNECT_TIMEOUT: &str = "5s";

/// Marker substituted for the operator secret in error text
pub const PASSWORD_REDACTION_MARKER: &str = "[password]";

/// Type name reported to the host runtime
pub const DATABASE_TYPE_NAME: &str = "squid";

/// Default store URL for `squidctl`
pub const DEFAULT_STORE_URL: &str = "http://127.0.0.1:8080";
