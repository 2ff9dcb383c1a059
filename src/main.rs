//! # squid-database
//!
//! User store service for Squid proxy credentials.
//!
//! Serves the record store over HTTP for the credential issuer:
//!
//! 1. **Liveness** - `GET /state`
//! 2. **Operator check** - `GET /authTest` with HTTP basic auth
//! 3. **User records** - `PUT /api/v1/users`, `GET|PATCH|DELETE /api/v1/users/{user}`
//! 4. **Metrics** - `GET /metrics` in Prometheus text format
//!
//! Records live in one JSON file (`DB_PATH`); stored passwords are bcrypt hashes.
//!
//! See the [README.md](../README.md) for configuration.

use anyhow::{Context, Result};
use squid_vault_auth::runtime::initialization::initialize;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    init_result
        .server_handle
        .await
        .context("HTTP server task failed")?;

    info!("squid-database stopped");
    Ok(())
}
