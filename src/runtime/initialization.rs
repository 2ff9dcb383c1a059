//! # Initialization
//!
//! Store server startup: configuration, tracing, metrics, record store and HTTP server.

use crate::config::{self, ServerConfig};
use crate::observability;
use crate::server::{start_server, AppState, OperatorCredentials, ServerState};
use crate::store::RecordStore;
use anyhow::{Context, Result};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Everything the binary needs once startup has completed
#[derive(Debug)]
pub struct InitializationResult {
    /// Background task running the HTTP server
    pub server_handle: JoinHandle<()>,
    /// Shared handler state
    pub state: AppState,
}

/// Initialize the store server runtime from the process environment
///
/// This function handles:
/// - Configuration loading and validation
/// - Tracing subscriber setup
/// - Metrics registration
/// - Opening the record store
/// - HTTP server startup
///
/// # Errors
///
/// Invalid configuration, an unusable record file, or a server that never becomes ready.
pub async fn initialize() -> Result<InitializationResult> {
    let config = config::load_config().context("Failed to load configuration")?;
    observability::init_tracing(config.debug);
    initialize_with(config).await
}

/// Same as [`initialize`] with an explicit configuration; tracing is left untouched
///
/// # Errors
///
/// See [`initialize`].
pub async fn initialize_with(config: ServerConfig) -> Result<InitializationResult> {
    info!("Starting squid-database v{}", env!("CARGO_PKG_VERSION"));
    info!("  Configuration: {:?}", config);

    observability::metrics::register_metrics()?;

    let store = RecordStore::open(&config.db_path)
        .await
        .with_context(|| format!("Failed to open record store {}", config.db_path.display()))?;
    observability::metrics::set_store_records(store.len().await);

    let operator = OperatorCredentials::new(&config.admin_id, &config.admin_secret);
    let state = AppState::new(
        Arc::new(store),
        operator,
        &config.cors_origin,
        config.hash_cost,
    )?;

    let server_state = state.clone();
    let addr = config.addr;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(addr, server_state).await {
            error!("HTTP server error: {:#}", e);
        }
    });

    wait_for_server_ready(
        &state.server_state,
        &server_handle,
        Duration::from_secs(config.startup_timeout_secs),
        Duration::from_millis(config.poll_interval_ms),
    )
    .await?;

    Ok(InitializationResult {
        server_handle,
        state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &JoinHandle<()>,
    startup_timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let start_time = Instant::now();

    loop {
        // Server task ended before binding
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}
