//! # Store Service
//!
//! axum HTTP service in front of the [`RecordStore`]:
//!
//! - `GET /state` liveness, `GET /authTest` operator credential check, `GET /metrics`
//! - `PUT /api/v1/users`, `GET|PATCH|DELETE /api/v1/users/{user}` behind the operator gate
//!
//! Every response carries the configured `Access-Control-Allow-Origin`, and `OPTIONS` on any
//! path is answered with an empty 200.

pub mod auth;
pub mod errors;
pub mod handlers;
pub mod hash;
pub mod middleware;

pub use auth::{AuthError, BasicCredentials, OperatorCredentials};

use crate::config::ConfigError;
use crate::store::RecordStore;
use anyhow::{Context, Result};
use axum::http::HeaderValue;
use axum::routing::{get, put};
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Readiness flag shared with the liveness probe
#[derive(Debug, Default)]
pub struct ServerState {
    pub is_ready: AtomicBool,
}

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub operator: Arc<OperatorCredentials>,
    pub cors_origin: HeaderValue,
    pub hash_cost: u32,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store.path())
            .field("cors_origin", &self.cors_origin)
            .field("hash_cost", &self.hash_cost)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if `cors_origin` is not a valid header value.
    pub fn new(
        store: Arc<RecordStore>,
        operator: OperatorCredentials,
        cors_origin: &str,
        hash_cost: u32,
    ) -> Result<Self, ConfigError> {
        let cors_origin = HeaderValue::from_str(cors_origin).map_err(|e| ConfigError::Invalid {
            key: "CORS_ORIGIN",
            reason: e.to_string(),
        })?;
        Ok(Self {
            store,
            operator: Arc::new(operator),
            cors_origin,
            hash_cost,
            server_state: Arc::new(ServerState::default()),
        })
    }

    pub fn mark_ready(&self) {
        self.server_state.is_ready.store(true, Ordering::Relaxed);
    }
}

/// Build the router with all store routes
pub fn router(state: AppState) -> Router {
    let users = Router::new()
        .route(paths::USERS, put(handlers::put_user))
        .route(
            paths::USER,
            get(handlers::get_user)
                .patch(handlers::patch_user)
                .delete(handlers::delete_user),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_operator,
        ));

    Router::new()
        .route(paths::STATE, get(handlers::state))
        .route(paths::AUTH_TEST, get(handlers::auth_test))
        .route(paths::METRICS, get(handlers::metrics))
        .merge(users)
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    middleware::cors,
                )),
        )
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C
///
/// Marks the server ready once the listener is bound.
///
/// # Errors
///
/// Bind or serve failure.
pub async fn start_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", listener.local_addr()?);

    state.mark_ready();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping HTTP server");
}
