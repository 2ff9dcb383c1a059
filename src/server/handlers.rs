//! # Route Handlers
//!
//! One handler per store route. Bodies are taken as raw bytes and decoded here so that a
//! malformed body always becomes a 400 with the decode error as `msg`.

use super::errors::{msg_response, status_for};
use super::hash::hash_secret_blocking;
use super::AppState;
use crate::observability::metrics;
use crate::store::{StoreError, UserPatch, UserRecord};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::de::DeserializeOwned;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

/// GET /state
pub async fn state(State(app_state): State<AppState>) -> Response {
    if app_state.server_state.is_ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "Service is ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Service is not ready").into_response()
    }
}

/// GET /authTest
pub async fn auth_test(State(app_state): State<AppState>, headers: HeaderMap) -> Response {
    match app_state.operator.authenticate(&headers).await {
        Ok(()) => (StatusCode::OK, "Authentication success").into_response(),
        Err(e) => {
            warn!("  Credential check failed: {}", e);
            metrics::increment_auth_failures();
            (
                StatusCode::UNAUTHORIZED,
                format!("Authentication fail. {e}\n"),
            )
                .into_response()
        }
    }
}

/// GET /metrics
pub async fn metrics() -> Response {
    match metrics::gather_text() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Unknown routes
pub async fn not_found() -> Response {
    msg_response(StatusCode::NOT_FOUND, "not found")
}

/// PUT /api/v1/users
pub async fn put_user(State(app_state): State<AppState>, body: Bytes) -> Response {
    let mut user: UserRecord = match decode(&body) {
        Ok(user) => user,
        Err(response) => return response,
    };
    info!("  PUT user: {}", user.username);

    user.password = match hash_secret_blocking(user.password, app_state.hash_cost).await {
        Ok(hash) => hash,
        Err(e) => {
            error!("  Failed to hash password for {}: {}", user.username, e);
            return msg_response(StatusCode::INTERNAL_SERVER_ERROR, "failed processing request");
        }
    };

    let username = user.username.clone();
    match app_state.store.add(user).await {
        Ok(()) => {
            record_success(&app_state, "add").await;
            msg_response(
                StatusCode::OK,
                format!("Added new user record, username={username}"),
            )
        }
        Err(e) => store_failure("add", &e),
    }
}

/// GET /api/v1/users/{user}
pub async fn get_user(State(app_state): State<AppState>, Path(username): Path<String>) -> Response {
    debug!("  GET user: {}", username);
    match app_state.store.get(&username).await {
        Ok(user) => {
            metrics::record_store_operation("get", "success");
            Json(user).into_response()
        }
        Err(e) => store_failure("get", &e),
    }
}

/// PATCH /api/v1/users/{user}
pub async fn patch_user(
    State(app_state): State<AppState>,
    Path(username): Path<String>,
    body: Bytes,
) -> Response {
    let mut patch: UserPatch = match decode(&body) {
        Ok(patch) => patch,
        Err(response) => return response,
    };
    if patch.is_empty() {
        return msg_response(StatusCode::BAD_REQUEST, "no fields to update");
    }
    info!(
        "  PATCH user: {} (password={}, groups={}, expiration={})",
        username,
        patch.password.is_some(),
        patch.groups.is_some(),
        patch.expiration.is_some()
    );

    if let Some(password) = patch.password.take() {
        match hash_secret_blocking(password, app_state.hash_cost).await {
            Ok(hash) => patch.password = Some(hash),
            Err(e) => {
                error!("  Failed to hash password for {}: {}", username, e);
                return msg_response(StatusCode::INTERNAL_SERVER_ERROR, "failed processing request");
            }
        }
    }

    match app_state.store.patch(&username, patch).await {
        Ok(_) => {
            record_success(&app_state, "update").await;
            msg_response(
                StatusCode::OK,
                format!("Updated user record, username={username}"),
            )
        }
        Err(e) => store_failure("update", &e),
    }
}

/// DELETE /api/v1/users/{user}
pub async fn delete_user(
    State(app_state): State<AppState>,
    Path(username): Path<String>,
) -> Response {
    info!("  DELETE user: {}", username);
    match app_state.store.delete(&username).await {
        Ok(removed) => {
            if removed == 0 {
                debug!("  User {} was already absent", username);
            }
            record_success(&app_state, "delete").await;
            msg_response(
                StatusCode::OK,
                format!("Deleted user record, username={username}"),
            )
        }
        Err(e) => store_failure("delete", &e),
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("  Rejected request body: {}", e);
        msg_response(StatusCode::BAD_REQUEST, e.to_string())
    })
}

async fn record_success(app_state: &AppState, operation: &str) {
    metrics::record_store_operation(operation, "success");
    metrics::set_store_records(app_state.store.len().await);
}

fn store_failure(operation: &str, e: &StoreError) -> Response {
    let status = status_for(e);
    if status.is_server_error() {
        error!("  Store {} failed: {}", operation, e);
    } else {
        warn!("  Store {} rejected: {}", operation, e);
    }
    metrics::record_store_operation(operation, e.as_str());
    msg_response(status, e.to_string())
}
