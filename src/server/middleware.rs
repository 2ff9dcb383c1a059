//! # Middleware
//!
//! - [`cors`]: stamps `Access-Control-Allow-Origin` on every response and answers `OPTIONS`
//!   with an empty 200 before routing, auth or the store are involved.
//! - [`require_operator`]: operator basic-auth gate in front of the user routes.

use super::errors::msg_response;
use super::AppState;
use crate::observability::metrics;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

const ALLOWED_METHODS: &str = "GET, PUT, PATCH, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Authorization, Content-Type";
const AUTH_CHALLENGE: &str = "Basic realm=\"squid-vault-auth\"";

pub async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        debug!("  Preflight: {}", request.uri().path());
        let mut response = StatusCode::OK.into_response();
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, state.cors_origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        return response;
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, state.cors_origin.clone());
    response
}

pub async fn require_operator(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(e) = state.operator.authenticate(request.headers()).await {
        warn!(
            "  Rejected {} {}: {}",
            request.method(),
            request.uri().path(),
            e
        );
        metrics::increment_auth_failures();
        let mut response =
            msg_response(StatusCode::UNAUTHORIZED, format!("Authentication fail. {e}"));
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(AUTH_CHALLENGE),
        );
        return response;
    }
    next.run(request).await
}
