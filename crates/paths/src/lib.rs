//! Shared API path definitions for the squid user store
//!
//! This crate centralizes all store API paths to ensure consistency
//! between the credential issuer (HTTP client) and the store service (axum router).
//!
//! ## Route Constants
//!
//! Route constants are provided for Axum routes, which require static string literals.
//! The request-path helpers build concrete URLs from the same constants and are
//! validated against them in tests.

/// Liveness probe, unauthenticated
pub const STATE: &str = "/state";

/// Operator credential check (HTTP basic auth)
pub const AUTH_TEST: &str = "/authTest";

/// Prometheus metrics
pub const METRICS: &str = "/metrics";

/// User collection (`PUT` creates a record)
pub const USERS: &str = "/api/v1/users";

/// Single user record (`GET`, `PATCH`, `DELETE`)
pub const USER: &str = "/api/v1/users/{user}";

/// Name of the path parameter in [`USER`]
pub const USER_PARAM: &str = "user";

/// Build the request path for a single user record, percent-encoding the username
pub fn user(username: &str) -> String {
    USER.replace(
        &format!("{{{USER_PARAM}}}"),
        &urlencoding::encode(username),
    )
}

/// Join a base URL and a route path without doubling slashes
///
/// `http://store:8080/` + `/state` -> `http://store:8080/state`
pub fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
