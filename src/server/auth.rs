//! # Operator Authentication
//!
//! HTTP basic-auth parsing and validation against the single configured operator identity.
//! Managed user records are never consulted here.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

/// Credential check failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing basic auth credentials")]
    Missing,
    #[error("malformed basic auth header")]
    Malformed,
    #[error("invalid User {0}")]
    InvalidUser(String),
    #[error("invalid password for user {0}")]
    InvalidPassword(String),
}

/// Username/password pair taken from an `Authorization: Basic ...` header
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl BasicCredentials {
    /// Parse the `Authorization` header
    ///
    /// # Errors
    ///
    /// [`AuthError::Missing`] without a basic-auth header, [`AuthError::Malformed`] if it
    /// doesn't decode to `user:password`.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::Missing)?
            .to_str()
            .map_err(|_| AuthError::Malformed)?;
        let (scheme, encoded) = value.trim().split_once(' ').ok_or(AuthError::Malformed)?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(AuthError::Missing);
        }
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::Malformed)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;
        let (username, password) = decoded.split_once(':').ok_or(AuthError::Malformed)?;
        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// `Authorization` header value for these credentials
    pub fn header_value(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.username, self.password))
        )
    }
}

/// The operator identity and its bcrypt hash
#[derive(Clone)]
pub struct OperatorCredentials {
    admin_id: String,
    admin_secret_hash: String,
}

impl std::fmt::Debug for OperatorCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorCredentials")
            .field("admin_id", &self.admin_id)
            .finish_non_exhaustive()
    }
}

impl OperatorCredentials {
    pub fn new(admin_id: impl Into<String>, admin_secret_hash: impl Into<String>) -> Self {
        Self {
            admin_id: admin_id.into(),
            admin_secret_hash: admin_secret_hash.into(),
        }
    }

    /// Check a caller-supplied pair against the operator identity
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidUser`] or [`AuthError::InvalidPassword`].
    pub async fn validate(&self, credentials: &BasicCredentials) -> Result<(), AuthError> {
        if credentials.username != self.admin_id {
            return Err(AuthError::InvalidUser(credentials.username.clone()));
        }
        let matches = super::hash::verify_secret_blocking(
            credentials.password.clone(),
            self.admin_secret_hash.clone(),
        )
        .await;
        if !matches {
            return Err(AuthError::InvalidPassword(credentials.username.clone()));
        }
        Ok(())
    }

    /// Parse the request headers and validate them
    ///
    /// # Errors
    ///
    /// Any [`AuthError`].
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let credentials = BasicCredentials::from_headers(headers)?;
        self.validate(&credentials).await
    }
}
