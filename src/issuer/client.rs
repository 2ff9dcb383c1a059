//! # Store Client
//!
//! reqwest client for the store API, authenticated with the operator credential. Every request
//! is bounded by the configured timeout (both connect and total) and is never retried.

use crate::store::{UserPatch, UserRecord};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;
use zeroize::Zeroizing;

/// Store call failure
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("{method} {path}: {source}")]
    Request {
        method: Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {path}: status code {status}, response: {body}")]
    Status {
        method: Method,
        path: String,
        status: StatusCode,
        body: String,
    },
}

impl ClientError {
    /// HTTP status of the response, if one was received
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Build(_) | ClientError::Request { .. } => None,
        }
    }
}

/// Operator-authenticated client for one store
#[derive(Clone)]
pub struct StoreClient {
    http: Client,
    base_url: String,
    username: String,
    password: Zeroizing<String>,
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl StoreClient {
    /// # Errors
    ///
    /// [`ClientError::Build`] if the TLS backend can't be initialized.
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: Zeroizing::new(password.to_string()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /authTest`
    ///
    /// # Errors
    ///
    /// Transport failure or a non-2xx answer.
    pub async fn auth_test(&self) -> Result<(), ClientError> {
        self.send(Method::GET, paths::AUTH_TEST, |r| r).await?;
        Ok(())
    }

    /// `PUT /api/v1/users`
    ///
    /// # Errors
    ///
    /// Transport failure or a non-2xx answer (409 if the user exists).
    pub async fn create_user(&self, record: &UserRecord) -> Result<(), ClientError> {
        self.send(Method::PUT, paths::USERS, |r| r.json(record))
            .await?;
        Ok(())
    }

    /// `GET /api/v1/users/{user}`; `None` on 404
    ///
    /// # Errors
    ///
    /// Transport failure, another non-2xx answer or an undecodable body.
    pub async fn get_user(&self, username: &str) -> Result<Option<UserRecord>, ClientError> {
        let path = paths::user(username);
        match self.send(Method::GET, &path, |r| r).await {
            Ok(response) => response
                .json()
                .await
                .map(Some)
                .map_err(|source| ClientError::Request {
                    method: Method::GET,
                    path,
                    source,
                }),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `PATCH /api/v1/users/{user}`
    ///
    /// # Errors
    ///
    /// Transport failure or a non-2xx answer (404 if the user is absent).
    pub async fn update_user(&self, username: &str, patch: &UserPatch) -> Result<(), ClientError> {
        self.send(Method::PATCH, &paths::user(username), |r| r.json(patch))
            .await?;
        Ok(())
    }

    /// `DELETE /api/v1/users/{user}`; an absent user is not an error
    ///
    /// # Errors
    ///
    /// Transport failure or a non-2xx, non-404 answer.
    pub async fn delete_user(&self, username: &str) -> Result<(), ClientError> {
        match self.send(Method::DELETE, &paths::user(username), |r| r).await {
            Ok(_) => Ok(()),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, ClientError> {
        let url = paths::join(&self.base_url, path);
        debug!("  {} {}", method, url);

        let request = self
            .http
            .request(method.clone(), &url)
            .basic_auth(&self.username, Some(self.password.as_str()));
        let response = build(request)
            .send()
            .await
            .map_err(|source| ClientError::Request {
                method: method.clone(),
                path: path.to_string(),
                source: source.without_url(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            method,
            path: path.to_string(),
            status,
            body: body.trim().to_string(),
        })
    }
}
