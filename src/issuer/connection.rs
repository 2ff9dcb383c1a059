//! # Connection Producer
//!
//! Holds the store connection settings and gates every network call on them.
//!
//! `Unconfigured -> Initialized -> (optionally) Verified`. A configuration load is prepared and
//! verified off to the side, then installed in one step; a failed load never replaces the
//! current one.

use super::client::{ClientError, StoreClient};
use super::duration::parse_duration;
use super::IssuerError;
use crate::constants::{DEFAULT_CONNECT_TIMEOUT, PASSWORD_REDACTION_MARKER};
use reqwest::Url;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};
use zeroize::Zeroizing;

impl From<ClientError> for IssuerError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Build(e) => IssuerError::Configuration(e.to_string()),
            ClientError::Request {
                method,
                path,
                source,
            } => IssuerError::Transport {
                operation: format!("{method} {path}"),
                status: None,
                body: source.to_string(),
            },
            ClientError::Status {
                method,
                path,
                status,
                body,
            } => IssuerError::Transport {
                operation: format!("{method} {path}"),
                status: Some(status.as_u16()),
                body,
            },
        }
    }
}

/// Store connection settings, decoded from the host configuration map
#[derive(Clone)]
pub struct ConnectionConfig {
    pub connection_url: String,
    pub username: String,
    pub password: Zeroizing<String>,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("connection_url", &self.connection_url)
            .field("username", &self.username)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectionConfig {
    /// Decode and validate `connection_url`, `username`, `password` and `connect_timeout`
    ///
    /// Values may be strings, numbers or booleans. Other keys are ignored.
    ///
    /// # Errors
    ///
    /// [`IssuerError::Configuration`] naming the first offending field, checked in the order
    /// timeout, URL, username, password, then URL syntax.
    pub fn from_map(config: &Map<String, Value>) -> Result<Self, IssuerError> {
        let connection_url = weak_string(config, "connection_url")?.unwrap_or_default();
        let username = weak_string(config, "username")?.unwrap_or_default();
        let password = Zeroizing::new(weak_string(config, "password")?.unwrap_or_default());
        let raw_timeout = weak_string(config, "connect_timeout")?
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONNECT_TIMEOUT.to_string());

        let connect_timeout = parse_duration(&raw_timeout)
            .map_err(|e| IssuerError::Configuration(format!("invalid connect_timeout: {e}")))?;
        if connection_url.is_empty() {
            return Err(IssuerError::Configuration(
                "connection_url cannot be empty".to_string(),
            ));
        }
        if username.is_empty() {
            return Err(IssuerError::Configuration(
                "username cannot be empty".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(IssuerError::Configuration(
                "password cannot be empty".to_string(),
            ));
        }

        let url = Url::parse(&connection_url).map_err(|e| {
            IssuerError::Configuration(format!("invalid connection_url '{connection_url}': {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IssuerError::Configuration(format!(
                "invalid connection_url '{connection_url}': unsupported scheme {}",
                url.scheme()
            )));
        }

        Ok(Self {
            connection_url,
            username,
            password,
            connect_timeout,
        })
    }
}

fn weak_string(config: &Map<String, Value>, key: &str) -> Result<Option<String>, IssuerError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Array(_) | Value::Object(_)) => Err(IssuerError::Configuration(format!(
            "{key}: expected a string"
        ))),
    }
}

/// One installed configuration load with its client
#[derive(Debug)]
pub struct Connection {
    config: ConnectionConfig,
    client: StoreClient,
}

impl Connection {
    /// Build a connection without any network call
    ///
    /// # Errors
    ///
    /// Invalid configuration or HTTP client construction failure.
    pub fn prepare(config: &Map<String, Value>) -> Result<Self, IssuerError> {
        let config = ConnectionConfig::from_map(config)?;
        let client = StoreClient::new(
            &config.connection_url,
            &config.username,
            &config.password,
            config.connect_timeout,
        )?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn client(&self) -> &StoreClient {
        &self.client
    }

    /// `GET /authTest` with the operator credential
    ///
    /// # Errors
    ///
    /// [`IssuerError::Transport`] on a transport failure or non-2xx answer.
    pub async fn verify(&self) -> Result<(), IssuerError> {
        debug!("Verifying connection to {}", self.config.connection_url);
        self.client.auth_test().await?;
        Ok(())
    }
}

/// Owner of the current [`Connection`]
#[derive(Debug, Default)]
pub struct ConnectionProducer {
    current: RwLock<Option<Arc<Connection>>>,
}

impl ConnectionProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `config`, optionally probe it, then install it
    ///
    /// # Errors
    ///
    /// Configuration errors, or the probe failure when `verify` is set. The previously
    /// installed configuration stays in place on error.
    pub async fn initialize(
        &self,
        config: &Map<String, Value>,
        verify: bool,
    ) -> Result<(), IssuerError> {
        let connection = Connection::prepare(config)?;
        if verify {
            connection.verify().await?;
        }
        self.install(connection);
        Ok(())
    }

    /// Make `connection` current
    pub fn install(&self, connection: Connection) {
        info!(
            "Connection producer initialized for {}",
            connection.config.connection_url
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(connection));
    }

    pub fn is_initialized(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current connection
    ///
    /// # Errors
    ///
    /// [`IssuerError::NotInitialized`] before the first successful initialize.
    pub fn connection(&self) -> Result<Arc<Connection>, IssuerError> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
            .ok_or(IssuerError::NotInitialized)
    }

    /// Liveness probe against the store; no network call before initialize
    ///
    /// # Errors
    ///
    /// [`IssuerError::NotInitialized`] or [`IssuerError::Transport`].
    pub async fn probe(&self) -> Result<(), IssuerError> {
        self.connection()?.verify().await
    }

    /// Nothing to release for stateless HTTP; safe to call repeatedly
    pub fn close(&self) {
        let _guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        debug!("Connection producer closed");
    }

    /// `{ <configured password>: "[password]" }`, empty before initialize
    pub fn secret_values(&self) -> HashMap<String, String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|connection| {
                HashMap::from([(
                    connection.config.password.to_string(),
                    PASSWORD_REDACTION_MARKER.to_string(),
                )])
            })
            .unwrap_or_default()
    }
}
