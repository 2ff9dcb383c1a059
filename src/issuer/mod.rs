//! # Credential Issuer
//!
//! Dynamic-secrets plugin that creates, rotates and revokes short-lived proxy credentials in a
//! remote store through its HTTP API.
//!
//! The host drives it through the [`Database`] trait. Identifiers come from a
//! [`UsernameTemplate`], record payloads from creation statements, and every store call goes
//! through the [`ConnectionProducer`]. [`new`] returns the issuer wrapped in an
//! [`ErrorSanitizer`] so that configured secrets never leave in error text.
//!
//! Lifecycle calls on one issuer are serialized on an async mutex. Separate issuer processes
//! are only coordinated by the store's uniqueness check.

pub mod client;
pub mod connection;
mod duration;
mod error;
pub mod sanitizer;
pub mod statements;
pub mod template;
pub mod types;

pub use client::{ClientError, StoreClient};
pub use connection::{Connection, ConnectionConfig, ConnectionProducer};
pub use duration::parse_duration;
pub use error::IssuerError;
pub use sanitizer::ErrorSanitizer;
pub use template::{TemplateError, UsernameMetadata, UsernameTemplate, DEFAULT_USERNAME_TEMPLATE};
pub use types::*;

use crate::constants::DATABASE_TYPE_NAME;
use crate::store::UserPatch;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use statements::{render_creation, StatementValues};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use types::expiration_seconds;

/// Host configuration key for the username template
pub const USERNAME_TEMPLATE_KEY: &str = "username_template";

/// Lifecycle contract between the secrets host and a credential backend
#[async_trait]
pub trait Database: Send + Sync {
    /// Load (or reload) configuration
    async fn initialize(&self, request: InitializeRequest)
        -> Result<InitializeResponse, IssuerError>;

    /// Create a credential and return its generated identifier
    async fn new_user(&self, request: NewUserRequest) -> Result<NewUserResponse, IssuerError>;

    /// Rotate the password and/or expiration of an existing credential
    async fn update_user(&self, request: UpdateUserRequest)
        -> Result<UpdateUserResponse, IssuerError>;

    /// Revoke a credential; revoking an absent credential succeeds
    async fn delete_user(&self, request: DeleteUserRequest)
        -> Result<DeleteUserResponse, IssuerError>;

    fn type_name(&self) -> &'static str;

    /// Secret value -> redaction marker
    fn secret_values(&self) -> HashMap<String, String>;

    async fn close(&self) -> Result<(), IssuerError>;
}

/// Issuer wrapped in the error sanitizer, ready to hand to the host
pub fn new() -> ErrorSanitizer<CredentialIssuer> {
    ErrorSanitizer::new(CredentialIssuer::new())
}

#[derive(Debug, Default)]
struct IssuerState {
    template: Option<UsernameTemplate>,
}

/// Squid store credential backend
#[derive(Debug, Default)]
pub struct CredentialIssuer {
    producer: ConnectionProducer,
    state: Mutex<IssuerState>,
}

impl CredentialIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn producer(&self) -> &ConnectionProducer {
        &self.producer
    }
}

/// Template from `username_template`, or the default when absent or empty
fn resolve_template(config: &Map<String, Value>) -> Result<UsernameTemplate, IssuerError> {
    let source = match config.get(USERNAME_TEMPLATE_KEY) {
        None | Some(Value::Null) => DEFAULT_USERNAME_TEMPLATE,
        Some(Value::String(s)) if s.trim().is_empty() => DEFAULT_USERNAME_TEMPLATE,
        Some(Value::String(s)) => s.as_str(),
        Some(_) => {
            return Err(IssuerError::TemplateResolution(format!(
                "{USERNAME_TEMPLATE_KEY} must be a string"
            )));
        }
    };
    UsernameTemplate::parse(source).map_err(|e| IssuerError::TemplateResolution(e.to_string()))
}

/// Reject identifiers that cannot name a single store record
fn check_username(username: &str) -> Result<(), IssuerError> {
    if username.trim().is_empty() {
        return Err(IssuerError::InvalidUsername("username cannot be empty".to_string()));
    }
    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(IssuerError::InvalidUsername(format!(
            "'{username}' contains whitespace or control characters"
        )));
    }
    Ok(())
}

/// Store call failure for a named user
fn user_error(error: ClientError, username: &str) -> IssuerError {
    match error.status() {
        Some(StatusCode::NOT_FOUND) => IssuerError::NotFound(username.to_string()),
        Some(StatusCode::CONFLICT) => IssuerError::AlreadyExists(username.to_string()),
        _ => error.into(),
    }
}

#[async_trait]
impl Database for CredentialIssuer {
    async fn initialize(
        &self,
        request: InitializeRequest,
    ) -> Result<InitializeResponse, IssuerError> {
        let span = info_span!("issuer.initialize", verify = request.verify_connection);
        async move {
            let mut state = self.state.lock().await;

            let template = resolve_template(&request.config)?;
            template
                .generate(&UsernameMetadata::new("displayname", "rolename"))
                .map_err(|e| IssuerError::TemplateValidation(e.to_string()))?;

            let connection = Connection::prepare(&request.config)
                .map_err(|e| IssuerError::ProducerInitialization(e.to_string()))?;
            if request.verify_connection {
                connection
                    .verify()
                    .await
                    .map_err(|e| IssuerError::ProducerInitialization(e.to_string()))?;
            }

            self.producer.install(connection);
            state.template = Some(template);
            info!("Credential issuer initialized");
            Ok(InitializeResponse {
                config: request.config,
            })
        }
        .instrument(span)
        .await
    }

    async fn new_user(&self, request: NewUserRequest) -> Result<NewUserResponse, IssuerError> {
        let span = info_span!(
            "issuer.new_user",
            role = %request.username_config.role_name
        );
        async move {
            let state = self.state.lock().await;
            let connection = self.producer.connection()?;
            let template = state.template.as_ref().ok_or(IssuerError::NotInitialized)?;

            let username = template
                .generate(&request.username_config)
                .map_err(|e| IssuerError::TemplateValidation(e.to_string()))?;
            debug!("  Generated username {}", username);

            let values = StatementValues {
                username: &username,
                password: &request.password,
                role: &request.username_config.role_name,
                display_name: &request.username_config.display_name,
                expiration: expiration_seconds(request.expiration),
            };

            let mut errors = Vec::new();
            match render_creation(&request.statements.commands, &values) {
                Ok(record) => {
                    if let Err(e) = connection.client().create_user(&record).await {
                        errors.push(user_error(e, &username));
                    }
                }
                Err(e) => errors.push(e),
            }
            IssuerError::aggregate("unable to create user cleanly", errors)?;

            info!("  Created user {}", username);
            Ok(NewUserResponse { username })
        }
        .instrument(span)
        .await
    }

    async fn update_user(
        &self,
        request: UpdateUserRequest,
    ) -> Result<UpdateUserResponse, IssuerError> {
        if request.password.is_none() && request.expiration.is_none() {
            return Err(IssuerError::NoChanges);
        }
        check_username(&request.username)?;

        let span = info_span!("issuer.update_user", user = %request.username);
        async move {
            let _state = self.state.lock().await;
            let connection = self.producer.connection()?;
            let client = connection.client();
            let username = request.username.as_str();

            let mut errors = Vec::new();
            if let Some(change) = &request.password {
                if let Err(e) = client
                    .update_user(username, &UserPatch::password(change.new_password.as_str()))
                    .await
                {
                    errors.push(user_error(e, username));
                }
            }
            if let Some(change) = &request.expiration {
                let patch = UserPatch::expiration(change.new_expiration.timestamp());
                if let Err(e) = client.update_user(username, &patch).await {
                    errors.push(user_error(e, username));
                }
            }
            IssuerError::aggregate("unable to update user cleanly", errors)?;

            info!("  Updated user {}", username);
            Ok(UpdateUserResponse {})
        }
        .instrument(span)
        .await
    }

    async fn delete_user(
        &self,
        request: DeleteUserRequest,
    ) -> Result<DeleteUserResponse, IssuerError> {
        check_username(&request.username)?;
        let span = info_span!("issuer.delete_user", user = %request.username);
        async move {
            let _state = self.state.lock().await;
            let connection = self.producer.connection()?;

            let mut errors = Vec::new();
            if let Err(e) = connection.client().delete_user(&request.username).await {
                warn!("  Failed to delete user {}: {}", request.username, e);
                errors.push(e.into());
            }
            IssuerError::aggregate("unable to delete user cleanly", errors)?;

            info!("  Deleted user {}", request.username);
            Ok(DeleteUserResponse {})
        }
        .instrument(span)
        .await
    }

    fn type_name(&self) -> &'static str {
        DATABASE_TYPE_NAME
    }

    fn secret_values(&self) -> HashMap<String, String> {
        self.producer.secret_values()
    }

    async fn close(&self) -> Result<(), IssuerError> {
        self.producer.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_resolve_template() {
        assert_eq!(
            resolve_template(&Map::new()).unwrap().source(),
            DEFAULT_USERNAME_TEMPLATE
        );
        assert_eq!(
            resolve_template(&config(json!({"username_template": ""})))
                .unwrap()
                .source(),
            DEFAULT_USERNAME_TEMPLATE
        );
        assert_eq!(
            resolve_template(&config(json!({"username_template": "u-{{.RoleName}}"})))
                .unwrap()
                .source(),
            "u-{{.RoleName}}"
        );
        assert!(matches!(
            resolve_template(&config(json!({"username_template": 5}))),
            Err(IssuerError::TemplateResolution(_))
        ));
        assert!(matches!(
            resolve_template(&config(json!({"username_template": "{{ nope }}"}))),
            Err(IssuerError::TemplateResolution(_))
        ));
    }

    #[test]
    fn test_check_username() {
        assert!(check_username("v_ab#cd_reader_1").is_ok());
        assert!(check_username("ab?cd%2f").is_ok());
        assert!(matches!(
            check_username(""),
            Err(IssuerError::InvalidUsername(_))
        ));
        assert!(matches!(
            check_username("  "),
            Err(IssuerError::InvalidUsername(_))
        ));
        assert!(matches!(
            check_username("a b"),
            Err(IssuerError::InvalidUsername(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_username_is_rejected_before_any_call() {
        let issuer = CredentialIssuer::new();
        let err = issuer
            .delete_user(DeleteUserRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IssuerError::InvalidUsername(_)));

        let err = issuer
            .update_user(UpdateUserRequest {
                password: Some(ChangePassword {
                    new_password: "pw".to_string(),
                    statements: Statements::default(),
                }),
                ..UpdateUserRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IssuerError::InvalidUsername(_)));
    }

    #[tokio::test]
    async fn test_calls_before_initialize() {
        let issuer = CredentialIssuer::new();
        assert_eq!(issuer.type_name(), "squid");
        assert!(issuer.secret_values().is_empty());

        let err = issuer
            .new_user(NewUserRequest {
                username_config: UsernameMetadata::new("token", "reader"),
                password: "pw".to_string(),
                ..NewUserRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IssuerError::NotInitialized));

        let err = issuer
            .delete_user(DeleteUserRequest {
                username: "bob".to_string(),
                ..DeleteUserRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IssuerError::NotInitialized));
    }

    #[tokio::test]
    async fn test_update_without_changes() {
        let issuer = CredentialIssuer::new();
        let err = issuer
            .update_user(UpdateUserRequest {
                username: "bob".to_string(),
                ..UpdateUserRequest::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no changes requested");
    }

    #[tokio::test]
    async fn test_failed_initialize_keeps_previous_state() {
        let issuer = CredentialIssuer::new();
        let good = config(json!({
            "connection_url": "http://127.0.0.1:1",
            "username": "admin",
            "password": "first",
        }));
        issuer
            .initialize(InitializeRequest {
                config: good,
                verify_connection: false,
            })
            .await
            .unwrap();

        let mut bad = config(json!({
            "connection_url": "http://127.0.0.1:1",
            "username": "admin",
            "password": "second",
        }));
        bad.insert(
            "username_template".to_string(),
            json!(r#"{{ truncate "x" .RoleName }}"#),
        );
        let err = issuer
            .initialize(InitializeRequest {
                config: bad,
                verify_connection: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IssuerError::TemplateValidation(_)));
        assert!(issuer.secret_values().contains_key("first"));

        let err = issuer
            .initialize(InitializeRequest {
                config: config(json!({"connection_url": "http://127.0.0.1:1"})),
                verify_connection: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IssuerError::ProducerInitialization(_)));
        assert!(issuer.secret_values().contains_key("first"));
    }
}
