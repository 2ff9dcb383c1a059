//! # Error Sanitizer
//!
//! [`Database`] decorator that rewrites the text of every error returned by the wrapped backend,
//! replacing each secret reported by [`Database::secret_values`] with its marker. For
//! `initialize` the password carried by the incoming configuration is redacted too, since the
//! backend may not have accepted it yet.

use super::{
    Database, DeleteUserRequest, DeleteUserResponse, InitializeRequest, InitializeResponse,
    IssuerError, NewUserRequest, NewUserResponse, UpdateUserRequest, UpdateUserResponse,
};
use crate::constants::PASSWORD_REDACTION_MARKER;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use zeroize::Zeroizing;

/// Redacting wrapper around a [`Database`]
#[derive(Debug)]
pub struct ErrorSanitizer<D> {
    inner: D,
}

impl<D: Database> ErrorSanitizer<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    fn sanitize(&self, error: IssuerError) -> IssuerError {
        error.redact(&self.inner.secret_values())
    }
}

#[async_trait]
impl<D: Database> Database for ErrorSanitizer<D> {
    async fn initialize(
        &self,
        request: InitializeRequest,
    ) -> Result<InitializeResponse, IssuerError> {
        let incoming = request.config.get("password").and_then(|value| match value {
            Value::String(s) => Some(Zeroizing::new(s.clone())),
            Value::Number(n) => Some(Zeroizing::new(n.to_string())),
            _ => None,
        });

        self.inner.initialize(request).await.map_err(|error| {
            let mut secrets = self.inner.secret_values();
            if let Some(password) = incoming {
                secrets.insert(password.to_string(), PASSWORD_REDACTION_MARKER.to_string());
            }
            error.redact(&secrets)
        })
    }

    async fn new_user(&self, request: NewUserRequest) -> Result<NewUserResponse, IssuerError> {
        self.inner
            .new_user(request)
            .await
            .map_err(|e| self.sanitize(e))
    }

    async fn update_user(
        &self,
        request: UpdateUserRequest,
    ) -> Result<UpdateUserResponse, IssuerError> {
        self.inner
            .update_user(request)
            .await
            .map_err(|e| self.sanitize(e))
    }

    async fn delete_user(
        &self,
        request: DeleteUserRequest,
    ) -> Result<DeleteUserResponse, IssuerError> {
        self.inner
            .delete_user(request)
            .await
            .map_err(|e| self.sanitize(e))
    }

    fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    fn secret_values(&self) -> HashMap<String, String> {
        self.inner.secret_values()
    }

    async fn close(&self) -> Result<(), IssuerError> {
        self.inner.close().await.map_err(|e| self.sanitize(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Backend whose every call fails with its secret in the message
    #[derive(Debug)]
    struct Leaky;

    #[async_trait]
    impl Database for Leaky {
        async fn initialize(
            &self,
            request: InitializeRequest,
        ) -> Result<InitializeResponse, IssuerError> {
            Err(IssuerError::Configuration(format!(
                "rejected {}",
                request.config["password"]
            )))
        }

        async fn new_user(&self, _: NewUserRequest) -> Result<NewUserResponse, IssuerError> {
            Err(IssuerError::Aggregate {
                context: "unable to create user cleanly".to_string(),
                errors: vec![IssuerError::Transport {
                    operation: "PUT /api/v1/users".to_string(),
                    status: Some(500),
                    body: "operator hunter2 refused".to_string(),
                }],
            })
        }

        async fn update_user(
            &self,
            _: UpdateUserRequest,
        ) -> Result<UpdateUserResponse, IssuerError> {
            Err(IssuerError::NoChanges)
        }

        async fn delete_user(
            &self,
            _: DeleteUserRequest,
        ) -> Result<DeleteUserResponse, IssuerError> {
            Err(IssuerError::NotFound("hunter2".to_string()))
        }

        fn type_name(&self) -> &'static str {
            "leaky"
        }

        fn secret_values(&self) -> HashMap<String, String> {
            HashMap::from([("hunter2".to_string(), "[password]".to_string())])
        }

        async fn close(&self) -> Result<(), IssuerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_redacts_configured_secret() {
        let db = ErrorSanitizer::new(Leaky);
        let err = db.new_user(NewUserRequest::default()).await.unwrap_err();
        let text = err.to_string();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("operator [password] refused"));

        let err = db.delete_user(DeleteUserRequest::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "user [password] not found");
    }

    #[tokio::test]
    async fn test_redacts_incoming_password() {
        let db = ErrorSanitizer::new(Leaky);
        let config = match json!({"password": "brand-new"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let err = db
            .initialize(InitializeRequest {
                config,
                verify_connection: false,
            })
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("brand-new"));
        assert!(err.to_string().contains("[password]"));
    }

    #[tokio::test]
    async fn test_passthrough() {
        let db = ErrorSanitizer::new(Leaky);
        assert_eq!(db.type_name(), "leaky");
        assert!(db.close().await.is_ok());
        assert!(matches!(
            db.update_user(UpdateUserRequest::default()).await,
            Err(IssuerError::NoChanges)
        ));
    }
}
