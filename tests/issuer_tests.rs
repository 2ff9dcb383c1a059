//! # Credential Issuer Tests
//!
//! The issuer driven end to end against an in-process store server.
//!
//! These tests verify:
//! - Initialization with and without connection verification
//! - Credential creation, including concurrent creation for one role
//! - Password and expiration rotation, revocation
//! - Aggregated and redacted errors

mod common;

use chrono::{TimeZone, Utc};
use common::{spawn_server, OPERATOR_ID, OPERATOR_SECRET};
use serde_json::{json, Map, Value};
use squid_vault_auth::issuer::{
    self, ChangeExpiration, ChangePassword, Database, DeleteUserRequest, InitializeRequest,
    IssuerError, NewUserRequest, Statements, UpdateUserRequest, UsernameMetadata,
};
use squid_vault_auth::server::hash::verify_secret;
use std::sync::Arc;
use tempfile::TempDir;

fn connection_config(base_url: &str, password: &str) -> Map<String, Value> {
    match json!({
        "connection_url": base_url,
        "username": OPERATOR_ID,
        "password": password,
        "connect_timeout": "2s",
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

async fn initialized_issuer(base_url: &str) -> impl Database {
    let db = issuer::new();
    db.initialize(InitializeRequest {
        config: connection_config(base_url, OPERATOR_SECRET),
        verify_connection: true,
    })
    .await
    .unwrap();
    db
}

fn new_user_request(role: &str, password: &str) -> NewUserRequest {
    NewUserRequest {
        username_config: UsernameMetadata::new("token-display", role),
        statements: Statements::default(),
        password: password.to_string(),
        expiration: Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
    }
}

#[tokio::test]
async fn test_initialize_with_verification() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&dir).await;

    let db = issuer::new();
    let response = db
        .initialize(InitializeRequest {
            config: connection_config(&server.base_url, OPERATOR_SECRET),
            verify_connection: true,
        })
        .await
        .unwrap();
    assert_eq!(response.config["connection_url"], json!(server.base_url));
    assert_eq!(db.type_name(), "squid");
    assert_eq!(
        db.secret_values().get(OPERATOR_SECRET).map(String::as_str),
        Some("[password]")
    );
}

#[tokio::test]
async fn test_initialize_with_wrong_secret_is_redacted() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&dir).await;

    let db = issuer::new();
    let err = db
        .initialize(InitializeRequest {
            config: connection_config(&server.base_url, "not-the-secret"),
            verify_connection: true,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, IssuerError::ProducerInitialization(_)));
    let text = err.to_string();
    assert!(text.contains("401"), "{text}");
    assert!(!text.contains("not-the-secret"), "{text}");
    assert!(db.secret_values().is_empty());
}

#[tokio::test]
async fn test_new_user_creates_record() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&dir).await;
    let db = initialized_issuer(&server.base_url).await;

    let username = db
        .new_user(new_user_request("reader", "p4ss"))
        .await
        .unwrap()
        .username;

    assert!(username.starts_with("v_token_di_reader_"), "{username}");
    assert!(username.len() <= 32);
    let record = server.state.store.get(&username).await.unwrap();
    assert!(verify_secret("p4ss", &record.password));
    assert_eq!(record.groups, vec!["reader"]);
    assert_eq!(record.expiration, 1_893_456_000);
}

#[tokio::test]
async fn test_concurrent_new_user_same_role() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&dir).await;
    let db = Arc::new(initialized_issuer(&server.base_url).await);

    let first = {
        let db = Arc::clone(&db);
        tokio::spawn(async move { db.new_user(new_user_request("writer", "a")).await })
    };
    let second = {
        let db = Arc::clone(&db);
        tokio::spawn(async move { db.new_user(new_user_request("writer", "b")).await })
    };
    let first = first.await.unwrap().unwrap().username;
    let second = second.await.unwrap().unwrap().username;

    assert_ne!(first, second);
    assert!(server.state.store.get(&first).await.is_ok());
    assert!(server.state.store.get(&second).await.is_ok());
    assert_eq!(server.state.store.len().await, 2);
}

#[tokio::test]
async fn test_custom_statements_and_duplicate_identifier() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&dir).await;

    let db = issuer::new();
    let mut config = connection_config(&server.base_url, OPERATOR_SECRET);
    config.insert("username_template".to_string(), json!("fixed-{{.RoleName}}"));
    db.initialize(InitializeRequest {
        config,
        verify_connection: false,
    })
    .await
    .unwrap();

    let mut request = new_user_request("ops", "pw");
    request.statements = Statements {
        commands: vec![r#"{"groups": ["{{role}}", "audit"], "exp_date": 0}"#.to_string()],
    };
    let username = db.new_user(request.clone()).await.unwrap().username;
    assert_eq!(username, "fixed-ops");
    let record = server.state.store.get("fixed-ops").await.unwrap();
    assert_eq!(record.groups, vec!["ops", "audit"]);
    assert_eq!(record.expiration, 0);

    let err = db.new_user(request).await.unwrap_err();
    let text = err.to_string();
    assert!(text.starts_with("unable to create user cleanly: 1 error occurred:"), "{text}");
    assert!(text.contains("user fixed-ops already exists"), "{text}");
}

#[tokio::test]
async fn test_rotate_password_and_expiration() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&dir).await;
    let db = initialized_issuer(&server.base_url).await;
    let username = db
        .new_user(new_user_request("reader", "first"))
        .await
        .unwrap()
        .username;

    let new_expiration = Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).unwrap();
    db.update_user(UpdateUserRequest {
        username: username.clone(),
        password: Some(ChangePassword {
            new_password: "second".to_string(),
            statements: Statements::default(),
        }),
        expiration: Some(ChangeExpiration {
            new_expiration,
            statements: Statements::default(),
        }),
    })
    .await
    .unwrap();

    let record = server.state.store.get(&username).await.unwrap();
    assert!(verify_secret("second", &record.password));
    assert!(!verify_secret("first", &record.password));
    assert_eq!(record.expiration, new_expiration.timestamp());
    assert_eq!(record.groups, vec!["reader"]);
}

#[tokio::test]
async fn test_rotate_without_changes_makes_no_call() {
    let db = issuer::new();
    let err = db
        .update_user(UpdateUserRequest {
            username: "anyone".to_string(),
            password: None,
            expiration: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "no changes requested");
}

#[tokio::test]
async fn test_rotate_missing_user_is_aggregated() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&dir).await;
    let db = initialized_issuer(&server.base_url).await;

    let err = db
        .update_user(UpdateUserRequest {
            username: "ghost".to_string(),
            password: Some(ChangePassword {
                new_password: "pw".to_string(),
                statements: Statements::default(),
            }),
            expiration: Some(ChangeExpiration {
                new_expiration: Utc::now(),
                statements: Statements::default(),
            }),
        })
        .await
        .unwrap_err();

    match &err {
        IssuerError::Aggregate { context, errors } => {
            assert_eq!(context, "unable to update user cleanly");
            assert_eq!(errors.len(), 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("user ghost not found"));
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&dir).await;
    let db = initialized_issuer(&server.base_url).await;
    let username = db
        .new_user(new_user_request("reader", "pw"))
        .await
        .unwrap()
        .username;

    for _ in 0..2 {
        db.delete_user(DeleteUserRequest {
            username: username.clone(),
            statements: Statements::default(),
        })
        .await
        .unwrap();
    }
    assert!(server.state.store.is_empty().await);
}

#[tokio::test]
async fn test_unreachable_store_is_aggregated() {
    let db = issuer::new();
    let mut config = connection_config("http://127.0.0.1:1", OPERATOR_SECRET);
    config.insert("connect_timeout".to_string(), json!("500ms"));
    db.initialize(InitializeRequest {
        config,
        verify_connection: false,
    })
    .await
    .unwrap();

    let err = db
        .delete_user(DeleteUserRequest {
            username: "someone".to_string(),
            statements: Statements::default(),
        })
        .await
        .unwrap_err();
    let text = err.to_string();
    assert!(text.starts_with("unable to delete user cleanly"), "{text}");
    assert!(text.contains("DELETE /api/v1/users/someone"), "{text}");
    assert!(!text.contains(OPERATOR_SECRET), "{text}");
    assert!(db.close().await.is_ok());
}

#[tokio::test]
async fn test_rotate_and_revoke_with_url_reserved_characters() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&dir).await;
    let db = initialized_issuer(&server.base_url).await;

    for display in ["ab#cd", "ab?cd", "ab%2fc"] {
        let mut request = new_user_request("reader", "first");
        request.username_config = UsernameMetadata::new(display, "reader");
        let username = db.new_user(request).await.unwrap().username;
        assert!(username.contains(display), "{username}");

        let new_expiration = Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).unwrap();
        db.update_user(UpdateUserRequest {
            username: username.clone(),
            password: Some(ChangePassword {
                new_password: "second".to_string(),
                statements: Statements::default(),
            }),
            expiration: Some(ChangeExpiration {
                new_expiration,
                statements: Statements::default(),
            }),
        })
        .await
        .unwrap();
        let record = server.state.store.get(&username).await.unwrap();
        assert!(verify_secret("second", &record.password), "{username}");
        assert_eq!(record.expiration, new_expiration.timestamp());

        db.delete_user(DeleteUserRequest {
            username: username.clone(),
            statements: Statements::default(),
        })
        .await
        .unwrap();
        assert!(
            server.state.store.get(&username).await.is_err(),
            "{username} still present after revocation"
        );
    }
    assert!(server.state.store.is_empty().await);
}

#[tokio::test]
async fn test_revoke_empty_username_is_rejected() {
    let dir = TempDir::new().unwrap();
    let server = spawn_server(&dir).await;
    let db = initialized_issuer(&server.base_url).await;
    let username = db
        .new_user(new_user_request("reader", "pw"))
        .await
        .unwrap()
        .username;

    let err = db
        .delete_user(DeleteUserRequest {
            username: String::new(),
            statements: Statements::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, IssuerError::InvalidUsername(_)), "{err:?}");
    assert!(server.state.store.get(&username).await.is_ok());
}
