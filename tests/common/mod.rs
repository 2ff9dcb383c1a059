//! Shared fixtures: a store in a temp dir and an in-process store server.

#![allow(dead_code, reason = "each test binary uses a different subset of the fixtures")]

use axum::http::HeaderValue;
use squid_vault_auth::server::hash::hash_secret;
use squid_vault_auth::server::{router, AppState, BasicCredentials, OperatorCredentials};
use squid_vault_auth::store::RecordStore;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub const OPERATOR_ID: &str = "vault";
pub const OPERATOR_SECRET: &str = "operator-s3cret";

/// bcrypt cost used everywhere in tests
pub const TEST_HASH_COST: u32 = 4;

/// Store file inside `dir`
pub async fn open_store(dir: &TempDir) -> RecordStore {
    RecordStore::open(dir.path().join("users.json"))
        .await
        .expect("open store")
}

/// Handler state over a fresh store in `dir`
pub async fn test_state(dir: &TempDir) -> AppState {
    let store = open_store(dir).await;
    let hash = hash_secret(OPERATOR_SECRET, TEST_HASH_COST).expect("hash operator secret");
    AppState::new(
        Arc::new(store),
        OperatorCredentials::new(OPERATOR_ID, hash),
        "*",
        TEST_HASH_COST,
    )
    .expect("app state")
}

/// `Authorization` header for a username/password pair
pub fn basic_auth(username: &str, password: &str) -> HeaderValue {
    let credentials = BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    };
    HeaderValue::from_str(&credentials.header_value()).expect("header value")
}

pub fn operator_auth() -> HeaderValue {
    basic_auth(OPERATOR_ID, OPERATOR_SECRET)
}

/// A store server listening on an ephemeral localhost port
pub struct RunningServer {
    pub base_url: String,
    pub state: AppState,
    handle: JoinHandle<()>,
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn_server(dir: &TempDir) -> RunningServer {
    let state = test_state(dir).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    state.mark_ready();

    let app = router(state.clone());
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    RunningServer {
        base_url: format!("http://{addr}"),
        state,
        handle,
    }
}
