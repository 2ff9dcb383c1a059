//! Request and response types of the [`Database`](super::Database) lifecycle calls.

use super::template::UsernameMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Statements supplied by the host for one call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statements {
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitializeRequest {
    pub config: Map<String, Value>,
    #[serde(default)]
    pub verify_connection: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitializeResponse {
    /// Configuration to persist on the host side
    pub config: Map<String, Value>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct NewUserRequest {
    pub username_config: UsernameMetadata,
    #[serde(default)]
    pub statements: Statements,
    pub password: String,
    /// `None` = never expires
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for NewUserRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUserRequest")
            .field("username_config", &self.username_config)
            .field("statements", &self.statements)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserResponse {
    pub username: String,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ChangePassword {
    pub new_password: String,
    #[serde(default)]
    pub statements: Statements,
}

impl std::fmt::Debug for ChangePassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePassword")
            .field("statements", &self.statements)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeExpiration {
    pub new_expiration: DateTime<Utc>,
    #[serde(default)]
    pub statements: Statements,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub username: String,
    #[serde(default)]
    pub password: Option<ChangePassword>,
    #[serde(default)]
    pub expiration: Option<ChangeExpiration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUserResponse {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteUserRequest {
    pub username: String,
    #[serde(default)]
    pub statements: Statements,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteUserResponse {}

/// Epoch seconds for a store record; `None` = 0 = never
pub(crate) fn expiration_seconds(expiration: Option<DateTime<Utc>>) -> i64 {
    expiration.map_or(0, |t| t.timestamp())
}
