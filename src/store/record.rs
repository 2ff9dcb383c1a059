//! # User Records
//!
//! Wire and on-disk representation of one managed proxy credential.
//!
//! Field names (`user`, `pass`, `groups`, `exp_date`) are the agreed wire contract between the
//! issuer and the store, and are also the persisted JSON layout.

use serde::{Deserialize, Serialize};

/// One managed credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique key
    #[serde(rename = "user")]
    pub username: String,
    /// bcrypt hash once stored; plaintext only on the way in
    #[serde(rename = "pass")]
    pub password: String,
    /// Group memberships, in order
    #[serde(default)]
    pub groups: Vec<String>,
    /// Epoch seconds, 0 = never expires
    #[serde(rename = "exp_date", default)]
    pub expiration: i64,
}

impl UserRecord {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        groups: Vec<String>,
        expiration: i64,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            groups,
            expiration,
        }
    }

    /// Whether the record has expired at `now` (epoch seconds)
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expiration > 0 && self.expiration <= now
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    /// Overwrite the fields present in `patch`
    pub fn apply(&mut self, patch: UserPatch) {
        if let Some(password) = patch.password {
            self.password = password;
        }
        if let Some(groups) = patch.groups {
            self.groups = groups;
        }
        if let Some(expiration) = patch.expiration {
            self.expiration = expiration;
        }
    }
}

/// Partial record carried by `PATCH /api/v1/users/{user}`
///
/// The username always comes from the request path; a `user` field in the body is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(rename = "pass", default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(rename = "exp_date", default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,
}

impl UserPatch {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Self::default()
        }
    }

    pub fn expiration(expiration: i64) -> Self {
        Self {
            expiration: Some(expiration),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.password.is_none() && self.groups.is_none() && self.expiration.is_none()
    }
}
