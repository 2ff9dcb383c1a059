//! # Store Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Record store failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with this username
    #[error("user not found: {0}")]
    NotFound(String),
    /// `add` of a username that is already present
    #[error("user already exist: {0}")]
    AlreadyExists(String),
    /// Record rejected before touching the collection
    #[error("invalid user record: {0}")]
    InvalidRecord(String),
    /// Another store (in this or another process) holds the file
    #[error("database file {} is already open (lock file {} exists)", path.display(), lock_path.display())]
    AlreadyOpen { path: PathBuf, lock_path: PathBuf },
    #[error("failed to read database file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write database file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode database file {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode user records: {0}")]
    Encode(#[source] serde_json::Error),
}

impl StoreError {
    /// Stable label for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "not_found",
            StoreError::AlreadyExists(_) => "already_exists",
            StoreError::InvalidRecord(_) => "invalid_record",
            StoreError::AlreadyOpen { .. } => "already_open",
            StoreError::Read { .. } => "read_error",
            StoreError::Write { .. } => "write_error",
            StoreError::Decode { .. } => "decode_error",
            StoreError::Encode(_) => "encode_error",
        }
    }
}
