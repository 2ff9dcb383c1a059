//! # Record Store
//!
//! File-backed collection of [`UserRecord`]s with a username uniqueness invariant.
//!
//! - One exclusive lock guards both the in-memory collection and the file. It is held for the
//!   whole call, including the file write, so callers never see a torn collection or a
//!   half-written file.
//! - Every successful mutation rewrites the full collection (indented JSON array) before
//!   returning. A failed write rolls the in-memory change back, so memory never runs ahead
//!   of disk.
//! - Only one store may have a given file open at a time (see [`lock`]).

mod error;
mod lock;
mod record;

pub use error::StoreError;
pub use record::{UserPatch, UserRecord};

use lock::FileLock;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// In-memory user records backed by a JSON file
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    records: Mutex<Vec<UserRecord>>,
    _lock: FileLock,
}

impl RecordStore {
    /// Open the store at `path`, creating an empty (`[]`) file if it doesn't exist
    ///
    /// # Errors
    ///
    /// [`StoreError::AlreadyOpen`] if another store holds the file, or an IO/decode error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        debug!("Creating database object for {}", path.display());
        let lock = FileLock::acquire(&path)?;

        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
        if !exists {
            debug!(
                "Database file doesn't exist. Creating file {}",
                path.display()
            );
            write_file(&path, b"[]").await?;
        }

        let records = read_records(&path).await?;
        info!(
            "Loaded {} user records from {}",
            records.len(),
            path.display()
        );
        Ok(Self {
            path,
            records: Mutex::new(records),
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file into memory, replacing the current collection
    ///
    /// # Errors
    ///
    /// IO or decode failure; the in-memory collection is left untouched.
    pub async fn load(&self) -> Result<usize, StoreError> {
        let mut records = self.records.lock().await;
        *records = read_records(&self.path).await?;
        Ok(records.len())
    }

    /// Persist the current collection
    ///
    /// # Errors
    ///
    /// Encode or IO failure.
    pub async fn save(&self) -> Result<(), StoreError> {
        let records = self.records.lock().await;
        persist(&self.path, &records).await
    }

    /// Copy of the record for `username`
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if absent.
    pub async fn get(&self, username: &str) -> Result<UserRecord, StoreError> {
        let records = self.records.lock().await;
        records
            .iter()
            .find(|r| r.username == username)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(username.to_string()))
    }

    /// Insert a new record; never overwrites
    ///
    /// # Errors
    ///
    /// [`StoreError::AlreadyExists`] for a duplicate username, [`StoreError::InvalidRecord`]
    /// for an unusable username, or a persistence failure (append rolled back).
    pub async fn add(&self, record: UserRecord) -> Result<(), StoreError> {
        validate_username(&record.username)?;
        let mut records = self.records.lock().await;
        if records.iter().any(|r| r.username == record.username) {
            return Err(StoreError::AlreadyExists(record.username));
        }

        records.push(record);
        if let Err(e) = persist(&self.path, &records).await {
            records.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Replace password, groups and expiration of an existing record
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if absent, or a persistence failure (change rolled back).
    pub async fn update(&self, record: UserRecord) -> Result<(), StoreError> {
        let username = record.username.clone();
        self.modify(&username, move |existing| {
            existing.password = record.password;
            existing.groups = record.groups;
            existing.expiration = record.expiration;
        })
        .await
        .map(|_| ())
    }

    /// Merge the fields present in `patch` into an existing record
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if absent, or a persistence failure (change rolled back).
    pub async fn patch(&self, username: &str, patch: UserPatch) -> Result<UserRecord, StoreError> {
        self.modify(username, move |existing| existing.apply(patch))
            .await
    }

    /// Remove every record for `username`; absent is not an error
    ///
    /// Returns how many records were removed.
    ///
    /// # Errors
    ///
    /// Persistence failure (removal rolled back).
    pub async fn delete(&self, username: &str) -> Result<usize, StoreError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        let Some(first) = records.iter().position(|r| r.username == username) else {
            return Ok(0);
        };

        let previous = records.clone();
        records.retain(|r| r.username != username);
        let removed = before - records.len();
        if removed > 1 {
            tracing::warn!(
                "Removed {} duplicate records for {} (first at index {})",
                removed,
                username,
                first
            );
        }
        if let Err(e) = persist(&self.path, &records).await {
            *records = previous;
            return Err(e);
        }
        Ok(removed)
    }

    /// Snapshot of all records, in stored order
    pub async fn records(&self) -> Vec<UserRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    async fn modify<F>(&self, username: &str, change: F) -> Result<UserRecord, StoreError>
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut records = self.records.lock().await;
        let index = records
            .iter()
            .position(|r| r.username == username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;

        let previous = records[index].clone();
        change(&mut records[index]);
        let updated = records[index].clone();
        if let Err(e) = persist(&self.path, &records).await {
            records[index] = previous;
            return Err(e);
        }
        Ok(updated)
    }
}

/// Usernames are path segments on the wire and space-separated tokens in the Squid helper
/// protocol, so they must be non-empty and free of whitespace and `/`.
fn validate_username(username: &str) -> Result<(), StoreError> {
    if username.is_empty() {
        return Err(StoreError::InvalidRecord("username cannot be empty".to_string()));
    }
    if username.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(StoreError::InvalidRecord(format!(
            "username '{username}' contains whitespace or '/'"
        )));
    }
    Ok(())
}

async fn read_records(path: &Path) -> Result<Vec<UserRecord>, StoreError> {
    let content = tokio::fs::read(path)
        .await
        .map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&content).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

async fn persist(path: &Path, records: &[UserRecord]) -> Result<(), StoreError> {
    let content = serde_json::to_vec_pretty(records).map_err(StoreError::Encode)?;
    write_file(path, &content).await
}

/// Write to a sibling temp file and rename it over `path`
async fn write_file(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp_name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(&tmp_path).await.map_err(write_err)?;
    file.write_all(content).await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;
    drop(file);
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_err)
}
