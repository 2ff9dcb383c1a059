//! # Database File Lock
//!
//! Exclusive `<db>.lock` file held for the lifetime of a [`super::RecordStore`].
//!
//! The lock file is created with `create_new`, so a second store on the same path fails
//! whether it lives in this process or another one. A crashed process leaves the lock file
//! behind; it has to be removed by hand before the store can be opened again.

use super::StoreError;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
pub(crate) struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub(crate) fn acquire(db_path: &Path) -> Result<Self, StoreError> {
        let lock_path = lock_path_for(db_path);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    StoreError::AlreadyOpen {
                        path: db_path.to_path_buf(),
                        lock_path: lock_path.clone(),
                    }
                } else {
                    StoreError::Write {
                        path: lock_path.clone(),
                        source: e,
                    }
                }
            })?;
        // Owner pid, for whoever has to clean up a stale lock.
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!("Failed to record pid in lock file {}: {}", lock_path.display(), e);
        }
        debug!("Acquired database lock {}", lock_path.display());
        Ok(Self { path: lock_path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Released database lock {}", self.path.display()),
            Err(e) => warn!(
                "Failed to remove database lock {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

pub(crate) fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".lock");
    db_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path_for(Path::new("/etc/squid-vault.json")),
            PathBuf::from("/etc/squid-vault.json.lock")
        );
    }

    #[test]
    fn test_second_acquire_fails_until_drop() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("users.json");

        let first = FileLock::acquire(&db).unwrap();
        assert!(matches!(
            FileLock::acquire(&db),
            Err(StoreError::AlreadyOpen { .. })
        ));

        drop(first);
        assert!(!lock_path_for(&db).exists());
        let _again = FileLock::acquire(&db).unwrap();
    }
}
