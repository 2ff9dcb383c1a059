//! # Password Hashing
//!
//! bcrypt hash/verify. bcrypt is deliberately slow, so the async variants run on the
//! blocking pool instead of stalling a runtime worker.

use tokio::task::JoinError;

/// Hashing failure
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("failed to hash secret: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("hashing task failed: {0}")]
    Join(#[from] JoinError),
}

/// One-way hash of `secret` at `cost`
///
/// # Errors
///
/// Invalid cost or bcrypt failure.
pub fn hash_secret(secret: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(secret, cost)
}

/// Whether `secret` matches `hash`; a malformed hash never matches
pub fn verify_secret(secret: &str, hash: &str) -> bool {
    bcrypt::verify(secret, hash).unwrap_or(false)
}

/// [`hash_secret`] on the blocking pool
///
/// # Errors
///
/// Invalid cost, bcrypt failure or a panicked task.
pub async fn hash_secret_blocking(secret: String, cost: u32) -> Result<String, HashError> {
    Ok(tokio::task::spawn_blocking(move || hash_secret(&secret, cost)).await??)
}

/// [`verify_secret`] on the blocking pool; a panicked task counts as a mismatch
pub async fn verify_secret_blocking(secret: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_secret(&secret, &hash))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_secret("hunter2", 4).unwrap();
        assert_ne!(hash, "hunter2");
        assert!(verify_secret("hunter2", &hash));
        assert!(!verify_secret("hunter3", &hash));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_secret("hunter2", "hunter2"));
        assert!(!verify_secret("hunter2", ""));
    }

    #[tokio::test]
    async fn test_blocking_variants() {
        let hash = hash_secret_blocking("s3cret".to_string(), 4).await.unwrap();
        assert!(verify_secret_blocking("s3cret".to_string(), hash).await);
    }

    #[test]
    fn test_invalid_cost() {
        assert!(hash_secret("x", 2).is_err());
    }
}
