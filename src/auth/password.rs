use crate::error::{AppError, AppResult};

/// Hash a plaintext password with bcrypt at the given cost.
pub fn hash_password(plaintext: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(plaintext, cost)
}

/// Constant-time verification against a stored bcrypt hash.
/// A malformed hash never verifies.
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}

/// Hashes on the blocking pool; bcrypt at a real cost takes tens of milliseconds.
pub async fn hash_password_blocking(plaintext: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&plaintext, cost))
        .await
        .map_err(|e| AppError::Internal(format!("Password task failed: {}", e)))?
        .map_err(AppError::from)
}

pub async fn verify_password_blocking(plaintext: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plaintext, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password task failed: {}", e)))
}
