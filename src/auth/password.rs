use crate::error::{AppError, AppResult};

/// bcrypt silently ignores input past this many bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Hash a password with bcrypt on the blocking pool. The salt is embedded
/// in the returned string.
pub async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::MalformedInput(format!(
            "Password must be at most {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await?
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

/// Constant-time check of `password` against a bcrypt hash. Passwords
/// longer than bcrypt can read never match, though the hash is still run.
pub async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    let fits = password.len() <= MAX_PASSWORD_BYTES;
    let matched = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await?
        .map_err(|e| AppError::Internal(format!("password verification failed: {}", e)))?;
    Ok(fits && matched)
}
