use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};

use crate::error::AppError;

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, hashed: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hashed)
        .map_err(|e| AppError::Internal(format!("stored password hash is malformed: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
