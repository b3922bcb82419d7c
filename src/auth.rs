//! Credential checks and password hashing for the join/login pages.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use uuid::Uuid;

use crate::error::AppError;

pub const DEFAULT_REDIRECT: &str = "/workouts";
const MIN_PASSWORD_LEN: usize = 6;

pub fn validate_email(email: &str) -> Result<(), AppError> {
    if email.len() > 3 && email.contains('@') {
        Ok(())
    } else {
        Err(AppError::validation("email", "Email is invalid"))
    }
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::validation("password", "Password is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("password", "Password is too short"));
    }
    Ok(())
}

pub fn invalid_credentials() -> AppError {
    AppError::validation("email", "Invalid email or password")
}

/// Hashes a password into a PHC string (argon2id, random salt).
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AppError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::PasswordHash(e.to_string()))
}

/// Checks a password against a stored PHC string. An unparseable hash never verifies.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Only same-site absolute paths are followed after login; anything else
/// falls back to `default`.
pub fn safe_redirect<'a>(target: Option<&'a str>, default: &'a str) -> &'a str {
    match target {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => default,
    }
}
