/// Password hashing and verification using Argon2id
use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString,
    },
    Argon2,
};

use crate::error::{AppError, Result};

const MIN_PASSWORD_LENGTH: usize = 8;

/// Seam for credential checks, so session tests do not pay Argon2 cost.
pub trait PasswordVerifier: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;

    fn verify(&self, password: &str, password_hash: &str) -> Result<bool>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2PasswordVerifier;

impl PasswordVerifier for Argon2PasswordVerifier {
    fn hash(&self, password: &str) -> Result<String> {
        hash_password(password)
    }

    fn verify(&self, password: &str, password_hash: &str) -> Result<bool> {
        verify_password(password, password_hash)
    }
}

/// Hash a password with a random salt, returning a PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    validate_password(password)?;

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Constant-time check of `password` against a PHC hash.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash format: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.trim().is_empty() {
        return Err(AppError::Validation("Password is required".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}
