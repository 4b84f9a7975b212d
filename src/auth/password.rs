//! Password hashing and verification using Argon2
//!
//! Stored credentials are argon2id PHC strings. Hash failures are internal
//! errors; a malformed stored hash is treated as a credential mismatch upstream.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::PortalError;

/// Minimum accepted password length at signup
pub const MIN_PASSWORD_LEN: usize = 6;

/// Check a signup password against its confirmation
pub fn validate_password_pair(password: &str, confirm: &str) -> Result<(), PortalError> {
    if password != confirm {
        return Err(PortalError::Validation(
            "Password does not match with confirm password!".into(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PortalError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters!"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, PortalError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PortalError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored PHC hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PortalError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| PortalError::Auth(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
