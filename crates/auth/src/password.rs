//! Password hashing and verification (Argon2id, PHC string format).

use std::sync::LazyLock;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use thiserror::Error;

static ARGON2: LazyLock<Argon2<'static>> = LazyLock::new(|| {
    // 19 MiB, 2 passes, 1 lane (OWASP baseline for Argon2id).
    let params = Params::new(19 * 1024, 2, 1, None).unwrap_or_default();
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
});

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("hash error: {0}")]
    Hash(String),

    #[error("stored hash is malformed: {0}")]
    MalformedHash(String),
}

/// Hash a plaintext password with a fresh random salt.
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    ARGON2
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Compare a plaintext password against a stored PHC hash.
///
/// `Ok(false)` means the password does not match; `Err` means the stored hash
/// itself could not be parsed.
pub fn verify_password(plain: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
    Ok(ARGON2.verify_password(plain.as_bytes(), &parsed).is_ok())
}
