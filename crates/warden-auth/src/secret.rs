//! Random credentials and their at-rest representations.
//!
//! Two hashing schemes are used:
//!
//! - **Opaque tokens** (authorization codes, session tokens) carry 256 bits
//!   of entropy, so a fast SHA-256 digest is enough and doubles as the
//!   lookup key.
//! - **Client secrets** are hashed with Argon2id (PHC string format) and
//!   verified with the constant-time comparison built into `argon2`.
//!
//! # Example
//!
//! ```
//! use warden_auth::secret::{generate_client_secret, hash_client_secret, verify_client_secret};
//!
//! let secret = generate_client_secret();
//! let hash = hash_client_secret(&secret).unwrap();
//! assert!(verify_client_secret(&secret, &hash).unwrap());
//! assert!(!verify_client_secret("wrong", &hash).unwrap());
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Generates a 256-bit random token encoded as base64url (43 characters).
#[must_use]
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hex digest of an opaque token; the only form ever persisted.
#[must_use]
pub fn hash_opaque_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Generates a client secret: `wsec_` followed by 64 hex characters.
#[must_use]
pub fn generate_client_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    format!("wsec_{}", hex::encode(bytes))
}

/// Hashes a client secret with Argon2id and a random salt.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails.
pub fn hash_client_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verifies a client secret against a stored Argon2 hash.
///
/// Returns `Ok(false)` on mismatch; `Err` only if the stored hash is not a
/// valid PHC string.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if `hash` cannot be parsed.
pub fn verify_client_secret(
    secret: &str,
    hash: &str,
) -> Result<bool, argon2::password_hash::Error> {
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok())
}
