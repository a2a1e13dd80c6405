//! PKCE (Proof Key for Code Exchange), RFC 7636.
//!
//! `S256` is always available. `plain` exists for legacy clients and is
//! only accepted when configuration allows it.
//!
//! # Example
//!
//! ```
//! use warden_auth::oauth::pkce::{PkceChallenge, PkceMethod, PkceVerifier};
//!
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//! assert_eq!(challenge.method(), PkceMethod::S256);
//! assert!(challenge.verify(verifier.as_str()).is_ok());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside 43..=128.
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains characters outside `[A-Za-z0-9-._~]`.
    #[error("Invalid verifier characters: must be unreserved URI characters")]
    InvalidVerifierCharacters,

    /// Challenge is not a well-formed value for its method.
    #[error("Invalid challenge format")]
    InvalidChallengeFormat,

    /// Challenge method is unknown or disabled.
    #[error("Unsupported challenge method: {0}")]
    UnsupportedMethod(String),

    /// The verifier does not match the challenge.
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidVerifierLength(_)
            | Self::InvalidVerifierCharacters
            | Self::InvalidChallengeFormat
            | Self::UnsupportedMethod(_) => "invalid_request",
            Self::VerificationFailed => "invalid_grant",
        }
    }
}

// =============================================================================
// Challenge Method
// =============================================================================

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PkceMethod {
    /// `BASE64URL(SHA256(verifier))`.
    S256,
    /// The challenge is the verifier itself.
    #[serde(rename = "plain")]
    Plain,
}

impl PkceMethod {
    /// Parses a method name.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedMethod` for unknown names, and for `plain` when
    /// `allow_plain` is false.
    pub fn parse(method: &str, allow_plain: bool) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            "plain" if allow_plain => Ok(Self::Plain),
            "plain" => Err(PkceError::UnsupportedMethod(
                "plain (disabled by configuration)".to_string(),
            )),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    /// Returns the method as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

impl Default for PkceMethod {
    fn default() -> Self {
        Self::S256
    }
}

impl std::fmt::Display for PkceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Verifier
// =============================================================================

/// A syntactically valid code verifier.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Validates a verifier received from a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is outside 43..=128 or the value
    /// contains characters other than `[A-Za-z0-9-._~]`.
    pub fn new(verifier: impl Into<String>) -> Result<Self, PkceError> {
        let verifier = verifier.into();
        check_unreserved(&verifier)?;
        Ok(Self(verifier))
    }

    /// Generates a random 43-character verifier from 32 random bytes.
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Returns the verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn check_unreserved(value: &str) -> Result<(), PkceError> {
    let len = value.len();
    if !(43..=128).contains(&len) {
        return Err(PkceError::InvalidVerifierLength(len));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
    {
        return Err(PkceError::InvalidVerifierCharacters);
    }
    Ok(())
}

fn s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

// =============================================================================
// Challenge
// =============================================================================

/// A code challenge together with the method that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    value: String,
    method: PkceMethod,
}

impl PkceChallenge {
    /// Derives an S256 challenge from a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        Self {
            value: s256(verifier.as_str()),
            method: PkceMethod::S256,
        }
    }

    /// Validates a challenge received in an authorization request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChallengeFormat` if an S256 challenge is not the
    /// base64url encoding of 32 bytes, or a plain challenge is not a valid
    /// verifier.
    pub fn new(value: impl Into<String>, method: PkceMethod) -> Result<Self, PkceError> {
        let value = value.into();
        let well_formed = match method {
            PkceMethod::S256 => URL_SAFE_NO_PAD
                .decode(&value)
                .is_ok_and(|bytes| bytes.len() == 32),
            PkceMethod::Plain => check_unreserved(&value).is_ok(),
        };
        if !well_formed {
            return Err(PkceError::InvalidChallengeFormat);
        }
        Ok(Self { value, method })
    }

    /// Checks a presented verifier against this challenge.
    ///
    /// The comparison is constant time.
    ///
    /// # Errors
    ///
    /// Returns a verifier syntax error, or `VerificationFailed` on mismatch.
    pub fn verify(&self, verifier: &str) -> Result<(), PkceError> {
        let verifier = PkceVerifier::new(verifier)?;
        let computed = match self.method {
            PkceMethod::S256 => s256(verifier.as_str()),
            PkceMethod::Plain => verifier.0,
        };
        if bool::from(computed.as_bytes().ct_eq(self.value.as_bytes())) {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    /// Returns the challenge value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Returns the challenge method.
    #[must_use]
    pub fn method(&self) -> PkceMethod {
        self.method
    }
}
