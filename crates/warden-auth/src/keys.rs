//! Signing key material.
//!
//! The [`KeyMaterialProvider`] is built once at process start from
//! configuration and injected wherever tokens are signed or verified. It
//! holds exactly one active private key plus any number of retired public
//! keys, each tagged with a key id. Retired keys stay publishable and
//! accepted for verification until their `not_after` instant.
//!
//! Supported algorithms:
//!
//! - **RS256** / **RS384**: RSA, 2048 bit keys or larger
//! - **ES384**: ECDSA on P-384

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, encode};
use p384::elliptic_curve::sec1::ToEncodedPoint;
use p384::pkcs8::{
    DecodePrivateKey as EcDecodePrivateKey, DecodePublicKey as EcDecodePublicKey,
    EncodePrivateKey as EcEncodePrivateKey,
};
use p384::{PublicKey as EcPublicKey, SecretKey as EcSecretKey};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::SigningConfig;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while loading key material or signing.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// A key file could not be read.
    #[error("Failed to read key file {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Key material is malformed or does not fit the algorithm.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of the problem.
        message: String,
    },

    /// The algorithm name is not supported.
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// No key source was configured.
    #[error("No signing key configured")]
    MissingKey,

    /// Key generation failed.
    #[error("Key generation failed: {message}")]
    Generation {
        /// Description of the failure.
        message: String,
    },

    /// Producing a signature failed.
    #[error("Signing failed: {message}")]
    Signing {
        /// Description of the failure.
        message: String,
    },
}

impl KeyError {
    fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported token signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 and SHA-384.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` algorithm.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name used in JWK and JWS headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` for RSA-based algorithms.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "ES384" => Ok(Self::ES384),
            other => Err(KeyError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

// ============================================================================
// JWKS
// ============================================================================

/// JSON Web Key Set document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// Public JSON Web Key. Never carries private parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key use, always "sig".
    #[serde(rename = "use")]
    pub use_: String,

    /// Key ID.
    pub kid: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

// ============================================================================
// Key Entries
// ============================================================================

enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

impl PublicKeyData {
    fn from_rsa(public_key: &RsaPublicKey) -> Self {
        Self::Rsa {
            n: public_key.n().to_bytes_be(),
            e: public_key.e().to_bytes_be(),
        }
    }

    fn from_ec(public_key: &EcPublicKey) -> Result<Self, KeyError> {
        let point = public_key.to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| KeyError::invalid_key("EC point is missing its x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| KeyError::invalid_key("EC point is missing its y coordinate"))?;
        Ok(Self::Ec {
            x: x.to_vec(),
            y: y.to_vec(),
        })
    }

    fn decoding_key(&self) -> Result<DecodingKey, KeyError> {
        match self {
            Self::Rsa { n, e } => {
                let (n, e) = (URL_SAFE_NO_PAD.encode(n), URL_SAFE_NO_PAD.encode(e));
                DecodingKey::from_rsa_components(&n, &e)
            }
            Self::Ec { x, y } => {
                let (x, y) = (URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y));
                DecodingKey::from_ec_components(&x, &y)
            }
        }
        .map_err(|e| KeyError::invalid_key(e.to_string()))
    }
}

/// A key usable for verifying token signatures.
pub struct VerificationKey {
    kid: String,
    algorithm: SigningAlgorithm,
    decoding_key: DecodingKey,
    public: PublicKeyData,
    not_after: Option<OffsetDateTime>,
}

impl VerificationKey {
    fn new(
        kid: String,
        algorithm: SigningAlgorithm,
        public: PublicKeyData,
        not_after: Option<OffsetDateTime>,
    ) -> Result<Self, KeyError> {
        let decoding_key = public.decoding_key()?;
        Ok(Self {
            kid,
            algorithm,
            decoding_key,
            public,
            not_after,
        })
    }

    /// Key ID.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm the key verifies.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Decoding key for `jsonwebtoken`.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Returns `true` while the key may still be published and used.
    #[must_use]
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.not_after.is_none_or(|not_after| now < not_after)
    }

    fn to_jwk(&self) -> Jwk {
        match &self.public {
            PublicKeyData::Rsa { n, e } => Jwk {
                kty: "RSA".to_string(),
                use_: "sig".to_string(),
                kid: self.kid.clone(),
                alg: self.algorithm.as_str().to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(n)),
                e: Some(URL_SAFE_NO_PAD.encode(e)),
                crv: None,
                x: None,
                y: None,
            },
            PublicKeyData::Ec { x, y } => Jwk {
                kty: "EC".to_string(),
                use_: "sig".to_string(),
                kid: self.kid.clone(),
                alg: self.algorithm.as_str().to_string(),
                n: None,
                e: None,
                crv: Some("P-384".to_string()),
                x: Some(URL_SAFE_NO_PAD.encode(x)),
                y: Some(URL_SAFE_NO_PAD.encode(y)),
            },
        }
    }
}

struct SigningKey {
    kid: String,
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
}

// ============================================================================
// Key Material Provider
// ============================================================================

/// Holds the active signing key and all still-valid verification keys.
///
/// Read-only after construction; share it as `Arc<KeyMaterialProvider>`.
pub struct KeyMaterialProvider {
    active: SigningKey,
    // The active key is always first.
    verification: Vec<VerificationKey>,
}

impl fmt::Debug for KeyMaterialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterialProvider")
            .field("active_kid", &self.active.kid)
            .field("algorithm", &self.active.algorithm)
            .field("verification_keys", &self.verification.len())
            .finish()
    }
}

impl KeyMaterialProvider {
    /// Loads key material described by configuration.
    ///
    /// Call once at startup; any failure here is fatal for the process.
    ///
    /// # Errors
    ///
    /// Returns an error if a key file is missing or malformed, or an
    /// algorithm is unsupported.
    pub fn from_config(config: &SigningConfig) -> Result<Self, KeyError> {
        let algorithm: SigningAlgorithm = config.algorithm.parse()?;

        let mut provider = match &config.private_key_path {
            Some(path) => {
                let pem = read_pem(path)?;
                Self::from_private_pem(config.kid.clone(), algorithm, &pem)?
            }
            None if config.generate_ephemeral => {
                tracing::warn!(
                    kid = %config.kid,
                    algorithm = %algorithm,
                    "Generating ephemeral signing key; issued tokens will not survive a restart"
                );
                Self::generate(config.kid.clone(), algorithm)?
            }
            None => return Err(KeyError::MissingKey),
        };

        for retired in &config.retired_keys {
            let retired_algorithm: SigningAlgorithm = retired.algorithm.parse()?;
            let pem = read_pem(&retired.public_key_path)?;
            provider = provider.with_retired_public_pem(
                retired.kid.clone(),
                retired_algorithm,
                &pem,
                retired.not_after,
            )?;
        }

        tracing::info!(
            active_kid = %provider.active.kid,
            algorithm = %provider.active.algorithm,
            retired = provider.verification.len() - 1,
            "Signing keys loaded"
        );
        Ok(provider)
    }

    /// Builds a provider from a PEM-encoded private key.
    ///
    /// Accepts PKCS#8 for every algorithm, PKCS#1 for RSA, and SEC1 for EC.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM cannot be parsed for the given algorithm.
    pub fn from_private_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
    ) -> Result<Self, KeyError> {
        let kid = kid.into();
        if algorithm.is_rsa() {
            let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
                .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
                .map_err(|e| KeyError::invalid_key(format!("RSA private key: {e}")))?;
            Self::from_rsa(kid, algorithm, &private_key)
        } else {
            let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
                .or_else(|_| EcSecretKey::from_sec1_pem(private_pem))
                .map_err(|e| KeyError::invalid_key(format!("EC private key: {e}")))?;
            Self::from_ec(kid, &secret_key)
        }
    }

    /// Generates a fresh key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate(kid: impl Into<String>, algorithm: SigningAlgorithm) -> Result<Self, KeyError> {
        let kid = kid.into();
        if algorithm.is_rsa() {
            let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
                .map_err(|e| KeyError::generation(e.to_string()))?;
            Self::from_rsa(kid, algorithm, &private_key)
        } else {
            Self::from_ec(kid, &EcSecretKey::random(&mut OsRng))
        }
    }

    /// Adds a retired public key accepted until `not_after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kid collides with a loaded key or the PEM
    /// cannot be parsed.
    pub fn with_retired_public_pem(
        mut self,
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        public_pem: &str,
        not_after: OffsetDateTime,
    ) -> Result<Self, KeyError> {
        let kid = kid.into();
        if self.verification.iter().any(|key| key.kid == kid) {
            return Err(KeyError::invalid_key(format!("duplicate kid '{kid}'")));
        }

        let public = if algorithm.is_rsa() {
            let public_key = RsaPublicKey::from_public_key_pem(public_pem)
                .or_else(|_| RsaPublicKey::from_pkcs1_pem(public_pem))
                .map_err(|e| KeyError::invalid_key(format!("RSA public key: {e}")))?;
            PublicKeyData::from_rsa(&public_key)
        } else {
            let public_key = EcPublicKey::from_public_key_pem(public_pem)
                .map_err(|e| KeyError::invalid_key(format!("EC public key: {e}")))?;
            PublicKeyData::from_ec(&public_key)?
        };

        self.verification
            .push(VerificationKey::new(kid, algorithm, public, Some(not_after))?);
        Ok(self)
    }

    fn from_rsa(
        kid: String,
        algorithm: SigningAlgorithm,
        private_key: &RsaPrivateKey,
    ) -> Result<Self, KeyError> {
        if private_key.size() < 256 {
            return Err(KeyError::invalid_key("RSA keys must be at least 2048 bits"));
        }
        let pkcs8 = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(pkcs8.as_bytes())
            .map_err(|e| KeyError::invalid_key(e.to_string()))?;
        let public = PublicKeyData::from_rsa(&private_key.to_public_key());
        Self::assemble(kid, algorithm, encoding_key, public)
    }

    fn from_ec(kid: String, secret_key: &EcSecretKey) -> Result<Self, KeyError> {
        let pkcs8 = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(pkcs8.as_bytes())
            .map_err(|e| KeyError::invalid_key(e.to_string()))?;
        let public = PublicKeyData::from_ec(&secret_key.public_key())?;
        Self::assemble(kid, SigningAlgorithm::ES384, encoding_key, public)
    }

    fn assemble(
        kid: String,
        algorithm: SigningAlgorithm,
        encoding_key: EncodingKey,
        public: PublicKeyData,
    ) -> Result<Self, KeyError> {
        if kid.is_empty() {
            return Err(KeyError::invalid_key("kid cannot be empty"));
        }
        let verification = vec![VerificationKey::new(kid.clone(), algorithm, public, None)?];
        Ok(Self {
            active: SigningKey {
                kid,
                algorithm,
                encoding_key,
            },
            verification,
        })
    }

    /// Key ID of the active signing key.
    #[must_use]
    pub fn active_kid(&self) -> &str {
        &self.active.kid
    }

    /// Algorithm of the active signing key.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.active.algorithm
    }

    /// Signs claims with the active key, producing a compact JWS.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be serialized or signed.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, KeyError> {
        let mut header = Header::new(self.active.algorithm.to_jwt_algorithm());
        header.kid = Some(self.active.kid.clone());

        encode(&header, claims, &self.active.encoding_key).map_err(|e| KeyError::Signing {
            message: e.to_string(),
        })
    }

    /// Resolves a verification key by kid, if it is still live at `now`.
    #[must_use]
    pub fn verification_key(&self, kid: &str, now: OffsetDateTime) -> Option<&VerificationKey> {
        self.verification
            .iter()
            .find(|key| key.kid == kid && key.is_live_at(now))
    }

    /// Publishable key set at the current time.
    #[must_use]
    pub fn public_key_set(&self) -> Jwks {
        self.public_key_set_at(OffsetDateTime::now_utc())
    }

    /// Publishable key set at `now`; retired keys past `not_after` are omitted.
    #[must_use]
    pub fn public_key_set_at(&self, now: OffsetDateTime) -> Jwks {
        Jwks {
            keys: self
                .verification
                .iter()
                .filter(|key| key.is_live_at(now))
                .map(VerificationKey::to_jwk)
                .collect(),
        }
    }
}

fn read_pem(path: &Path) -> Result<String, KeyError> {
    std::fs::read_to_string(path).map_err(|source| KeyError::Io {
        path: path.display().to_string(),
        source,
    })
}
