//! Authorization engine configuration.
//!
//! All sections default sensibly so a partial TOML file is enough.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "https://id.example.com"
//! storage_timeout = "3s"
//!
//! [auth.oauth]
//! authorization_code_lifetime = "5m"
//! access_token_lifetime = "15m"
//! revoke_chain_on_replay = true
//!
//! [auth.signing]
//! algorithm = "RS256"
//! kid = "2026-01"
//! private_key_path = "/etc/warden/signing.pem"
//!
//! [[auth.signing.retired_keys]]
//! kid = "2025-07"
//! algorithm = "RS256"
//! public_key_path = "/etc/warden/signing-2025-07.pub.pem"
//! not_after = "2026-02-01T00:00:00Z"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::oauth::code::CodeSettings;
use crate::token::TokenSettings;

/// Root configuration for the authorization engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer URL placed in every token's `iss` claim.
    pub issuer: String,

    /// Grant and token lifetimes.
    pub oauth: OAuthConfig,

    /// Signing key material.
    pub signing: SigningConfig,

    /// Session lifetimes per session kind.
    pub sessions: SessionConfig,

    /// Deadline applied to every persistence call.
    #[serde(with = "humantime_serde")]
    pub storage_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            oauth: OAuthConfig::default(),
            signing: SigningConfig::default(),
            sessions: SessionConfig::default(),
            storage_timeout: Duration::from_secs(5),
        }
    }
}

/// Grant and token lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// ID token lifetime.
    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,

    /// Refresh token lifetime. Each rotation gets a fresh lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Revoke every token in a rotation chain when a consumed refresh
    /// token is presented again.
    pub revoke_chain_on_replay: bool,

    /// Accept the `plain` PKCE method in addition to `S256`.
    pub allow_plain_pkce: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: Duration::from_secs(600), // 10 minutes
            access_token_lifetime: Duration::from_secs(3600),      // 1 hour
            id_token_lifetime: Duration::from_secs(3600),
            refresh_token_lifetime: Duration::from_secs(30 * 24 * 3600), // 30 days
            revoke_chain_on_replay: true,
            allow_plain_pkce: false,
        }
    }
}

/// Signing key configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm.
    /// Supported: "RS256", "RS384", "ES384"
    pub algorithm: String,

    /// Key ID published in the key set and placed in token headers.
    pub kid: String,

    /// PEM file holding the active private key.
    pub private_key_path: Option<PathBuf>,

    /// Generate a throwaway key pair at startup when no key path is set.
    /// Tokens do not survive a restart. Development only.
    pub generate_ephemeral: bool,

    /// Previously active keys still accepted for verification.
    pub retired_keys: Vec<RetiredKeyConfig>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            kid: "primary".to_string(),
            private_key_path: None,
            generate_ephemeral: false,
            retired_keys: Vec::new(),
        }
    }
}

/// A retired verification key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetiredKeyConfig {
    /// Key ID of the retired key.
    pub kid: String,

    /// Algorithm the key was used with.
    pub algorithm: String,

    /// PEM file holding the public key.
    pub public_key_path: PathBuf,

    /// Instant after which the key is neither published nor accepted.
    /// Set this to the expiry of the last token the key signed.
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
}

/// Session lifetimes per session kind.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Administrative session lifetime.
    #[serde(with = "humantime_serde")]
    pub administrative_lifetime: Duration,

    /// Public end-user session lifetime.
    #[serde(with = "humantime_serde")]
    pub public_lifetime: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            administrative_lifetime: Duration::from_secs(8 * 3600), // 8 hours
            public_lifetime: Duration::from_secs(14 * 24 * 3600),   // 14 days
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the issuer is not an absolute URL, a
    /// lifetime is zero, an algorithm is unsupported, or no key source is
    /// configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }
        if url::Url::parse(&self.issuer).is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "issuer must be an absolute URL, got '{}'",
                self.issuer
            )));
        }

        let lifetimes = [
            (
                "oauth.authorization_code_lifetime",
                self.oauth.authorization_code_lifetime,
            ),
            (
                "oauth.access_token_lifetime",
                self.oauth.access_token_lifetime,
            ),
            ("oauth.id_token_lifetime", self.oauth.id_token_lifetime),
            (
                "oauth.refresh_token_lifetime",
                self.oauth.refresh_token_lifetime,
            ),
            (
                "sessions.administrative_lifetime",
                self.sessions.administrative_lifetime,
            ),
            ("sessions.public_lifetime", self.sessions.public_lifetime),
            ("storage_timeout", self.storage_timeout),
        ];
        for (name, value) in lifetimes {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
        }

        validate_algorithm(&self.signing.algorithm)?;
        for retired in &self.signing.retired_keys {
            validate_algorithm(&retired.algorithm)?;
            if retired.kid == self.signing.kid {
                return Err(ConfigError::InvalidValue(format!(
                    "retired key '{}' reuses the active kid",
                    retired.kid
                )));
            }
        }

        if self.signing.kid.is_empty() {
            return Err(ConfigError::Missing("signing.kid".to_string()));
        }
        if self.signing.private_key_path.is_none() && !self.signing.generate_ephemeral {
            return Err(ConfigError::Missing(
                "signing.private_key_path (or signing.generate_ephemeral = true)".to_string(),
            ));
        }

        Ok(())
    }

    /// Settings for the authorization code manager.
    #[must_use]
    pub fn code_settings(&self) -> CodeSettings {
        CodeSettings {
            lifetime: self.oauth.authorization_code_lifetime,
            allow_plain_pkce: self.oauth.allow_plain_pkce,
            storage_timeout: self.storage_timeout,
        }
    }

    /// Settings for the token engine.
    #[must_use]
    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            issuer: self.issuer.clone(),
            access_token_lifetime: self.oauth.access_token_lifetime,
            id_token_lifetime: self.oauth.id_token_lifetime,
            refresh_token_lifetime: self.oauth.refresh_token_lifetime,
            revoke_chain_on_replay: self.oauth.revoke_chain_on_replay,
            storage_timeout: self.storage_timeout,
        }
    }
}

fn validate_algorithm(algorithm: &str) -> Result<(), ConfigError> {
    match algorithm {
        "RS256" | "RS384" | "ES384" => Ok(()),
        other => Err(ConfigError::InvalidValue(format!(
            "Invalid signing algorithm: '{}'. Must be RS256, RS384, or ES384",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.signing.generate_ephemeral = true;
        config
    }

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.issuer, "http://localhost:8080");
        assert!(config.oauth.revoke_chain_on_replay);
        assert!(!config.oauth.allow_plain_pkce);
        assert_eq!(config.signing.algorithm, "RS256");
        assert_eq!(
            config.oauth.authorization_code_lifetime,
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_default_config_requires_key_source() {
        let err = AuthConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(err.to_string().contains("private_key_path"));

        assert!(dev_config().validate().is_ok());
    }

    #[test]
    fn test_relative_issuer_fails_validation() {
        let mut config = dev_config();
        config.issuer = "id.example.com".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("issuer"));
    }

    #[test]
    fn test_invalid_algorithm_fails_validation() {
        let mut config = dev_config();
        config.signing.algorithm = "HS256".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("signing algorithm"));
    }

    #[test]
    fn test_component_settings_follow_config() {
        let mut config = dev_config();
        config.oauth.allow_plain_pkce = true;
        config.storage_timeout = Duration::from_secs(2);

        let code = config.code_settings();
        assert!(code.allow_plain_pkce);
        assert_eq!(code.storage_timeout, Duration::from_secs(2));

        let token = config.token_settings();
        assert_eq!(token.issuer, config.issuer);
        assert!(token.revoke_chain_on_replay);
    }

    #[test]
    fn test_zero_lifetime_fails_validation() {
        let mut config = dev_config();
        config.oauth.access_token_lifetime = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("access_token_lifetime"));
    }

    #[test]
    fn test_retired_key_cannot_reuse_active_kid() {
        let mut config = dev_config();
        config.signing.retired_keys.push(RetiredKeyConfig {
            kid: config.signing.kid.clone(),
            algorithm: "RS256".to_string(),
            public_key_path: PathBuf::from("/tmp/old.pem"),
            not_after: OffsetDateTime::now_utc(),
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reuses the active kid"));
    }

    #[test]
    fn test_deserialize_humantime_durations() {
        let json = serde_json::json!({
            "issuer": "https://id.example.com",
            "oauth": {
                "authorization_code_lifetime": "5m",
                "refresh_token_lifetime": "7days"
            },
            "sessions": { "administrative_lifetime": "30m" },
            "storage_timeout": "250ms"
        });
        let config: AuthConfig = serde_json::from_value(json).unwrap();
        assert_eq!(
            config.oauth.authorization_code_lifetime,
            Duration::from_secs(300)
        );
        assert_eq!(
            config.oauth.refresh_token_lifetime,
            Duration::from_secs(7 * 24 * 3600)
        );
        assert_eq!(
            config.sessions.administrative_lifetime,
            Duration::from_secs(1800)
        );
        assert_eq!(config.storage_timeout, Duration::from_millis(250));
        // untouched sections keep defaults
        assert_eq!(config.oauth.access_token_lifetime, Duration::from_secs(3600));
    }
}
