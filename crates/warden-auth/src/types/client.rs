//! OAuth client registration types.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::Scope;

// =============================================================================
// Grant Type
// =============================================================================

/// Grant types a client may be allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code flow.
    AuthorizationCode,
    /// Refresh token rotation.
    RefreshToken,
}

impl GrantType {
    /// Returns the `grant_type` parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Parses a `grant_type` parameter value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Client Status
// =============================================================================

/// Lifecycle status of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// The client may complete grants.
    Active,
    /// The client can still be inspected but cannot complete new grants.
    Revoked,
}

impl ClientStatus {
    /// Returns the status as stored.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }

    /// Parses a stored status value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Opaque, globally unique client identifier.
    pub client_id: String,

    /// Argon2id PHC hash of the client secret. `None` for public clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_hash: Option<String>,

    /// Human-readable display name.
    pub name: String,

    /// Exact-match redirect URI allow-list.
    pub redirect_uris: Vec<String>,

    /// Scopes the client may request. Empty means any scope.
    #[serde(default)]
    pub allowed_scopes: Vec<String>,

    /// Grant types the client may use.
    pub grant_types: Vec<GrantType>,

    /// Whether authorization requests must carry a PKCE challenge.
    pub pkce_required: bool,

    /// Lifecycle status; checked on every authentication.
    pub status: ClientStatus,

    /// When the client was registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the client was last modified.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Client {
    /// Validates the registration.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }
        if self.name.is_empty() {
            return Err(ClientValidationError::EmptyName);
        }
        if self.grant_types.is_empty() {
            return Err(ClientValidationError::NoGrantTypes);
        }
        if self.grant_types.contains(&GrantType::AuthorizationCode) && self.redirect_uris.is_empty()
        {
            return Err(ClientValidationError::NoRedirectUris);
        }
        for uri in &self.redirect_uris {
            match url::Url::parse(uri) {
                Ok(parsed) if parsed.fragment().is_none() => {}
                _ => return Err(ClientValidationError::InvalidRedirectUri(uri.clone())),
            }
        }
        if self.is_public() && !self.pkce_required {
            return Err(ClientValidationError::PublicClientWithoutPkce);
        }
        Ok(())
    }

    /// Returns `true` if the client has no secret.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.secret_hash.is_none()
    }

    /// Returns `true` if the client may complete new grants.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ClientStatus::Active
    }

    /// Exact string match against the allow-list. No prefix or wildcard
    /// matching.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Returns `true` if every requested token is allowed.
    ///
    /// An empty allow-list means all scopes are allowed.
    #[must_use]
    pub fn is_scope_allowed(&self, scope: &Scope) -> bool {
        if self.allowed_scopes.is_empty() {
            return true;
        }
        scope
            .iter()
            .all(|token| self.allowed_scopes.iter().any(|allowed| allowed == token))
    }

    /// Returns `true` if the client may use `grant_type`.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Client registration rule violations.
#[derive(Debug, thiserror::Error)]
pub enum ClientValidationError {
    /// Client ID cannot be empty.
    #[error("Client ID cannot be empty")]
    EmptyClientId,

    /// Client name cannot be empty.
    #[error("Client name cannot be empty")]
    EmptyName,

    /// At least one grant type is required.
    #[error("At least one grant type is required")]
    NoGrantTypes,

    /// Authorization code flow requires redirect URIs.
    #[error("Authorization code flow requires redirect URIs")]
    NoRedirectUris,

    /// Redirect URIs must be absolute and fragment-free.
    #[error("Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    /// Public clients must use PKCE.
    #[error("Public clients must require PKCE")]
    PublicClientWithoutPkce,
}
