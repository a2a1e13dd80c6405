//! JWT claim sets.
//!
//! Every token carries a `token_use` discriminator, so a token minted as
//! one kind never deserializes as another.

use serde::{Deserialize, Serialize};

/// Kind of token, as carried in the `token_use` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Bearer credential for resource servers.
    Access,
    /// OpenID Connect identity assertion.
    Id,
    /// Credential for obtaining new tokens.
    Refresh,
}

impl TokenKind {
    /// Returns the claim value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Id => "id",
            Self::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (user id).
    pub sub: String,

    /// Audience (client id).
    pub aud: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Unique token identifier.
    pub jti: String,

    /// Space-separated granted scope.
    pub scope: String,

    /// Client the token was issued to.
    pub client_id: String,
}

/// ID token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (user id).
    pub sub: String,

    /// Audience (client id).
    pub aud: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Unique token identifier.
    pub jti: String,

    /// Nonce from the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// When the user authenticated (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,

    /// Display name (`profile` scope).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Preferred username (`profile` scope).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// Email address (`email` scope).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the email is verified (`email` scope).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

/// Refresh token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (user id).
    pub sub: String,

    /// Audience (client id).
    pub aud: String,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Unique token identifier, the key of the chain entry.
    pub jti: String,

    /// Space-separated granted scope.
    pub scope: String,

    /// Rotation chain this token belongs to.
    pub chain_id: String,
}

/// Verified claims of any token kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "token_use", rename_all = "snake_case")]
pub enum Claims {
    /// An access token.
    Access(AccessClaims),
    /// An ID token.
    Id(IdClaims),
    /// A refresh token.
    Refresh(RefreshClaims),
}

impl Claims {
    /// Returns the token kind.
    #[must_use]
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::Access(_) => TokenKind::Access,
            Self::Id(_) => TokenKind::Id,
            Self::Refresh(_) => TokenKind::Refresh,
        }
    }

    /// Returns the subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        match self {
            Self::Access(c) => &c.sub,
            Self::Id(c) => &c.sub,
            Self::Refresh(c) => &c.sub,
        }
    }

    /// Returns the audience.
    #[must_use]
    pub fn audience(&self) -> &str {
        match self {
            Self::Access(c) => &c.aud,
            Self::Id(c) => &c.aud,
            Self::Refresh(c) => &c.aud,
        }
    }

    /// Returns the token identifier.
    #[must_use]
    pub fn jti(&self) -> &str {
        match self {
            Self::Access(c) => &c.jti,
            Self::Id(c) => &c.jti,
            Self::Refresh(c) => &c.jti,
        }
    }

    /// Returns the expiry as a Unix timestamp.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        match self {
            Self::Access(c) => c.exp,
            Self::Id(c) => c.exp,
            Self::Refresh(c) => c.exp,
        }
    }
}
