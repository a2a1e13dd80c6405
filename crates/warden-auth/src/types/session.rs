//! Session records for the two independent session namespaces.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Which capability set a session authorizes.
///
/// The kind is part of every session lookup key, so a token issued for one
/// kind can never be found when validating the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Operator sessions for the administrative surface.
    Administrative,
    /// End-user sessions for the public surface.
    Public,
}

impl SessionKind {
    /// Returns the kind as stored.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Administrative => "administrative",
            Self::Public => "public",
        }
    }

    /// Parses a stored kind value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "administrative" => Some(Self::Administrative),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted session. Only the token hash is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Namespace of the session.
    pub kind: SessionKind,

    /// SHA-256 hex digest of the session token.
    pub token_hash: String,

    /// Owning identity.
    pub user_id: String,

    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Absolute expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Last successful validation.
    #[serde(with = "time::serde::rfc3339")]
    pub last_accessed_at: OffsetDateTime,

    /// User-Agent presented at login.
    pub user_agent: Option<String>,
}

impl Session {
    /// A session whose expiry equals `now` is already expired.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}
