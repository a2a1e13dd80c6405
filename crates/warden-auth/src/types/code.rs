//! Authorization code records.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::oauth::pkce::PkceChallenge;
use crate::types::Scope;

/// A persisted authorization code.
///
/// The code itself is never stored; `code_hash` is its SHA-256 digest and
/// the lookup key. `used` flips from false to true exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// SHA-256 hex digest of the code.
    pub code_hash: String,

    /// Client the code was issued to.
    pub client_id: String,

    /// Identity that authorized the request.
    pub user_id: String,

    /// Redirect URI of the authorization request; must match exactly at
    /// redemption.
    pub redirect_uri: String,

    /// Granted scope.
    pub scope: Scope,

    /// PKCE challenge bound to the code, if any.
    pub pkce: Option<PkceChallenge>,

    /// OIDC nonce to echo in the ID token.
    pub nonce: Option<String>,

    /// When the user authenticated, echoed as `auth_time`.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub auth_time: Option<OffsetDateTime>,

    /// Issue time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Absolute expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Whether a redemption has been attempted.
    pub used: bool,

    /// When the code was redeemed.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub used_at: Option<OffsetDateTime>,
}

impl AuthorizationCode {
    /// A code whose expiry equals `now` is already expired.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}
