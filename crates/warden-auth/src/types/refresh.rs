//! Refresh token chain records.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::Scope;

/// Persisted state of one refresh token in a rotation chain.
///
/// The token itself is a signed JWT; this record tracks whether its `jti`
/// has been consumed or revoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Token identifier (`jti` claim).
    pub jti: String,

    /// Rotation chain shared by every token descended from one grant.
    pub chain_id: String,

    /// The token this one replaced.
    pub parent_jti: Option<String>,

    /// Client the token was issued to.
    pub client_id: String,

    /// Subject.
    pub user_id: String,

    /// Granted scope.
    pub scope: Scope,

    /// When the subject authenticated for the original grant. Carried
    /// across rotations so refreshed ID tokens keep `auth_time`.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub auth_time: Option<OffsetDateTime>,

    /// Issue time.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// Absolute expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When the token was exchanged for its successor.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub consumed_at: Option<OffsetDateTime>,

    /// When the token (or its chain) was revoked.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
}

impl RefreshTokenRecord {
    /// Returns `true` if the token may still be exchanged.
    #[must_use]
    pub fn is_redeemable_at(&self, now: OffsetDateTime) -> bool {
        self.consumed_at.is_none() && self.revoked_at.is_none() && now < self.expires_at
    }
}
