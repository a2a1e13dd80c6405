//! Refresh token chain storage trait.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::RefreshTokenRecord;

/// Persistence for refresh token rotation chains.
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a freshly minted refresh token record.
    async fn create(&self, record: &RefreshTokenRecord) -> AuthResult<()>;

    /// Finds a record by `jti`.
    async fn find(&self, jti: &str) -> AuthResult<Option<RefreshTokenRecord>>;

    /// Atomically marks an unconsumed, unrevoked token as consumed.
    ///
    /// Returns the record only for the single caller that performed the
    /// transition; `None` for unknown, already consumed, or revoked tokens.
    async fn consume(
        &self,
        jti: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<RefreshTokenRecord>>;

    /// Revokes every not-yet-revoked token in a chain. Returns the number
    /// of records touched.
    async fn revoke_chain(&self, chain_id: &str, now: OffsetDateTime) -> AuthResult<u64>;

    /// Deletes records that expired before `now`.
    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
