//! Authorization code storage trait.
//!
//! # Implementation Notes
//!
//! - Records are keyed by the SHA-256 digest of the code; the code itself
//!   never reaches storage.
//! - [`AuthorizationCodeStorage::create`] is a single insert, so a cancelled
//!   request never leaves a half-issued code.
//! - [`AuthorizationCodeStorage::consume`] must be one atomic conditional
//!   update. With PostgreSQL:
//!
//! ```sql
//! UPDATE authorization_codes SET used = true, used_at = $2
//! WHERE code_hash = $1 AND used = false
//! RETURNING *
//! ```

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::AuthorizationCode;

/// Persistence for authorization codes.
#[async_trait]
pub trait AuthorizationCodeStorage: Send + Sync {
    /// Stores a freshly issued code with `used = false`.
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()>;

    /// Atomically flips `used` from false to true.
    ///
    /// Returns the record (as it was before the flip, with `used_at` set)
    /// only for the single caller that performed the transition. Every
    /// other caller, concurrent or later, gets `None`, as does a lookup of
    /// an unknown hash. Expiry is not checked here.
    async fn consume(
        &self,
        code_hash: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<AuthorizationCode>>;

    /// Deletes codes that expired before `now`. Returns the number removed.
    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
