//! Permission storage trait.
//!
//! Each mutation is a single upsert on the `(user_id, client_id)` key so
//! repeated calls converge on the same record.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::Permission;

/// Persistence for per-(identity, client) permissions.
#[async_trait]
pub trait PermissionStorage: Send + Sync {
    /// Reads the current record. Never cached.
    async fn find(&self, user_id: &str, client_id: &str) -> AuthResult<Option<Permission>>;

    /// Creates a pending record with `access = false` if none exists.
    /// An existing record is returned unchanged.
    async fn upsert_request(
        &self,
        user_id: &str,
        client_id: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Permission>;

    /// Sets `access = true`, status active, role, and grant audit fields;
    /// clears revocation fields. `requested_at` is preserved.
    async fn upsert_grant(
        &self,
        user_id: &str,
        client_id: &str,
        role: &str,
        actor: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Permission>;

    /// Sets `access = false`, status revoked, and revocation audit fields.
    /// Creates a revoked record if none exists.
    async fn upsert_revoke(
        &self,
        user_id: &str,
        client_id: &str,
        actor: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Permission>;

    /// Lists every record for a client.
    async fn list_by_client(&self, client_id: &str) -> AuthResult<Vec<Permission>>;
}
