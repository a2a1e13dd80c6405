//! Session storage trait.
//!
//! Every lookup takes the [`SessionKind`] alongside the token hash: the
//! pair is the key, so the administrative and public namespaces cannot
//! collide even if two tokens hashed identically.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::types::{Session, SessionKind};

/// Persistence for administrative and public sessions.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Stores a new session.
    async fn create(&self, session: &Session) -> AuthResult<()>;

    /// Finds a session by kind and token hash.
    async fn find(&self, kind: SessionKind, token_hash: &str) -> AuthResult<Option<Session>>;

    /// Records a successful validation.
    async fn touch(&self, kind: SessionKind, token_hash: &str, now: OffsetDateTime)
    -> AuthResult<()>;

    /// Deletes one session. Returns `false` if it did not exist.
    async fn delete(&self, kind: SessionKind, token_hash: &str) -> AuthResult<bool>;

    /// Deletes every session of `kind` owned by `user_id`.
    async fn delete_by_user(&self, kind: SessionKind, user_id: &str) -> AuthResult<u64>;

    /// Deletes sessions that expired before `now`.
    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64>;
}
