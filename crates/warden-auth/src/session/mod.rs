//! Session store for the administrative and public namespaces.
//!
//! Tokens are 256-bit random values handed to the caller once. Only their
//! SHA-256 digest is persisted; validation re-hashes the presented token
//! and looks it up together with the expected [`SessionKind`].

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::SessionConfig;
use crate::deadline::with_deadline;
use crate::error::AuthError;
use crate::secret::{generate_opaque_token, hash_opaque_token};
use crate::storage::SessionStorage;
use crate::types::{Session, SessionKind};

/// A newly created session token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// Opaque token for the caller. Not recoverable later.
    pub token: String,
    /// Absolute expiry.
    pub expires_at: OffsetDateTime,
}

/// The identity behind a validated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSession {
    /// Owning identity.
    pub user_id: String,
    /// When the identity logged in, i.e. the session's creation time.
    pub authenticated_at: OffsetDateTime,
}

/// Issues, validates, and ends sessions.
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    config: SessionConfig,
    timeout: Duration,
}

impl SessionStore {
    /// Creates a store over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn SessionStorage>, config: SessionConfig, timeout: Duration) -> Self {
        Self {
            storage,
            config,
            timeout,
        }
    }

    fn lifetime(&self, kind: SessionKind) -> Duration {
        match kind {
            SessionKind::Administrative => self.config.administrative_lifetime,
            SessionKind::Public => self.config.public_lifetime,
        }
    }

    /// Creates a session of `kind` for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty user id, or a storage error.
    pub async fn create_session(
        &self,
        kind: SessionKind,
        user_id: &str,
        user_agent: Option<&str>,
    ) -> AuthResult<IssuedSession> {
        if user_id.trim().is_empty() {
            return Err(AuthError::invalid_request("user id cannot be empty"));
        }

        let token = generate_opaque_token();
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.lifetime(kind);
        let session = Session {
            kind,
            token_hash: hash_opaque_token(&token),
            user_id: user_id.to_string(),
            created_at: now,
            expires_at,
            last_accessed_at: now,
            user_agent: user_agent.map(str::to_string),
        };

        with_deadline(self.timeout, "session.create", self.storage.create(&session)).await?;
        tracing::info!(kind = %kind, user_id, "Session created");

        Ok(IssuedSession { token, expires_at })
    }

    /// Validates a presented token against the `kind` namespace and returns
    /// the owning identity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSession` if the token is unknown, expired, or belongs
    /// to the other namespace.
    pub async fn validate_session(&self, kind: SessionKind, token: &str) -> AuthResult<String> {
        self.resolve_session(kind, token)
            .await
            .map(|session| session.user_id)
    }

    /// Like [`validate_session`](Self::validate_session), but also reports
    /// when the identity authenticated.
    ///
    /// # Errors
    ///
    /// Same as `validate_session`.
    pub async fn resolve_session(
        &self,
        kind: SessionKind,
        token: &str,
    ) -> AuthResult<ValidatedSession> {
        let token_hash = hash_opaque_token(token);
        let now = OffsetDateTime::now_utc();

        let session = with_deadline(
            self.timeout,
            "session.find",
            self.storage.find(kind, &token_hash),
        )
        .await?
        .ok_or(AuthError::InvalidSession)?;

        if session.kind != kind {
            tracing::warn!(expected = %kind, found = %session.kind, "Session kind mismatch");
            return Err(AuthError::InvalidSession);
        }
        if session.is_expired_at(now) {
            tracing::debug!(kind = %kind, user_id = %session.user_id, "Session expired");
            return Err(AuthError::InvalidSession);
        }

        with_deadline(
            self.timeout,
            "session.touch",
            self.storage.touch(kind, &token_hash, now),
        )
        .await?;

        Ok(ValidatedSession {
            user_id: session.user_id,
            authenticated_at: session.created_at,
        })
    }

    /// Ends one session (logout). Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage or timeout error.
    pub async fn end_session(&self, kind: SessionKind, token: &str) -> AuthResult<bool> {
        let removed = with_deadline(
            self.timeout,
            "session.delete",
            self.storage.delete(kind, &hash_opaque_token(token)),
        )
        .await?;
        if removed {
            tracing::info!(kind = %kind, "Session ended");
        }
        Ok(removed)
    }

    /// Ends every session of `kind` owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns a storage or timeout error.
    pub async fn end_all_sessions(&self, kind: SessionKind, user_id: &str) -> AuthResult<u64> {
        let removed = with_deadline(
            self.timeout,
            "session.delete_by_user",
            self.storage.delete_by_user(kind, user_id),
        )
        .await?;
        tracing::info!(kind = %kind, user_id, removed, "Sessions ended for user");
        Ok(removed)
    }

    /// Deletes expired sessions of both kinds.
    ///
    /// # Errors
    ///
    /// Returns a storage or timeout error.
    pub async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        with_deadline(self.timeout, "session.purge", self.storage.purge_expired(now)).await
    }
}
