//! Session storage for both session kinds.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use warden_auth::AuthResult;
use warden_auth::storage::SessionStorage;
use warden_auth::types::{Session, SessionKind};

use crate::{PostgresAuthStorage, StorageError, StorageResult};

type SessionTuple = (
    String,
    String,
    String,
    OffsetDateTime,
    OffsetDateTime,
    OffsetDateTime,
    Option<String>,
);

fn session_from_tuple(row: SessionTuple) -> StorageResult<Session> {
    let (kind, token_hash, user_id, created_at, expires_at, last_accessed_at, user_agent) = row;
    let kind = SessionKind::parse(&kind)
        .ok_or_else(|| StorageError::invalid_row(format!("unknown session kind '{kind}'")))?;

    Ok(Session {
        kind,
        token_hash,
        user_id,
        created_at,
        expires_at,
        last_accessed_at,
        user_agent,
    })
}

#[async_trait]
impl SessionStorage for PostgresAuthStorage {
    async fn create(&self, session: &Session) -> AuthResult<()> {
        query(
            r#"
            INSERT INTO sessions (kind, token_hash, user_id, created_at, expires_at,
                                  last_accessed_at, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.kind.as_str())
        .bind(&session.token_hash)
        .bind(&session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.last_accessed_at)
        .bind(&session.user_agent)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::from_insert(e, || "session token collision".to_string()))?;

        Ok(())
    }

    async fn find(&self, kind: SessionKind, token_hash: &str) -> AuthResult<Option<Session>> {
        let row: Option<SessionTuple> = query_as(
            r#"
            SELECT kind, token_hash, user_id, created_at, expires_at, last_accessed_at, user_agent
            FROM sessions
            WHERE kind = $1 AND token_hash = $2
            "#,
        )
        .bind(kind.as_str())
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(session_from_tuple).transpose()?)
    }

    async fn touch(
        &self,
        kind: SessionKind,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AuthResult<()> {
        query("UPDATE sessions SET last_accessed_at = $3 WHERE kind = $1 AND token_hash = $2")
            .bind(kind.as_str())
            .bind(token_hash)
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn delete(&self, kind: SessionKind, token_hash: &str) -> AuthResult<bool> {
        let result = query("DELETE FROM sessions WHERE kind = $1 AND token_hash = $2")
            .bind(kind.as_str())
            .bind(token_hash)
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_user(&self, kind: SessionKind, user_id: &str) -> AuthResult<u64> {
        let result = query("DELETE FROM sessions WHERE kind = $1 AND user_id = $2")
            .bind(kind.as_str())
            .bind(user_id)
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let result = query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }
}
