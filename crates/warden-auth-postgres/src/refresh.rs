//! Refresh token chain storage.
//!
//! Every chain has a row in `refresh_token_chains`. Storing a token upserts
//! that row only while it is unrevoked, and revocation marks it before
//! touching the tokens. Both take the chain row lock, so a successor is
//! either stored before the revocation sweeps the chain or refused.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use warden_auth::{AuthError, AuthResult};
use warden_auth::storage::RefreshTokenStorage;
use warden_auth::types::{RefreshTokenRecord, Scope};

use crate::{PostgresAuthStorage, StorageError};

type RefreshTuple = (
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    Option<OffsetDateTime>,
    OffsetDateTime,
    OffsetDateTime,
    Option<OffsetDateTime>,
    Option<OffsetDateTime>,
);

fn record_from_tuple(row: RefreshTuple) -> RefreshTokenRecord {
    let (
        jti,
        chain_id,
        parent_jti,
        client_id,
        user_id,
        scope,
        auth_time,
        issued_at,
        expires_at,
        consumed_at,
        revoked_at,
    ) = row;

    RefreshTokenRecord {
        jti,
        chain_id,
        parent_jti,
        client_id,
        user_id,
        scope: Scope::parse(&scope),
        auth_time,
        issued_at,
        expires_at,
        consumed_at,
        revoked_at,
    }
}

#[async_trait]
impl RefreshTokenStorage for PostgresAuthStorage {
    async fn create(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        let result = query(
            r#"
            WITH chain AS (
                INSERT INTO refresh_token_chains (chain_id, client_id, expires_at)
                VALUES ($2, $4, $9)
                ON CONFLICT (chain_id) DO UPDATE
                    SET expires_at = GREATEST(refresh_token_chains.expires_at, EXCLUDED.expires_at)
                    WHERE refresh_token_chains.revoked_at IS NULL
                RETURNING chain_id
            )
            INSERT INTO refresh_tokens (jti, chain_id, parent_jti, client_id, user_id, scope,
                                        auth_time, issued_at, expires_at, consumed_at,
                                        revoked_at)
            SELECT $1, chain_id, $3, $4, $5, $6, $7, $8, $9, $10, $11
            FROM chain
            "#,
        )
        .bind(&record.jti)
        .bind(&record.chain_id)
        .bind(&record.parent_jti)
        .bind(&record.client_id)
        .bind(&record.user_id)
        .bind(record.scope.to_string())
        .bind(record.auth_time)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.consumed_at)
        .bind(record.revoked_at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            StorageError::from_insert(e, || {
                format!("refresh token '{}' already exists", record.jti)
            })
        })?;

        if result.rows_affected() == 0 {
            return Err(AuthError::invalid_grant(format!(
                "refresh token chain '{}' is revoked",
                record.chain_id
            )));
        }
        Ok(())
    }

    async fn find(&self, jti: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        let row: Option<RefreshTuple> = query_as(
            r#"
            SELECT jti, chain_id, parent_jti, client_id, user_id, scope, auth_time,
                   issued_at, expires_at, consumed_at, revoked_at
            FROM refresh_tokens
            WHERE jti = $1
            "#,
        )
        .bind(jti)
        .fetch_optional(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(record_from_tuple))
    }

    async fn consume(
        &self,
        jti: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<RefreshTokenRecord>> {
        let row: Option<RefreshTuple> = query_as(
            r#"
            UPDATE refresh_tokens
            SET consumed_at = $2
            WHERE jti = $1 AND consumed_at IS NULL AND revoked_at IS NULL
            RETURNING jti, chain_id, parent_jti, client_id, user_id, scope, auth_time,
                      issued_at, expires_at, consumed_at, revoked_at
            "#,
        )
        .bind(jti)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(record_from_tuple))
    }

    async fn revoke_chain(&self, chain_id: &str, now: OffsetDateTime) -> AuthResult<u64> {
        let mut tx = self.pool().begin().await.map_err(StorageError::from)?;

        // Waits for an in-flight create on this chain; later creates see the
        // mark and store nothing.
        query(
            r#"
            UPDATE refresh_token_chains
            SET revoked_at = COALESCE(revoked_at, $2)
            WHERE chain_id = $1
            "#,
        )
        .bind(chain_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from)?;

        let result = query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE chain_id = $1 AND revoked_at IS NULL",
        )
        .bind(chain_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::from)?;

        tx.commit().await.map_err(StorageError::from)?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        // a chain outlives all of its tokens
        query("DELETE FROM refresh_token_chains WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }
}
