//! Authorization code storage.
//!
//! Redemption is a single conditional update; whichever statement flips
//! `used` first gets the row back, every other caller gets nothing.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use warden_auth::AuthResult;
use warden_auth::oauth::{PkceChallenge, PkceMethod};
use warden_auth::storage::AuthorizationCodeStorage;
use warden_auth::types::{AuthorizationCode, Scope};

use crate::{PostgresAuthStorage, StorageError, StorageResult};

type CodeTuple = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<OffsetDateTime>,
    OffsetDateTime,
    OffsetDateTime,
    bool,
    Option<OffsetDateTime>,
);

fn code_from_tuple(row: CodeTuple) -> StorageResult<AuthorizationCode> {
    let (
        code_hash,
        client_id,
        user_id,
        redirect_uri,
        scope,
        challenge,
        method,
        nonce,
        auth_time,
        created_at,
        expires_at,
        used,
        used_at,
    ) = row;

    let pkce = match (challenge, method) {
        (Some(challenge), Some(method)) => {
            // the method was checked against configuration at issue time
            let method = PkceMethod::parse(&method, true)
                .map_err(|e| StorageError::invalid_row(e.to_string()))?;
            Some(
                PkceChallenge::new(challenge, method)
                    .map_err(|e| StorageError::invalid_row(e.to_string()))?,
            )
        }
        (None, None) => None,
        _ => {
            return Err(StorageError::invalid_row(
                "code_challenge and code_challenge_method must be set together",
            ));
        }
    };

    Ok(AuthorizationCode {
        code_hash,
        client_id,
        user_id,
        redirect_uri,
        scope: Scope::parse(&scope),
        pkce,
        nonce,
        auth_time,
        created_at,
        expires_at,
        used,
        used_at,
    })
}

#[async_trait]
impl AuthorizationCodeStorage for PostgresAuthStorage {
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()> {
        let (challenge, method) = match &code.pkce {
            Some(pkce) => (Some(pkce.as_str()), Some(pkce.method().as_str())),
            None => (None, None),
        };

        query(
            r#"
            INSERT INTO authorization_codes (code_hash, client_id, user_id, redirect_uri, scope,
                                             code_challenge, code_challenge_method, nonce,
                                             auth_time, created_at, expires_at, used, used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&code.code_hash)
        .bind(&code.client_id)
        .bind(&code.user_id)
        .bind(&code.redirect_uri)
        .bind(code.scope.to_string())
        .bind(challenge)
        .bind(method)
        .bind(&code.nonce)
        .bind(code.auth_time)
        .bind(code.created_at)
        .bind(code.expires_at)
        .bind(code.used)
        .bind(code.used_at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            StorageError::from_insert(e, || "authorization code collision".to_string())
        })?;

        Ok(())
    }

    async fn consume(
        &self,
        code_hash: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<AuthorizationCode>> {
        let row: Option<CodeTuple> = query_as(
            r#"
            UPDATE authorization_codes
            SET used = true, used_at = $2
            WHERE code_hash = $1 AND used = false
            RETURNING code_hash, client_id, user_id, redirect_uri, scope,
                      code_challenge, code_challenge_method, nonce, auth_time,
                      created_at, expires_at, used, used_at
            "#,
        )
        .bind(code_hash)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(StorageError::from)?;

        Ok(row.map(code_from_tuple).transpose()?)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> AuthResult<u64> {
        let result = query("DELETE FROM authorization_codes WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(StorageError::from)?;

        Ok(result.rows_affected())
    }
}
